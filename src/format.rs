use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::api::{PowerState, VmRecord};
use crate::messages::Messages;
use crate::telegram::ANSWER_TEXT_LIMIT;

/// Buttons per keyboard row.
pub const KEYBOARD_WIDTH: usize = 5;

/// Callback payload prefix of the restart buttons.
pub const RESTART_PREFIX: &str = "restart_";

/// Telegram rejects a whole keyboard when any callback payload is longer.
/// In bytes.
pub const CALLBACK_DATA_LIMIT: usize = 64;

pub fn state_label(messages: &Messages, state: PowerState) -> &'static str {
    match state {
        PowerState::PoweredOn => messages.state_on,
        PowerState::PoweredOff => messages.state_off,
        _ => messages.state_paused,
    }
}

pub fn vm_list(messages: &Messages, vms: &[VmRecord]) -> String {
    let mut text = format!("{}\n", messages.list_header);
    for vm in vms {
        text += &format!("{:<12} {}\n", vm.name, state_label(messages, vm.power_state));
    }
    text
}

/// One restart button per VM, [`KEYBOARD_WIDTH`] to a row.
/// VMs whose payload would not fit get no button.
/// `None` when there is nothing to press.
pub fn restart_keyboard(vms: &[VmRecord]) -> Option<InlineKeyboardMarkup> {
    let buttons: Vec<InlineKeyboardButton> = vms
        .iter()
        .filter_map(|vm| {
            let data = format!("{RESTART_PREFIX}{}", vm.name);
            if data.len() > CALLBACK_DATA_LIMIT {
                tracing::warn!("No restart button for {:?}, name too long", vm.name);
                return None;
            }
            Some(InlineKeyboardButton::callback(vm.name.clone(), data))
        })
        .collect();

    if buttons.is_empty() {
        return None;
    }
    let rows = buttons
        .chunks(KEYBOARD_WIDTH)
        .map(<[InlineKeyboardButton]>::to_vec);
    Some(InlineKeyboardMarkup::new(rows))
}

/// Cuts `text` to what fits in a callback query answer.
pub fn callback_answer(text: &str) -> &str {
    match text.char_indices().nth(ANSWER_TEXT_LIMIT) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
