//! In-memory stand-ins for the virtualization host and the chat platform.

use std::sync::Mutex;

use async_trait::async_trait;
use teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId};
use teloxide::{ApiError, RequestError};

use crate::api::{Hypervisor, Session, VmRecord, VsphereError};
use crate::telegram::{ChatApi, SentMessage, TelegramError};

enum Behaviour {
    Healthy,
    /// Listing fails after login.
    Failing,
    /// Login fails with this response body.
    Unreachable(String),
}

pub struct FakeHypervisor {
    vms: Vec<VmRecord>,
    behaviour: Behaviour,
    calls: Mutex<Vec<String>>,
    rebooted: Mutex<Vec<String>>,
}

impl FakeHypervisor {
    pub fn with_vms(vms: Vec<VmRecord>) -> Self {
        Self {
            vms,
            behaviour: Behaviour::Healthy,
            calls: Mutex::default(),
            rebooted: Mutex::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            behaviour: Behaviour::Failing,
            ..Self::with_vms(Vec::new())
        }
    }

    pub fn unreachable() -> Self {
        Self::unreachable_with("")
    }

    pub fn unreachable_with(body: &str) -> Self {
        Self {
            behaviour: Behaviour::Unreachable(body.to_string()),
            ..Self::with_vms(Vec::new())
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rebooted(&self) -> Vec<String> {
        self.rebooted.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    async fn connect(&self) -> Result<Session, VsphereError> {
        self.record("connect");
        match &self.behaviour {
            Behaviour::Unreachable(body) => Err(VsphereError::Status {
                method: reqwest::Method::POST,
                path: "/session".to_string(),
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: body.clone(),
            }),
            _ => Ok(Session::new("fake")),
        }
    }

    async fn list_vms(&self, _session: &Session) -> Result<Vec<VmRecord>, VsphereError> {
        self.record("list");
        match self.behaviour {
            Behaviour::Failing => Err(VsphereError::NoDatacenter),
            _ => Ok(self.vms.clone()),
        }
    }

    async fn reboot_vm(
        &self,
        _session: &Session,
        pattern: &str,
    ) -> Result<Vec<String>, VsphereError> {
        self.record(format!("reboot {pattern}"));
        if let Behaviour::Failing = self.behaviour {
            return Err(VsphereError::NoDatacenter);
        }
        let matched: Vec<String> = self
            .vms
            .iter()
            .filter(|vm| vm.name == pattern)
            .map(|vm| vm.name.clone())
            .collect();
        self.rebooted.lock().unwrap().extend(matched.iter().cloned());
        Ok(matched)
    }

    async fn disconnect(&self, _session: Session) {
        self.record("disconnect");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Send {
        chat_id: ChatId,
        text: String,
        reply_to: Option<MessageId>,
        keyboard: Option<InlineKeyboardMarkup>,
    },
    Edit {
        message: SentMessage,
        text: String,
        keyboard: Option<InlineKeyboardMarkup>,
    },
    Answer {
        id: String,
        text: String,
    },
}

#[derive(Default)]
pub struct FakeChat {
    outgoing: Mutex<Vec<Outgoing>>,
    broken: bool,
    rejecting_answers: bool,
}

impl FakeChat {
    /// Every call fails as if Telegram rejected it.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// Button presses cannot be answered any more, everything else works.
    pub fn rejecting_answers() -> Self {
        Self {
            rejecting_answers: true,
            ..Self::default()
        }
    }

    pub fn outgoing(&self) -> Vec<Outgoing> {
        self.outgoing.lock().unwrap().clone()
    }

    fn push(&self, message: Outgoing) -> Result<usize, TelegramError> {
        if self.broken {
            return Err(RequestError::Api(ApiError::BotBlocked).into());
        }
        let mut outgoing = self.outgoing.lock().unwrap();
        outgoing.push(message);
        Ok(outgoing.len())
    }
}

#[async_trait]
impl ChatApi for FakeChat {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<SentMessage, TelegramError> {
        let n = self.push(Outgoing::Send {
            chat_id,
            text: text.to_string(),
            reply_to,
            keyboard,
        })?;
        Ok(SentMessage {
            chat_id,
            message_id: MessageId(n as i32),
        })
    }

    async fn edit_message_text(
        &self,
        message: SentMessage,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        self.push(Outgoing::Edit {
            message,
            text: text.to_string(),
            keyboard,
        })?;
        Ok(())
    }

    async fn answer_callback_query(&self, id: &str, text: &str) -> Result<(), TelegramError> {
        if self.rejecting_answers {
            return Err(RequestError::Api(ApiError::Unknown(
                "Bad Request: query is too old and response timeout expired or query ID is invalid"
                    .to_string(),
            ))
            .into());
        }
        self.push(Outgoing::Answer {
            id: id.to_string(),
            text: text.to_string(),
        })?;
        Ok(())
    }
}
