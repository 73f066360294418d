//! User-facing texts, one table per language.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "zh" => Ok(Self::Zh),
            other => Err(format!("unsupported language {other:?}, expected \"en\" or \"zh\"")),
        }
    }
}

pub struct Messages {
    pub help: &'static str,
    pub not_a_command: &'static str,
    pub not_authorized: &'static str,
    pub fetching: &'static str,
    pub list_header: &'static str,
    pub pick_vm: &'static str,
    pub restarting: &'static str,
    pub restart_needs_name: &'static str,
    restarted_suffix: &'static str,
    failed_prefix: &'static str,
    pub state_on: &'static str,
    pub state_off: &'static str,
    pub state_paused: &'static str,
}

static EN: Messages = Messages {
    help: "Welcome to the ESXi bot. Available commands:\n\
           /list - list the virtual machines on the ESXi host\n\
           /restart <name> - reboot a virtual machine",
    not_a_command: "That is not a command!",
    not_authorized: "not authorized",
    fetching: "Fetching, please wait...",
    list_header: "Virtual machines:",
    pick_vm: "Pick a virtual machine to restart:",
    restarting: "Restarting, please wait...",
    restart_needs_name: "Please name the virtual machine to restart, for example: /restart vm_name",
    restarted_suffix: "restarted",
    failed_prefix: "Operation failed, reason: ",
    state_on: "running ✅",
    state_off: "off ⛔️",
    state_paused: "paused ⛔️",
};

static ZH: Messages = Messages {
    help: "欢迎使用 ESXi Bot，您可以使用以下命令：\n\
           /list - 获取当前 ESXi 主机上的虚拟机列表\n\
           /restart - 重启指定虚拟机",
    not_a_command: "你输入的不是命令!",
    not_authorized: "无权限",
    fetching: "获取中, 请稍等...",
    list_header: "获取成功: ",
    pick_vm: "请选择要重启的虚拟机：",
    restarting: "重启中, 请稍等...",
    restart_needs_name: "请输入要重启的虚拟机名称，例如：/restart vm_name",
    restarted_suffix: "已重启",
    failed_prefix: "操作失败, 原因:",
    state_on: "正常✅",
    state_off: "关机⛔️",
    state_paused: "暂停⛔️",
};

impl Messages {
    pub fn for_language(language: Language) -> &'static Self {
        match language {
            Language::En => &EN,
            Language::Zh => &ZH,
        }
    }

    pub fn restarted(&self, name: &str) -> String {
        format!("{} {}", name, self.restarted_suffix)
    }

    pub fn failed(&self, reason: impl std::fmt::Display) -> String {
        format!("{}{}", self.failed_prefix, reason)
    }
}
