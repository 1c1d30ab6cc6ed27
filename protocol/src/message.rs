//! 消息类型定义

use std::fmt;

/// 消息种类，仅用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    System,
    Chat,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::System => f.write_str("system"),
            MessageKind::Chat => f.write_str("chat"),
        }
    }
}

/// 广播给全体成员的消息
///
/// 系统消息没有发送者，渲染时不带署名。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// 系统通知
    System { text: String },
    /// 用户聊天
    Chat { sender: String, text: String },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System { text: text.into() }
    }

    pub fn chat(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Message::Chat {
            sender: sender.into(),
            text: text.into(),
        }
    }

    /// 用户加入通知
    pub fn joined(name: &str) -> Self {
        Message::system(format!("{name} has joined"))
    }

    /// 用户离开通知
    pub fn left(name: &str) -> Self {
        Message::system(format!("{name} has left"))
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::System { .. } => MessageKind::System,
            Message::Chat { .. } => MessageKind::Chat,
        }
    }

    pub fn sender(&self) -> Option<&str> {
        match self {
            Message::System { .. } => None,
            Message::Chat { sender, .. } => Some(sender),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Message::System { text } | Message::Chat { text, .. } => text,
        }
    }

    /// 渲染为线上发送的文本行
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::System { text } => writeln!(f, "{text}"),
            Message::Chat { sender, text } => writeln!(f, "{sender}: {text}"),
        }
    }
}
