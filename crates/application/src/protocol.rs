use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// 客户端发来的原始帧，缺少 `data` 时按 `null` 处理
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown event: {0}")]
pub struct UnknownEvent(pub String);

/// 重连的两种方式：客户端 `rejoin`，主持人 `rehost`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectCommand {
    Rejoin,
    Rehost,
}

/// 主持人可以设置的三类不透明内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Exercise,
    Steps,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    CreateRoom,
    JoinRoom,
    Reconnect(ReconnectCommand),
    ExitRoom,
    CloseRoom,
    KickUser,
    RoomLog,
    SetContent(ContentKind),
}

impl InboundEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRoom => "room/create",
            Self::JoinRoom => "room/join",
            Self::Reconnect(ReconnectCommand::Rejoin) => "rejoin",
            Self::Reconnect(ReconnectCommand::Rehost) => "rehost",
            Self::ExitRoom => "room/exit",
            Self::CloseRoom => "room/close",
            Self::KickUser => "room/kick",
            Self::RoomLog => "room/log",
            Self::SetContent(ContentKind::Exercise) => "exercise",
            Self::SetContent(ContentKind::Steps) => "steps/all",
            Self::SetContent(ContentKind::Settings) => "settings",
        }
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InboundEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let event = match s {
            "room/create" => Self::CreateRoom,
            "room/join" => Self::JoinRoom,
            "rejoin" => Self::Reconnect(ReconnectCommand::Rejoin),
            "rehost" => Self::Reconnect(ReconnectCommand::Rehost),
            "room/exit" => Self::ExitRoom,
            "room/close" => Self::CloseRoom,
            "room/kick" => Self::KickUser,
            "room/log" => Self::RoomLog,
            "exercise" => Self::SetContent(ContentKind::Exercise),
            "steps/all" => Self::SetContent(ContentKind::Steps),
            "settings" => Self::SetContent(ContentKind::Settings),
            other => return Err(UnknownEvent(other.to_owned())),
        };
        Ok(event)
    }
}
