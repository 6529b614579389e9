use async_trait::async_trait;
use domain::{RoomCensus, RoomId, RoomSnapshot, SessionId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// 发往客户端的事件，线上格式为 `{"event": <name>, "data": <payload>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "room/update")]
    RoomUpdate(RoomSnapshot),
    #[serde(rename = "room/join")]
    RoomJoin { user_id: UserId, room_id: RoomId },
    #[serde(rename = "exercise")]
    Exercise { content: Value },
    #[serde(rename = "steps/all")]
    StepsAll(Value),
    #[serde(rename = "steps/load")]
    StepsLoad(Value),
    #[serde(rename = "settings")]
    Settings(Value),
    #[serde(rename = "message")]
    Message { message: String },
    #[serde(rename = "room/closed")]
    RoomClosed { message: String },
    #[serde(rename = "room/log")]
    RoomLog(RoomCensus),
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "log")]
    Log { message: String },
}

impl OutboundEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn room_closed(message: impl Into<String>) -> Self {
        Self::RoomClosed {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    /// 线上事件名
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomUpdate(_) => "room/update",
            Self::RoomJoin { .. } => "room/join",
            Self::Exercise { .. } => "exercise",
            Self::StepsAll(_) => "steps/all",
            Self::StepsLoad(_) => "steps/load",
            Self::Settings(_) => "settings",
            Self::Message { .. } => "message",
            Self::RoomClosed { .. } => "room/closed",
            Self::RoomLog(_) => "room/log",
            Self::Error { .. } => "error",
            Self::Log { .. } => "log",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no live connection for session {0}")]
    UnknownSession(SessionId),
    #[error("connection for session {0} is closed")]
    Closed(SessionId),
}

/// 把事件推送给在线会话的出口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_to(&self, session: &SessionId, event: OutboundEvent) -> Result<(), NotifyError>;

    /// 推送给所有在线会话
    async fn broadcast(&self, event: OutboundEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Session(SessionId),
    Everyone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: Target,
    pub event: OutboundEvent,
}

/// 处理器持锁期间收集的待发消息，释放锁之后按顺序投递
#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(&mut self, session: &SessionId, event: OutboundEvent) -> &mut Self {
        self.deliveries.push(Delivery {
            target: Target::Session(session.clone()),
            event,
        });
        self
    }

    /// 同一个事件发给多个会话
    pub fn to_all<'a>(
        &mut self,
        sessions: impl IntoIterator<Item = &'a SessionId>,
        event: &OutboundEvent,
    ) -> &mut Self {
        for session in sessions {
            self.to(session, event.clone());
        }
        self
    }

    pub fn everyone(&mut self, event: OutboundEvent) -> &mut Self {
        self.deliveries.push(Delivery {
            target: Target::Everyone,
            event,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// 投递全部消息；单条失败只记日志，不影响其余消息
    pub async fn deliver(self, notifier: &dyn Notifier) {
        for Delivery { target, event } in self.deliveries {
            let name = event.name();
            let result = match &target {
                Target::Session(session) => notifier.send_to(session, event).await,
                Target::Everyone => notifier.broadcast(event).await,
            };
            match result {
                Ok(()) => {}
                Err(err @ NotifyError::UnknownSession(_)) => {
                    debug!(event = name, error = %err, "notification dropped");
                }
                Err(err) => {
                    warn!(event = name, error = %err, "notification undeliverable");
                }
            }
        }
    }
}
