//! 领域模型错误定义
//!
//! 定义了房间与用户实体上可能违反的不变量，提供清晰的错误上下文。

use thiserror::Error;

use crate::value_objects::{RoomId, UserId};

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("{field} {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    /// 用户已绑定到某个房间
    #[error("User already in room (id: {room_id})")]
    UserAlreadyInRoom { room_id: RoomId },

    /// 用户不是房间成员
    #[error("User is not in room (id: {room_id})")]
    UserNotInRoom { room_id: RoomId },

    /// 重复加入同一房间
    #[error("User {user_id} is already a member of room {room_id}")]
    MemberAlreadyPresent { room_id: RoomId, user_id: UserId },

    /// 主持人只能通过关闭房间离开
    #[error("Host cannot leave room (id: {room_id}), close the room instead")]
    HostCannotLeave { room_id: RoomId },

    /// 房间已进入关闭宽限期
    #[error("Room (id: {room_id}) is closing")]
    RoomClosing { room_id: RoomId },
}

impl DomainError {
    pub fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
