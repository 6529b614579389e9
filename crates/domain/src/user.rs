use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{DisplayName, RoomId, SessionId, UserId};

/// 房间内角色，创建后不可更改。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// 最近一次绑定的会话；离线后仅作为历史记录保留
    pub session_id: SessionId,
    role: Role,
    pub name: DisplayName,
    pub status: UserStatus,
    room_id: Option<RoomId>,
}

impl User {
    pub fn new(id: UserId, session_id: SessionId, role: Role, name: DisplayName) -> Self {
        Self {
            id,
            session_id,
            role,
            name,
            status: UserStatus::Online,
            room_id: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.room_id
    }

    pub fn is_online(&self) -> bool {
        self.status == UserStatus::Online
    }

    /// 绑定到房间，只允许绑定一次
    pub fn bind_room(&mut self, room_id: RoomId) -> Result<(), DomainError> {
        if let Some(current) = self.room_id {
            return Err(DomainError::UserAlreadyInRoom { room_id: current });
        }
        self.room_id = Some(room_id);
        Ok(())
    }

    pub fn unbind_room(&mut self) -> Option<RoomId> {
        self.room_id.take()
    }

    pub fn go_online(&mut self) {
        self.status = UserStatus::Online;
    }

    pub fn go_offline(&mut self) {
        self.status = UserStatus::Offline;
    }
}
