//! 房间聚合
//!
//! 房间只持有成员的 `UserId`，用户实体本身归身份注册表所有。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;
use crate::user::{Role, User, UserStatus};
use crate::value_objects::{RoomId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: RoomId,
    host_id: UserId,
    /// 成员按加入顺序排列，主持人在最前
    members: Vec<UserId>,
    exercise: Option<Value>,
    steps: Option<Value>,
    settings: Option<Value>,
    /// 已向客户端发出 `room/closed`，正在等待删除
    closing: bool,
    pub created_at: Timestamp,
}

impl Room {
    pub fn new(id: RoomId, host_id: UserId, created_at: Timestamp) -> Self {
        Self {
            id,
            host_id,
            members: Vec::new(),
            exercise: None,
            steps: None,
            settings: None,
            closing: false,
            created_at,
        }
    }

    pub fn host_id(&self) -> UserId {
        self.host_id
    }

    pub fn members(&self) -> &[UserId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }

    pub fn add_member(&mut self, user_id: UserId) -> Result<(), DomainError> {
        if self.contains(user_id) {
            return Err(DomainError::MemberAlreadyPresent {
                room_id: self.id,
                user_id,
            });
        }
        self.members.push(user_id);
        Ok(())
    }

    /// 移除成员；返回 `false` 表示该用户不是成员。主持人不能被单独移除。
    pub fn remove_member(&mut self, user_id: UserId) -> Result<bool, DomainError> {
        if user_id == self.host_id {
            return Err(DomainError::HostCannotLeave { room_id: self.id });
        }
        let before = self.members.len();
        self.members.retain(|&id| id != user_id);
        Ok(self.members.len() != before)
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn mark_closing(&mut self) {
        self.closing = true;
    }

    /// 关闭宽限期内不再接纳新成员或重连
    pub fn ensure_open(&self) -> Result<(), DomainError> {
        if self.closing {
            return Err(DomainError::RoomClosing { room_id: self.id });
        }
        Ok(())
    }

    /// 清空成员（关闭房间时使用）
    pub fn drain_members(&mut self) -> Vec<UserId> {
        std::mem::take(&mut self.members)
    }

    pub fn exercise(&self) -> Option<&Value> {
        self.exercise.as_ref().filter(|value| has_content(value))
    }

    pub fn steps(&self) -> Option<&Value> {
        self.steps.as_ref().filter(|value| has_content(value))
    }

    pub fn settings(&self) -> Option<&Value> {
        self.settings.as_ref().filter(|value| has_content(value))
    }

    pub fn set_exercise(&mut self, content: Value) {
        self.exercise = Some(content);
    }

    pub fn set_steps(&mut self, content: Value) {
        self.steps = Some(content);
    }

    pub fn set_settings(&mut self, content: Value) {
        self.settings = Some(content);
    }
}

/// 不透明内容是否“有内容”：null、false、0、空字符串和空集合都视为空。
fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// 成员摘要，`room/update` 快照中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
    pub status: UserStatus,
}

impl From<&User> for MemberSummary {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            name: user.name.to_string(),
            role: user.role(),
            status: user.status,
        }
    }
}

/// 房间快照：每次 `room/update` 推送给主持人的内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub host_id: UserId,
    pub users_count: usize,
    pub users: Vec<MemberSummary>,
}

/// 诊断用的房间统计（`room/log`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCensus {
    pub total_rooms_count: usize,
    pub rooms: Vec<RoomSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub users_count: usize,
    pub host_id: UserId,
    pub created_at: Timestamp,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        Self {
            room_id: room.id,
            users_count: room.len(),
            host_id: room.host_id,
            created_at: room.created_at,
        }
    }
}
