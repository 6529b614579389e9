//! 入站负载校验
//!
//! 每个会修改状态的事件在执行前都要先经过这里：负载必须是对象，必需字段必须存在且类型正确，
//! `room_id` 还必须指向一个现存的房间。

use domain::{RoomId, UserId};
use serde_json::{Map, Value};
use thiserror::Error;

/// 自由格式的内容字段：确认存在后立即结束校验
const FREE_FORM_KEYS: &[&str] = &["content", "files_to_ignore"];

/// 校验时用来确认房间是否存在的只读视图
pub trait RoomDirectory {
    fn room_exists(&self, room_id: RoomId) -> bool;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload not an object")]
    NotAnObject,
    #[error("missing key: {0}")]
    MissingKey(String),
    #[error("{0} should be a boolean")]
    NotBoolean(String),
    #[error("{0} should be an integer")]
    NotInteger(String),
    /// 携带原始 JSON 文本
    #[error("No room with id: {0}")]
    UnknownRoom(String),
    /// 整数合法但不可能是用户标识（负数）
    #[error("No such user with id {0}!")]
    UnknownUser(i64),
}

/// 按顺序检查 `required` 中的每个键
pub fn validate(
    payload: &Value,
    required: &[&str],
    rooms: &impl RoomDirectory,
) -> Result<(), ValidationError> {
    let fields = payload.as_object().ok_or(ValidationError::NotAnObject)?;

    for &key in required {
        let value = fields
            .get(key)
            .ok_or_else(|| ValidationError::MissingKey(key.to_owned()))?;

        if FREE_FORM_KEYS.contains(&key) {
            return Ok(());
        }

        match key {
            "accepted" => {
                if !value.is_boolean() {
                    return Err(ValidationError::NotBoolean(key.to_owned()));
                }
            }
            "room_id" => {
                let exists = value
                    .as_u64()
                    .is_some_and(|id| rooms.room_exists(RoomId::new(id)));
                if !exists {
                    return Err(ValidationError::UnknownRoom(value.to_string()));
                }
            }
            _ => {
                if !is_integer(value) {
                    return Err(ValidationError::NotInteger(key.to_owned()));
                }
            }
        }
    }

    Ok(())
}

/// serde_json 中只有整数才能转成 i64/u64，布尔值和浮点数都不算
fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

fn integer_field(fields: Option<&Map<String, Value>>, key: &str) -> Result<u64, ValidationError> {
    fields
        .and_then(|fields| fields.get(key))
        .and_then(Value::as_u64)
        .ok_or_else(|| ValidationError::NotInteger(key.to_owned()))
}

/// 读取已校验过的 `room_id`
pub fn room_id(payload: &Value) -> Result<RoomId, ValidationError> {
    integer_field(payload.as_object(), "room_id").map(RoomId::new)
}

/// 读取已校验过的 `user_id`
pub fn user_id(payload: &Value) -> Result<UserId, ValidationError> {
    match payload.get("user_id").and_then(Value::as_i64) {
        Some(id) if id < 0 => Err(ValidationError::UnknownUser(id)),
        _ => integer_field(payload.as_object(), "user_id").map(UserId::new),
    }
}

/// 可选的字符串字段，类型不对时按缺省处理
pub fn optional_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}
