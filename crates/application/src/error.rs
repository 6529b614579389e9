use domain::DomainError;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::validation::ValidationError;

/// 会话处理过程中的错误。
///
/// 所有变体都是可恢复的 400 类错误：调度器把它们转换成发给来源会话的 `error` 事件。
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 负载形状或字段类型不对
    #[error("{0}")]
    MalformedPayload(String),
    /// 房间或用户标识无法解析
    #[error("{0}")]
    UnknownReference(String),
    /// 与当前状态冲突（重复加入、非成员退出等）
    #[error("{0}")]
    StateConflict(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// 标识空间耗尽等注册表内部错误
    #[error(transparent)]
    Registry(RegistryError),
}

impl ApplicationError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::UnknownReference(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::StateConflict(message.into())
    }

    /// 发给客户端的错误文本
    pub fn bad_request_message(&self) -> String {
        format!("400 BAD REQUEST. {self}")
    }
}

impl From<ValidationError> for ApplicationError {
    fn from(value: ValidationError) -> Self {
        match value {
            ValidationError::UnknownRoom(_) | ValidationError::UnknownUser(_) => {
                Self::UnknownReference(value.to_string())
            }
            other => Self::MalformedPayload(other.to_string()),
        }
    }
}

impl From<RegistryError> for ApplicationError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::UnknownRoom(_) | RegistryError::UnknownUser(_) => {
                Self::UnknownReference(value.to_string())
            }
            RegistryError::SessionInUse { .. } | RegistryError::Domain(_) => {
                Self::StateConflict(value.to_string())
            }
            RegistryError::IdentifiersExhausted => Self::Registry(value),
        }
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
