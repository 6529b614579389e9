//! 应用层实现。
//!
//! 这里提供围绕领域模型的会话生命周期用例，处理输入校验、身份注册表、
//! 以及对外部适配器（例如消息推送、时钟）的抽象。

pub mod clock;
pub mod compat;
pub mod error;
pub mod local_broadcast;
pub mod notifier;
pub mod protocol;
pub mod registry;
pub mod services;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use compat::VersionAdvice;
pub use error::{ApplicationError, ApplicationResult};
pub use local_broadcast::{LocalSessionHub, SessionStream};
pub use notifier::{Delivery, Notifier, NotifyError, OutboundEvent, Outbox, Target};
pub use protocol::{ContentKind, InboundEvent, InboundFrame, ReconnectCommand, UnknownEvent};
pub use registry::{RegistryError, SessionRegistry};
pub use services::{SessionService, SessionServiceDependencies, SessionSettings};
pub use validation::{RoomDirectory, ValidationError};
