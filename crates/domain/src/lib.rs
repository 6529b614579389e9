//! 课堂协作房间的核心领域模型
//!
//! 包含用户、房间、标识符等核心实体，以及成员关系相关的不变量。

pub mod errors;
pub mod room;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use room::*;
pub use user::*;
pub use value_objects::*;
