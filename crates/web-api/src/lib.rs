//! Web API 层。
//!
//! 提供 Axum 路由：`/health` 健康检查，以及 `/ws` WebSocket 入口。
//! 每个 WebSocket 连接就是一个会话，入站帧交给应用层的会话服务处理。

mod routes;
mod state;
mod ws_connection;

pub use routes::router;
pub use state::AppState;
pub use ws_connection::WebSocketConnection;
