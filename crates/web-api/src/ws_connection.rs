use application::SessionStream;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::SessionId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::state::AppState;

/// WebSocket 连接
///
/// 一个连接对应一个会话：
/// - 建立时生成会话标识并登记到推送中心
/// - 入站文本帧按顺序交给会话服务
/// - 推送中心的事件序列化后写回客户端
/// - 断开时注销并触发 disconnect 流程
pub struct WebSocketConnection {
    state: AppState,
    session: SessionId,
}

impl WebSocketConnection {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            session: SessionId::new(Uuid::new_v4().to_string()),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// 运行连接主循环，直到任意一端关闭
    pub async fn run(self, socket: WebSocket) {
        let stream = self.state.hub.register(self.session.clone()).await;
        tracing::info!(session_id = %self.session, "WebSocket 连接已建立");

        let (sender, mut incoming) = socket.split();

        // 发送任务独占 sender，接收任务通过命令通道请求写操作
        let (cmd_tx, cmd_rx) = mpsc::channel::<WsCommand>(32);
        let mut send_task = tokio::spawn(Self::pump_outbound(sender, stream, cmd_rx));

        // 发送端先结束时通知接收任务在帧边界停下，正在执行的事件处理不被打断
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut recv_task = {
            let service = self.state.service.clone();
            let session = self.session.clone();
            tokio::spawn(async move {
                loop {
                    let message = tokio::select! {
                        biased;
                        _ = stop_rx.changed() => break,
                        message = incoming.next() => match message {
                            Some(Ok(message)) => message,
                            _ => break,
                        },
                    };
                    match message {
                        WsMessage::Text(text) => {
                            service.handle_text(&session, text.as_str()).await;
                        }
                        WsMessage::Binary(_) => {
                            tracing::debug!(session_id = %session, "忽略二进制帧");
                        }
                        WsMessage::Ping(data) => {
                            if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Pong(_) => {}
                        WsMessage::Close(_) => {
                            tracing::debug!(session_id = %session, "收到关闭消息");
                            break;
                        }
                    }
                }
            })
        };

        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(session_id = %self.session, "发送任务结束");
                let _ = stop_tx.send(true);
                if let Err(err) = recv_task.await {
                    tracing::warn!(session_id = %self.session, error = %err, "接收任务异常退出");
                }
            }
            _ = &mut recv_task => {
                tracing::debug!(session_id = %self.session, "接收任务结束");
                send_task.abort();
            }
        }

        self.state.hub.unregister(&self.session).await;
        self.state.service.disconnect(&self.session).await;
        tracing::info!(session_id = %self.session, "WebSocket 连接已断开");
    }

    async fn pump_outbound(
        mut sender: futures_util::stream::SplitSink<WebSocket, WsMessage>,
        mut stream: SessionStream,
        mut cmd_rx: mpsc::Receiver<WsCommand>,
    ) {
        loop {
            let message = tokio::select! {
                Some(cmd) = cmd_rx.recv() => match cmd {
                    WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                },
                event = stream.recv() => match event {
                    // 推送中心已注销该会话
                    None => break,
                    Some(event) => match serde_json::to_string(&event) {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                event = event.name(),
                                "failed to serialize websocket payload"
                            );
                            continue;
                        }
                    },
                },
            };

            if sender.send(message).await.is_err() {
                tracing::warn!(session_id = %stream.session(), "Failed to send websocket message");
                break;
            }
        }
    }
}

/// 接收任务请求的写操作
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
