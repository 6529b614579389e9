use std::{net::SocketAddr, time::Duration};

use application::SessionSettings;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn test_settings() -> SessionSettings {
    SessionSettings {
        close_grace: Duration::from_millis(50),
        min_client_version: None,
        diagnostics: true,
        broadcast_audit: false,
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn spawn_server(settings: SessionSettings) -> TestServer {
    spawn_server_with_state(AppState::in_memory(settings)).await
}

/// 使用调用方持有的状态启动服务，便于测试直接检查注册表
pub async fn spawn_server_with_state(state: AppState) -> TestServer {
    let router = router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        shutdown: Some(shutdown_tx),
    }
}

pub async fn connect(server: &TestServer) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .expect("ws connect");
    ws
}

pub async fn send_event(ws: &mut WsClient, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data}).to_string();
    ws.send(TungsteniteMessage::Text(frame.into()))
        .await
        .expect("ws send");
}

/// 读取下一条事件帧，返回 (事件名, 数据)
pub async fn next_event(ws: &mut WsClient) -> (String, Value) {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("ws closed")
            .expect("ws error");
        if let TungsteniteMessage::Text(payload) = message {
            let frame: Value = serde_json::from_str(payload.as_str()).expect("json frame");
            let event = frame["event"].as_str().expect("event name").to_owned();
            return (event, frame["data"].clone());
        }
    }
}

/// 读取下一条事件并断言事件名
pub async fn expect_event(ws: &mut WsClient, name: &str) -> Value {
    let (event, data) = next_event(ws).await;
    assert_eq!(event, name, "unexpected event with data {data}");
    data
}
