// 进程内的会话推送中心
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::SessionId;
use tokio::sync::{mpsc, RwLock};

use crate::notifier::{Notifier, NotifyError, OutboundEvent};

/// 每个连接注册一个无界发送端，按会话标识路由
#[derive(Clone, Default)]
pub struct LocalSessionHub {
    connections: Arc<RwLock<HashMap<SessionId, mpsc::UnboundedSender<OutboundEvent>>>>,
}

impl LocalSessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新连接；同一会话重复登记时替换旧的发送端
    pub async fn register(&self, session: SessionId) -> SessionStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections.write().await.insert(session.clone(), sender);
        SessionStream { session, receiver }
    }

    pub async fn unregister(&self, session: &SessionId) {
        self.connections.write().await.remove(session);
    }

    pub async fn connected(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[async_trait]
impl Notifier for LocalSessionHub {
    async fn send_to(&self, session: &SessionId, event: OutboundEvent) -> Result<(), NotifyError> {
        let connections = self.connections.read().await;
        let sender = connections
            .get(session)
            .ok_or_else(|| NotifyError::UnknownSession(session.clone()))?;
        sender
            .send(event)
            .map_err(|_| NotifyError::Closed(session.clone()))
    }

    async fn broadcast(&self, event: OutboundEvent) -> Result<(), NotifyError> {
        let connections = self.connections.read().await;
        for sender in connections.values() {
            // 已断开的连接等待 unregister 清理
            let _ = sender.send(event.clone());
        }
        Ok(())
    }
}

/// 单个会话的接收端
pub struct SessionStream {
    session: SessionId,
    receiver: mpsc::UnboundedReceiver<OutboundEvent>,
}

impl SessionStream {
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub async fn recv(&mut self) -> Option<OutboundEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutboundEvent> {
        self.receiver.try_recv().ok()
    }

    /// 取出当前已排队的全部事件
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}
