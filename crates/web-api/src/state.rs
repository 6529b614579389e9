use std::sync::Arc;

use application::{
    LocalSessionHub, SessionRegistry, SessionService, SessionServiceDependencies, SessionSettings,
    SystemClock,
};
use config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SessionService>,
    pub hub: LocalSessionHub,
}

impl AppState {
    pub fn new(service: Arc<SessionService>, hub: LocalSessionHub) -> Self {
        Self { service, hub }
    }

    /// 用进程内的注册表和推送中心装配会话服务
    pub fn in_memory(settings: SessionSettings) -> Self {
        let hub = LocalSessionHub::new();
        let service = SessionService::new(SessionServiceDependencies {
            registry: SessionRegistry::new(),
            notifier: Arc::new(hub.clone()),
            clock: Arc::new(SystemClock),
            settings,
        });
        Self::new(Arc::new(service), hub)
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::in_memory(SessionSettings::from(config))
    }
}
