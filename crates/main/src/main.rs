//! 主应用程序入口
//!
//! 加载配置、初始化日志，然后启动 Axum WebSocket 会话服务。

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use application::SessionSettings;
use config::{AppConfig, LoggingConfig};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tracing_subscriber::{EnvFilter, Layer};
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_logging(&config.logging)?;

    let settings = SessionSettings::from(&config);
    tracing::info!(
        close_grace_ms = config.session.close_grace_ms,
        diagnostics = settings.diagnostics,
        min_client_version = ?settings.min_client_version,
        "会话服务配置已加载"
    );

    let app = router(AppState::in_memory(settings));
    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!("课堂会话服务启动在 ws://{address}/ws");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

/// 控制台输出受 `RUST_LOG`（缺省为配置的级别）过滤；配置了错误日志文件时，WARN 及以上级别额外写入该文件
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_filter(filter);

    let error_file = match &logging.error_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open error log {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::WARN),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(error_file)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
