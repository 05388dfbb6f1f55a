//! 主应用程序入口
//!
//! 加载配置，装配存储与服务，启动在线状态事件循环和 Axum Web 服务。

use std::sync::Arc;

use application::{
    Clock, MessageService, MessageServiceDependencies, PresenceHub, SystemClock, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        backend = ?config.storage.backend,
        bind = %config.bind_address(),
        "配置已加载"
    );

    let infrastructure = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database_url().map(str::to_owned),
        max_connections: config.storage.max_connections,
        bcrypt_cost: Some(config.security.bcrypt_cost),
        max_image_bytes: config.server.body_limit_bytes,
    })
    .await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (hub, _hub_task) = PresenceHub::spawn(clock.clone());

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: infrastructure.user_repository.clone(),
        password_hasher: infrastructure.password_hasher.clone(),
        image_store: infrastructure.image_store.clone(),
        clock: clock.clone(),
    });
    let message_service = MessageService::new(MessageServiceDependencies {
        user_repository: infrastructure.user_repository.clone(),
        message_repository: infrastructure.message_repository.clone(),
        image_store: infrastructure.image_store.clone(),
        clock,
        hub: hub.clone(),
    });
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(message_service),
        hub,
        jwt_service,
    );

    let app = router(state, &config.server);
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!("聊天服务器启动在 http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，正在关闭");
}
