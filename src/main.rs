use image_intake::config::LoggingConfig;
use image_intake::shutdown::{drain_with_timeout, wait_for_signal};
use image_intake::startup::run_startup_checks;
use image_intake::{AppConfig, AppState, build_router};
use tokio::sync::oneshot;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        format!("image_intake={level},tower_http={level}").into()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "compact" => builder.compact().init(),
        _ => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    let config = match AppConfig::init_global() {
        Ok(c) => c,
        Err(e) => {
            // 日志尚未初始化
            eprintln!("Config init failed: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);
    tracing::debug!(?config, "配置加载完成");

    let state = AppState::new(config.clone());

    if let Err(e) = run_startup_checks(config, &state.store).await {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    let app = build_router(state);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Upload API: http://{}/upload", addr);
    tracing::info!("Images: http://{}{}/ -> {:?}", addr, config.public_path(), config.storage_root());

    let (started_tx, started_rx) = oneshot::channel();
    let server = async move {
        let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
            let reason = wait_for_signal().await;
            let _ = started_tx.send(reason);
            tracing::info!("开始优雅关闭HTTP服务器...");
        });
        if let Err(e) = graceful.await {
            tracing::error!("服务器运行错误: {}", e);
            std::process::exit(1);
        }
    };

    if !drain_with_timeout(server, started_rx, config.shutdown.timeout_duration()).await {
        std::process::exit(1);
    }

    tracing::info!("服务器已关闭");
}
