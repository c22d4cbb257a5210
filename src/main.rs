use chrono::Utc;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use license_server::{
    config::Config, router::build_router, services::session as session_service, state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!(
        "✅ AppState initialized (session timeout: {} minutes)",
        state.policy.timeout.num_minutes()
    );

    let app = build_router(state.clone())?;

    if let Some(interval) = config.session_sweep_interval {
        let sweep_state = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match session_service::sweep_expired_sessions(
                    sweep_state.store.as_ref(),
                    &sweep_state.policy,
                    Utc::now(),
                )
                .await
                {
                    Ok(cleared) => {
                        tracing::info!("🧹 Session sweep cleared {} expired bindings", cleared);
                    }
                    Err(e) => {
                        tracing::error!("❌ Session sweep failed: {}", e);
                    }
                }
            }
        });
        tracing::info!("✅ Background session sweep started (every {:?})", interval);
    }

    let addr = SocketAddr::new(config.bind_addr, config.port);
    tracing::info!("🚀 License server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
