use anyhow::Context;

use atelier_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    atelier_observability::init(config.log_format);
    if config.uses_dev_session_secret() {
        tracing::warn!("SESSION_SECRET not set; using the insecure development secret");
    }

    let services = atelier_api::app::services::build_services(&config).await?;
    atelier_api::app::services::spawn_invitation_sweeper(services.clone());

    let app = atelier_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
