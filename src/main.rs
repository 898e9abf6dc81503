use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tray_classifier::{
    Args, AppState, ClassifierService, Processor, Readiness, ServerConfig, build_router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let processor = Processor::new(args.preprocess_config());

    let readiness = match ClassifierService::load(&args.model, &args.food_info, processor, args.cuda)
        .map(|service| service.with_decode_limits(args.decode_limits()))
    {
        Ok(service) => {
            tracing::info!(labels = service.labels().len(), "classifier ready");
            Readiness::Ready(Arc::new(service))
        }
        Err(e) if args.require_model => return Err(e.into()),
        Err(e) => {
            tracing::error!(
                error = %e,
                "startup failed, prediction requests will be answered with 500 until this is fixed"
            );
            Readiness::Degraded(e.to_string())
        }
    };

    let config = ServerConfig {
        public_dir: args.public_dir.clone(),
        max_body_bytes: args.max_body_bytes,
    };
    let app = build_router(AppState::new(readiness), &config);

    let listener = tokio::net::TcpListener::bind(args.bind_target()).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, public_dir = %config.public_dir.display(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutting down");
}
