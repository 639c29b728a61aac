/// Parish Access - role and scope administration server

use parish_access::{config::ServerConfig, error::AccessResult, server, AppContext};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AccessResult<()> {
    // Load configuration (reads .env before the filter is built)
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let json = config.logging.json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "parish_access={},tower_http={}",
                    config.logging.level, config.logging.level
                )
                .into()
            }),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    print_banner();

    tracing::info!(
        database = %config.storage.database.display(),
        bulk_max_targets = config.access.bulk_max_targets,
        "configuration loaded"
    );

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
        Parish Access v{}
        Hierarchical role administration
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
