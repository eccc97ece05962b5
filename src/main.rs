use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env file if present (for development convenience)
    // Silently ignore if not found - production uses system env vars
    let _ = dotenvy::dotenv();

    // Diagnostics go to stderr; stdout carries the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = parley::settings::load_settings();

    if let Err(e) = parley::run(settings).await {
        tracing::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}
