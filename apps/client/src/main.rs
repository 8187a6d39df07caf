use tracing_subscriber::EnvFilter;

use merx_account::header::HeaderView;
use merx_client::app::App;
use merx_client::config::ClientConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = ClientConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let app = App::start(config).await?;

    let credentials = (std::env::var("MERX_EMAIL"), std::env::var("MERX_PASSWORD"));
    if let (Ok(email), Ok(password)) = credentials {
        if let Err(e) = app.sign_in(&email, &password).await {
            tracing::error!(error = %e, "sign in failed");
        }
    }

    let mut header = app.header();
    header.sync().await;
    match header.view() {
        HeaderView::LoggedIn { display_name } => tracing::info!(%display_name, "signed in"),
        view => tracing::info!(?view, "not signed in"),
    }

    app.shutdown();
    Ok(())
}
