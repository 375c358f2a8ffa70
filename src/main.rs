//! ambientmix - ambient mix dataset acquisition pipeline.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Run CLI; logging is installed once settings are known
    ambientmix::cli::run().await
}
