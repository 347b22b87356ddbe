use anyhow::{bail, Context};
use std::io::Read;
use test_explorer::explorer::TestForest;
use test_explorer::server::config::ConfigManager;
use test_explorer::types::BuildTargetUpdate;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Apply discovery updates (a JSON array of build target updates, read from
/// the file given as first argument or from stdin) to an empty forest and
/// print the resulting tree.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let root = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let config_manager = ConfigManager::new();
    let config = config_manager
        .load_from_workspace(&root)
        .await
        .context("Failed to load configuration")?;

    if !config.explorer_enabled() {
        bail!("Test explorer is disabled: test_user_interface is set to code-lenses");
    }

    let input = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read updates from {}", path))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read updates from stdin")?;
            buffer
        }
    };
    let updates: Vec<BuildTargetUpdate> =
        serde_json::from_str(&input).context("Invalid build target updates")?;

    let mut forest = TestForest::new();
    let stats = forest.apply_updates(&updates);
    info!(targets = updates.len(), nodes = forest.len(), ?stats, "Applied updates");

    println!("{}", serde_json::to_string_pretty(&forest.snapshot())?);
    Ok(())
}
