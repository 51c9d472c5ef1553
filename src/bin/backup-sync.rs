use std::process::ExitCode;

use backup_sync::{BackupSync, PteroPanel, SyncConfig, logging};

async fn run(config: SyncConfig) -> backup_sync::Result<()> {
    let http = config.download.build_http_client()?;
    let panel = PteroPanel::new(http.clone(), &config.panel_url, config.token.clone());
    BackupSync::new(panel, http, config).run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = config.ensure_download_dir() {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = logging::init(&config.download_dir) {
        eprintln!("Error: failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }

    log::info!(
        "Starting backup sync for server {} into {}",
        config.server_id,
        config.download_dir.display()
    );

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Backup sync failed: {e}");
            ExitCode::FAILURE
        }
    }
}
