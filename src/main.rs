use mailspool::modules::{
    database::manager::DatabaseManager,
    dispatch::Mailer,
    error::{code::ErrorCode, MailSpoolResult},
    logger,
    settings::dir::DataDirManager,
    Initialize,
};
use mailspool::{mailspool_version, raise_error};
use mimalloc::MiMalloc;
use tracing::info;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
                  _ _                       _
  _ __ ___   __ _(_) |___ _ __   ___   ___ | |
 | '_ ` _ \ / _` | | / __| '_ \ / _ \ / _ \| |
 | | | | | | (_| | | \__ \ |_) | (_) | (_) | |
 |_| |_| |_|\__,_|_|_|___/ .__/ \___/ \___/|_|
                         |_|
"#;

#[tokio::main]
async fn main() -> MailSpoolResult<()> {
    let _log_guard = logger::init();
    info!("{}", LOGO);
    info!("Starting mailspool");
    info!("Version:  {}", mailspool_version!());

    if let Err(error) = initialize().await {
        eprintln!("{:?}", error);
        return Err(error);
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
    info!("Shutdown signal received, stopping mailspool");
    Ok(())
}

/// Initialize the system: data directories, databases, then the dispatcher.
async fn initialize() -> MailSpoolResult<()> {
    DataDirManager::initialize().await?;
    DatabaseManager::initialize().await?;
    Mailer::initialize().await?;
    Ok(())
}
