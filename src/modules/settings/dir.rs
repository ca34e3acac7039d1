use crate::modules::settings::cli::SETTINGS;
use crate::modules::Initialize;
use crate::{
    modules::error::{code::ErrorCode, MailSpoolResult},
    raise_error,
};
use std::path::PathBuf;
use std::sync::LazyLock;

pub const QUEUE_FILE: &str = "queue.db";
pub const META_FILE: &str = "meta.db";
const LOG_DIR: &str = "logs";

pub static DATA_DIR_MANAGER: LazyLock<DataDirManager> =
    LazyLock::new(|| DataDirManager::new(PathBuf::from(&SETTINGS.mailspool_root_dir)));

#[derive(Debug)]
pub struct DataDirManager {
    pub root_dir: PathBuf,
    pub queue_db: PathBuf,
    pub meta_db: PathBuf,
    pub log_dir: PathBuf,
}

impl Initialize for DataDirManager {
    async fn initialize() -> MailSpoolResult<()> {
        std::fs::create_dir_all(&DATA_DIR_MANAGER.root_dir)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        std::fs::create_dir_all(&DATA_DIR_MANAGER.log_dir)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(())
    }
}

impl DataDirManager {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir: root_dir.clone(),
            queue_db: root_dir.join(QUEUE_FILE),
            meta_db: root_dir.join(META_FILE),
            log_dir: root_dir.join(LOG_DIR),
        }
    }
}
