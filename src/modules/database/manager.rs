use crate::modules::database::{META_MODELS, QUEUE_MODELS};
use crate::modules::error::{code::ErrorCode, MailSpoolError, MailSpoolResult};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use crate::modules::Initialize;
use crate::raise_error;
use native_db::{Builder, Database, Models};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

pub static DB_MANAGER: LazyLock<DatabaseManager> = LazyLock::new(DatabaseManager::new);

/// A queue row is the request JSON plus the context snapshot, a few KB at
/// most, and the active queue rarely holds more than a few thousand of
/// them. 32MB keeps the whole working set resident.
const QUEUE_CACHE_BYTES: usize = 32 * 1024 * 1024;

/// The settings database holds one row under a fixed key.
const META_CACHE_BYTES: usize = 4 * 1024 * 1024;

pub struct DatabaseManager {
    /// Queue database instance
    queue_db: Arc<Database<'static>>,
    /// Settings database instance
    meta_db: Arc<Database<'static>>,
}

impl DatabaseManager {
    fn new() -> Self {
        let queue_cache = SETTINGS
            .mailspool_db_cache_size
            .unwrap_or(QUEUE_CACHE_BYTES);
        info!(
            "Opening queue database at {} (cache {} bytes)",
            DATA_DIR_MANAGER.queue_db.display(),
            queue_cache
        );
        let mut queue_db = Self::open(&QUEUE_MODELS, &DATA_DIR_MANAGER.queue_db, queue_cache)
            .expect("queue database must open");
        // purged entries leave free pages behind; reclaim them on boot
        match queue_db.compact() {
            Ok(true) => info!("queue database compacted"),
            Ok(false) => {}
            Err(error) => warn!("queue database compaction skipped: {:?}", error),
        }

        let meta_db = Self::open(&META_MODELS, &DATA_DIR_MANAGER.meta_db, META_CACHE_BYTES)
            .expect("settings database must open");

        DatabaseManager {
            queue_db: Arc::new(queue_db),
            meta_db: Arc::new(meta_db),
        }
    }

    /// Get a reference to the queue database
    pub fn queue_db(&self) -> &Arc<Database<'static>> {
        &self.queue_db
    }

    /// Get a reference to the settings database
    pub fn meta_db(&self) -> &Arc<Database<'static>> {
        &self.meta_db
    }

    fn open(
        models: &'static Models,
        path: &Path,
        cache_bytes: usize,
    ) -> MailSpoolResult<Database<'static>> {
        Builder::new()
            .set_cache_size(cache_bytes)
            .create(models, path)
            .map_err(|error| Self::open_error(path, error))
    }

    fn open_error(path: &Path, error: native_db::db_type::Error) -> MailSpoolError {
        let message = match error {
            native_db::db_type::Error::RedbDatabaseError(
                redb::DatabaseError::DatabaseAlreadyOpen,
            ) => format!(
                "{} is locked by another mailspool instance",
                path.display()
            ),
            other => format!("failed to open {}: {:?}", path.display(), other),
        };
        raise_error!(message, ErrorCode::InternalError)
    }
}

impl Initialize for DatabaseManager {
    async fn initialize() -> MailSpoolResult<()> {
        LazyLock::force(&DB_MANAGER);
        Ok(())
    }
}
