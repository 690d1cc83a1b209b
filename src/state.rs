use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::session::SessionKeys;
use crate::config::Config;
use crate::media::{LocalMediaStore, MediaStore};
use crate::realtime::{ConnectionRegistry, EventSink, LocalBroadcaster};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub sessions: SessionKeys,
    pub registry: Arc<ConnectionRegistry>,
    pub events: Arc<dyn EventSink>,
    pub media: Arc<dyn MediaStore>,
}

impl AppState {
    /// Wires the in-process registry, broadcaster and file-backed media store.
    pub fn new(db: DbPool, config: Config) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let events: Arc<dyn EventSink> = Arc::new(LocalBroadcaster::new(registry.clone()));
        let media: Arc<dyn MediaStore> = Arc::new(LocalMediaStore::new(
            config.uploads_path(),
            &config.storage.public_url,
        ));
        let sessions = SessionKeys::from_config(&config.auth);
        Self {
            db,
            config,
            sessions,
            registry,
            events,
            media,
        }
    }
}
