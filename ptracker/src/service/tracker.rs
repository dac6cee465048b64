use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::spawn;
use std::time::Duration;

use tracing::info;

use crate::http_server::server::Server;
use crate::registry::catalog::AtomicCatalog;
use crate::registry::storage;
use crate::service::sweeper::Sweeper;

const SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Struct that represents the Tracker itself.
///
/// Serves as a starting point for the application: restores the catalog,
/// spawns the maintenance sweeper and owns the HTTP server.
pub struct Tracker {
    server: Server,
}

/// Posible `Tracker` errors.
#[derive(Debug)]
pub enum TrackerError {
    CreatingServerError(io::Error),
    StartingServerError(io::Error),
}

impl Tracker {
    /// Creates a new Tracker listening on `port`. If `snapshot_path` is
    /// given, the catalog is restored from it and persisted back to it.
    pub fn init(port: u16, snapshot_path: Option<PathBuf>) -> Result<Self, TrackerError> {
        let snapshot_path = snapshot_path.map(Arc::new);

        let catalog = Arc::new(AtomicCatalog::default());
        if let Some(path) = &snapshot_path {
            if let Some(snapshot) = storage::load(path) {
                info!("Restored catalog snapshot from {}", path.display());
                catalog.restore(snapshot);
            }
        }

        Self::spawn_sweeper(catalog.clone(), snapshot_path.clone());

        let server = Server::init(catalog, snapshot_path, port)
            .map_err(TrackerError::CreatingServerError)?;

        info!("Tracker started");

        Ok(Self { server })
    }

    /// Starts the server for handling requests.
    pub fn run(&self) -> Result<(), TrackerError> {
        self.server
            .serve()
            .map_err(TrackerError::StartingServerError)
    }

    /// Returns the port the server is listening on.
    pub fn local_port(&self) -> Result<u16, TrackerError> {
        self.server
            .local_port()
            .map_err(TrackerError::CreatingServerError)
    }

    fn spawn_sweeper(catalog: Arc<AtomicCatalog>, snapshot_path: Option<Arc<PathBuf>>) {
        let sweeper = Sweeper::new(
            catalog,
            snapshot_path,
            Duration::from_secs(SWEEP_INTERVAL_SECONDS),
        );
        spawn(move || {
            sweeper.run();
        });
    }
}
