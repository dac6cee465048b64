use std::path::PathBuf;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, warn};

use crate::registry::catalog::AtomicCatalog;
use crate::registry::storage;

/// Struct that periodically expires stale peers and persists the catalog.
#[derive(Debug)]
pub struct Sweeper {
    catalog: Arc<AtomicCatalog>,
    snapshot_path: Option<Arc<PathBuf>>,
    interval: Duration,
}

impl Sweeper {
    /// Creates a new `Sweeper`.
    pub fn new(
        catalog: Arc<AtomicCatalog>,
        snapshot_path: Option<Arc<PathBuf>>,
        interval: Duration,
    ) -> Self {
        Self {
            catalog,
            snapshot_path,
            interval,
        }
    }

    /// Runs the maintenance loop forever.
    pub fn run(&self) {
        loop {
            sleep(self.interval);
            self.sweep_once();
        }
    }

    /// One maintenance pass: expire stale peers, persist the snapshot.
    pub fn sweep_once(&self) {
        self.catalog.remove_stale_peers();
        debug!("Expired stale peers");

        if let Some(path) = &self.snapshot_path {
            if let Err(err) = storage::save(&self.catalog.snapshot(), path) {
                warn!("Could not persist catalog snapshot: {:?}", err);
            }
        }
    }
}
