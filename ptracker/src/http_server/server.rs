use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::http_server::request_handler::RequestHandler;
use crate::http_server::worker_pool::WorkerPool;
use crate::registry::catalog::AtomicCatalog;

/// Worker threads handling requests concurrently.
const POOL_SIZE: usize = 64;

/// Struct that represents the HTTP Server that listens for connections to the Tracker.
///
/// ## Fields
/// * `listener`: The TCP server bound to the socket, responsible of listening for connections.
/// * `pool`: A worker pool so requests are handled in parallel.
/// * `catalog`: Current state of the tracker.
/// * `snapshot_path`: Where registrations persist the catalog.
pub struct Server {
    listener: TcpListener,
    pool: WorkerPool,
    catalog: Arc<AtomicCatalog>,
    snapshot_path: Option<Arc<PathBuf>>,
    port: u16,
}

impl Server {
    /// Creates a new `Server`.
    pub fn init(
        catalog: Arc<AtomicCatalog>,
        snapshot_path: Option<Arc<PathBuf>>,
        port: u16,
    ) -> std::io::Result<Server> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port))?;
        Ok(Server {
            listener,
            pool: WorkerPool::new(POOL_SIZE),
            catalog,
            snapshot_path,
            port,
        })
    }

    /// Returns the port the server is listening on.
    pub fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Handles new connections to the server.
    pub fn serve(&self) -> std::io::Result<()> {
        info!("Serving on http://0.0.0.0:{}", self.port);

        for stream in self.listener.incoming() {
            let stream = stream?;
            let mut request_handler = RequestHandler::new(stream);
            let catalog = self.catalog.clone();
            let snapshot_path = self.snapshot_path.clone();
            let _ = self.pool.execute(move || {
                if let Err(error) = request_handler.handle(catalog, snapshot_path) {
                    error!(
                        "An error occurred while attempting to handle a request: {:?}",
                        error
                    );
                }
            });
        }
        Ok(())
    }
}
