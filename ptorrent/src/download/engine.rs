use std::collections::{HashMap, HashSet};
use std::net::{Shutdown, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use metafile::metainfo::Metainfo;
use tracing::{info, warn};

use crate::config::cfg::Cfg;
use crate::peer::peer_session::PeerSession;
use crate::peer::remote_peer::RemotePeer;

use super::piece_manager::{PieceManager, PieceManagerError};
use super::storage;

/// How long the monitor sleeps between checks.
const MONITOR_POLL_MILLIS: u64 = 250;
/// How often the monitor logs a progress line.
const PROGRESS_REPORT_SECONDS: u64 = 2;

/// Completed piece bodies keyed by index, buffered until reassembly.
pub type PieceBuffer = Mutex<HashMap<u32, Vec<u8>>>;

/// Shared control and accounting state between the engine and its peer
/// sessions. Sessions observe `running`/`paused` at every suspension point.
#[derive(Debug)]
pub struct EngineState {
    running: AtomicBool,
    paused: AtomicBool,
    connected_peers: AtomicUsize,
    downloaded_bytes: AtomicU64,
    sockets: Mutex<Vec<TcpStream>>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            connected_peers: AtomicUsize::new(0),
            downloaded_bytes: AtomicU64::new(0),
            sockets: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Cooperatively halts new piece requests. Sockets stay open and late
    /// deliveries are still accepted once resumed.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    /// Marks the engine terminal and unblocks pending socket I/O. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Ok(sockets) = self.sockets.lock() {
            for socket in sockets.iter() {
                let _ = socket.shutdown(Shutdown::Both);
            }
        }
    }

    pub fn connected_peers(&self) -> usize {
        self.connected_peers.load(Ordering::Relaxed)
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn register_socket(&self, stream: &TcpStream) {
        if let (Ok(clone), Ok(mut sockets)) = (stream.try_clone(), self.sockets.lock()) {
            sockets.push(clone);
        }
    }

    pub(crate) fn peer_connected(&self) {
        self.connected_peers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn peer_disconnected(&self) {
        self.connected_peers.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn add_downloaded_bytes(&self, bytes: u64) {
        self.downloaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Download progress snapshot.
#[derive(Debug, Clone)]
pub struct Progress {
    pub completed_pieces: u32,
    pub total_pieces: u32,
    pub connected_peers: usize,
    pub downloaded_bytes: u64,
    pub stalled: bool,
}

impl Progress {
    /// Completion percentage in `[0, 100]`.
    pub fn completion(&self) -> f64 {
        if self.total_pieces == 0 {
            return 100.0;
        }
        (self.completed_pieces as f64 / self.total_pieces as f64) * 100.0
    }
}

/// Terminal outcome of `DownloadEngine::run`.
#[derive(Debug, PartialEq, Eq)]
pub enum DownloadStatus {
    Completed,
    Stopped,
}

/// Posible `DownloadEngine` errors.
#[derive(Debug)]
pub enum DownloadEngineError {
    NoPeersAvailable,
    PieceManagerError(PieceManagerError),
    PoisonedBufferLock,
    DiskError(std::io::Error),
    Stalled,
}

impl From<PieceManagerError> for DownloadEngineError {
    fn from(err: PieceManagerError) -> Self {
        DownloadEngineError::PieceManagerError(err)
    }
}

/// Drives a single torrent to completion from a list of peers.
///
/// One thread per peer connection, all coordinated through the shared piece
/// manager; completed pieces are buffered in memory and flushed to the
/// output file in one serialized pass at the end.
pub struct DownloadEngine {
    meta: Metainfo,
    output_path: PathBuf,
    config: Cfg,
    client_peer_id: String,
    piece_manager: Arc<PieceManager>,
    buffer: Arc<PieceBuffer>,
    state: Arc<EngineState>,
}

impl DownloadEngine {
    pub fn new(meta: Metainfo, output_path: PathBuf, config: Cfg, client_peer_id: String) -> Self {
        let piece_manager = Arc::new(PieceManager::new(meta.total_pieces()));
        Self {
            meta,
            output_path,
            config,
            client_peer_id,
            piece_manager,
            buffer: Arc::new(Mutex::new(HashMap::new())),
            state: Arc::new(EngineState::new()),
        }
    }

    /// Returns the control handle used for `pause`/`resume`/`stop` and for
    /// reading the byte counters.
    pub fn state(&self) -> Arc<EngineState> {
        self.state.clone()
    }

    /// Returns a snapshot of the download progress.
    pub fn progress(&self) -> Result<Progress, DownloadEngineError> {
        Ok(Progress {
            completed_pieces: self.piece_manager.completed_count()?,
            total_pieces: self.meta.total_pieces(),
            connected_peers: self.state.connected_peers(),
            downloaded_bytes: self.state.downloaded_bytes(),
            stalled: self.piece_manager.is_stalled()?,
        })
    }

    /// Connects to up to `max_peers_per_download` of the given peers and runs
    /// the download until completion or `stop`.
    ///
    /// # Errors
    /// - `NoPeersAvailable` if the deduplicated peer list is empty.
    /// - `Stalled` if every connection died and nothing happened for a full
    ///   inactivity window.
    /// - `DiskError` if reassembly fails; the in-memory piece buffers are
    ///   kept for recovery.
    pub fn run(&self, peers: Vec<RemotePeer>) -> Result<DownloadStatus, DownloadEngineError> {
        let selected: Vec<RemotePeer> = dedup_peers(peers)
            .into_iter()
            .take(self.config.max_peers_per_download as usize)
            .collect();
        if selected.is_empty() {
            return Err(DownloadEngineError::NoPeersAvailable);
        }

        let started_at = Local::now();
        info!(
            "Starting download of {} from {} peers",
            self.meta.name(),
            selected.len()
        );

        let mut handles = Vec::new();
        for peer in selected {
            let peer_addr = peer.addr();
            let mut session = PeerSession::new(
                peer,
                self.meta.clone(),
                self.piece_manager.clone(),
                self.buffer.clone(),
                self.state.clone(),
                self.config.clone(),
                self.client_peer_id.clone(),
            );

            let builder = thread::Builder::new()
                .name(format!("Download: {} / Peer: {}", self.meta.name(), peer_addr));
            match builder.spawn(move || {
                if let Err(err) = session.run() {
                    warn!("Peer session {} ended: {:?}", peer_addr, err);
                }
            }) {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!("Couldn't spawn peer session: {}", err),
            }
        }

        let monitor_result = self.monitor(&handles);

        let completed = self.piece_manager.is_complete()?;
        self.state.stop();
        for handle in handles {
            let _ = handle.join();
        }
        monitor_result?;

        if completed {
            let buffer = self
                .buffer
                .lock()
                .map_err(|_| DownloadEngineError::PoisonedBufferLock)?;
            storage::assemble_file(&self.output_path, &buffer, &self.meta)
                .map_err(DownloadEngineError::DiskError)?;
            let elapsed = Local::now().signed_duration_since(started_at);
            info!(
                "Download of {} completed at {} in {}ms",
                self.meta.name(),
                self.output_path.display(),
                elapsed.num_milliseconds()
            );
            Ok(DownloadStatus::Completed)
        } else {
            Ok(DownloadStatus::Stopped)
        }
    }

    fn monitor(&self, handles: &[thread::JoinHandle<()>]) -> Result<(), DownloadEngineError> {
        let mut dead_since: Option<Instant> = None;
        let mut reported_stalled = false;
        let mut last_report = Instant::now();

        loop {
            if !self.state.is_running() {
                return Ok(());
            }
            if self.piece_manager.is_complete()? {
                return Ok(());
            }

            if last_report.elapsed() >= Duration::from_secs(PROGRESS_REPORT_SECONDS) {
                let progress = self.progress()?;
                info!(
                    "{}: {:.1}% ({}/{} pieces, {} bytes) from {} peers",
                    self.meta.name(),
                    progress.completion(),
                    progress.completed_pieces,
                    progress.total_pieces,
                    progress.downloaded_bytes,
                    progress.connected_peers
                );
                last_report = Instant::now();
            }

            let all_sessions_done = handles.iter().all(|handle| handle.is_finished());

            if self.piece_manager.is_stalled()? || all_sessions_done {
                if !reported_stalled {
                    warn!(
                        "Download of {} stalled: missing pieces with no peer to supply them",
                        self.meta.name()
                    );
                    reported_stalled = true;
                }
            } else {
                reported_stalled = false;
            }

            if all_sessions_done {
                let since = dead_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= Duration::from_secs(self.config.inactivity_seconds_timeout) {
                    return Err(DownloadEngineError::Stalled);
                }
            } else {
                dead_since = None;
            }

            thread::sleep(Duration::from_millis(MONITOR_POLL_MILLIS));
        }
    }
}

/// Deduplicates peers by `(ip, port)`, keeping first occurrences in order.
fn dedup_peers(peers: Vec<RemotePeer>) -> Vec<RemotePeer> {
    let mut seen = HashSet::new();
    peers
        .into_iter()
        .filter(|peer| seen.insert((peer.ip.clone(), peer.port)))
        .collect()
}
