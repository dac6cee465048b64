use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{error, info, warn};

use metafile::metainfo::{Metainfo, DEFAULT_PIECE_LENGTH};
use ptorrent::config::cfg::Cfg;
use ptorrent::download::engine::{DownloadEngine, DownloadEngineError, DownloadStatus};
use ptorrent::seeder::piece_store::PieceStore;
use ptorrent::seeder::server::SeederServer;
use ptorrent::tracker::http::query_params::AnnounceEvent;
use ptorrent::tracker::tracker_handler::TrackerHandler;

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 1;
const EXIT_IO: i32 = 2;
const EXIT_NETWORK: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "ptorrent", about = "Share and fetch files through a ptracker")]
struct Args {
    /// Path to the config file
    #[arg(short, long, default_value = "config.cfg")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a torrent descriptor for a file and register it with the tracker
    Create {
        /// File to share
        #[arg(short, long)]
        file: String,
        /// Announce url of the tracker
        #[arg(short, long)]
        announce: String,
        /// Where to write the descriptor (defaults to <file>.torrent)
        #[arg(short, long)]
        output: Option<String>,
        /// Piece length in bytes, power of two
        #[arg(short, long)]
        piece_length: Option<u64>,
    },
    /// Serve the pieces of a file to other peers
    Seed {
        /// Torrent descriptor
        #[arg(short, long)]
        torrent: String,
        /// The backing file to serve
        #[arg(short, long)]
        file: String,
        /// Port to listen on (defaults to the configured TCP_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Download a torrent from its peers
    Download {
        /// Torrent descriptor
        #[arg(short, long)]
        torrent: String,
        /// Output file (defaults to the download directory plus the torrent name)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            process::exit(EXIT_USAGE);
        }
    };

    let config = match Cfg::new(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("Config file {} could not be loaded: {}", args.config, err);
            process::exit(EXIT_IO);
        }
    };

    // One identity per run keeps a torrent instance consistent for its lifetime.
    let client_peer_id = generate_peer_id();

    let code = match args.command {
        Command::Create {
            file,
            announce,
            output,
            piece_length,
        } => run_create(&file, &announce, output, piece_length, &client_peer_id),
        Command::Seed {
            torrent,
            file,
            port,
        } => run_seed(&torrent, &file, port, config, client_peer_id),
        Command::Download { torrent, output } => {
            run_download(&torrent, output, config, client_peer_id)
        }
    };
    process::exit(code);
}

fn run_create(
    file: &str,
    announce: &str,
    output: Option<String>,
    piece_length: Option<u64>,
    client_peer_id: &str,
) -> i32 {
    let piece_length = piece_length.unwrap_or(DEFAULT_PIECE_LENGTH);
    let meta = match Metainfo::build(Path::new(file), announce, piece_length) {
        Ok(meta) => meta,
        Err(err) => {
            error!("Could not build descriptor for {}: {:?}", file, err);
            return EXIT_IO;
        }
    };

    let output = output.unwrap_or_else(|| format!("{}.torrent", file));
    if let Err(err) = meta.save(Path::new(&output)) {
        error!("Could not write descriptor {}: {:?}", output, err);
        return EXIT_IO;
    }

    let handler = match TrackerHandler::new(meta.clone(), 0, client_peer_id.to_string()) {
        Ok(handler) => handler,
        Err(err) => {
            error!("Invalid announce url {}: {:?}", announce, err);
            return EXIT_USAGE;
        }
    };
    if let Err(err) = handler.register_torrent() {
        error!("Could not register torrent with the tracker: {:?}", err);
        return EXIT_NETWORK;
    }

    println!("{}", meta.info_hash);
    info!("Registered {} ({} pieces)", output, meta.total_pieces());
    EXIT_OK
}

fn run_seed(
    torrent: &str,
    file: &str,
    port: Option<u16>,
    config: Cfg,
    client_peer_id: String,
) -> i32 {
    let meta = match Metainfo::load(Path::new(torrent)) {
        Ok(meta) => meta,
        Err(err) => {
            error!("Could not load descriptor {}: {:?}", torrent, err);
            return EXIT_IO;
        }
    };

    let store = match PieceStore::load(&meta, Path::new(file)) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!("Could not load backing file {}: {:?}", file, err);
            return EXIT_IO;
        }
    };

    let port = port.unwrap_or(config.tcp_port);
    let server = match SeederServer::bind(
        meta.clone(),
        store,
        config.clone(),
        client_peer_id.clone(),
        port,
    ) {
        Ok(server) => server,
        Err(err) => {
            error!("Could not bind seeder on port {}: {:?}", port, err);
            return EXIT_IO;
        }
    };
    let local_port = match server.local_port() {
        Ok(local_port) => local_port,
        Err(err) => {
            error!("Could not read the bound port: {:?}", err);
            return EXIT_IO;
        }
    };

    let handler = match TrackerHandler::new(meta.clone(), local_port, client_peer_id) {
        Ok(handler) => handler,
        Err(err) => {
            error!("Invalid announce url {}: {:?}", meta.announce, err);
            return EXIT_USAGE;
        }
    };
    let interval = match handler.announce(Some(AnnounceEvent::Started), 0, 0, 0) {
        Ok(response) => response.interval.max(60),
        Err(err) => {
            error!("Tracker unreachable: {:?}", err);
            return EXIT_NETWORK;
        }
    };

    // Refresh our tracker registration so we stay in the active window.
    thread::spawn(move || loop {
        thread::sleep(Duration::from_secs(interval as u64));
        if let Err(err) = handler.announce(None, 0, 0, 0) {
            warn!("Periodic announce failed: {:?}", err);
        }
    });

    match server.serve() {
        Ok(()) => EXIT_OK,
        Err(err) => {
            error!("Seeder stopped: {:?}", err);
            EXIT_IO
        }
    }
}

fn run_download(torrent: &str, output: Option<String>, config: Cfg, client_peer_id: String) -> i32 {
    let meta = match Metainfo::load(Path::new(torrent)) {
        Ok(meta) => meta,
        Err(err) => {
            error!("Could not load descriptor {}: {:?}", torrent, err);
            return EXIT_IO;
        }
    };

    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&config.download_directory).join(meta.name()));

    let handler = match TrackerHandler::new(meta.clone(), config.tcp_port, client_peer_id.clone())
    {
        Ok(handler) => handler,
        Err(err) => {
            error!("Invalid announce url {}: {:?}", meta.announce, err);
            return EXIT_USAGE;
        }
    };
    let response = match handler.announce(Some(AnnounceEvent::Started), 0, 0, meta.length()) {
        Ok(response) => response,
        Err(err) => {
            error!("Tracker unreachable: {:?}", err);
            return EXIT_NETWORK;
        }
    };
    if response.peers.is_empty() {
        error!("The tracker returned no peers for {}", meta.name());
        return EXIT_NETWORK;
    }

    let engine = DownloadEngine::new(meta.clone(), output.clone(), config, client_peer_id);
    match engine.run(response.peers) {
        Ok(DownloadStatus::Completed) => {
            let downloaded = meta.length();
            if let Err(err) =
                handler.announce(Some(AnnounceEvent::Completed), 0, downloaded, 0)
            {
                warn!("Could not report completion to the tracker: {:?}", err);
            }
            if let Err(err) = handler.announce(Some(AnnounceEvent::Stopped), 0, downloaded, 0) {
                warn!("Could not report stop to the tracker: {:?}", err);
            }
            println!("{}", output.display());
            EXIT_OK
        }
        Ok(DownloadStatus::Stopped) => {
            let _ = handler.announce(Some(AnnounceEvent::Stopped), 0, 0, meta.length());
            info!("Download stopped before completion");
            EXIT_OK
        }
        Err(DownloadEngineError::DiskError(err)) => {
            error!("Reassembly failed: {}", err);
            EXIT_IO
        }
        Err(err) => {
            error!("Download failed: {:?}", err);
            EXIT_NETWORK
        }
    }
}

/// One random identity per process run: `-PT0001-` plus 12 alphanumerics.
fn generate_peer_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("-PT0001-{}", suffix)
}
