use std::env;
use std::path::PathBuf;

use ptracker::service::tracker::Tracker;
use tracing::error;

fn main() {
    // install global collector configured based on RUST_LOG env var.
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        return error!("Usage: ptracker <port> [snapshot-file]");
    }
    let port = match args[1].parse::<u16>() {
        Ok(port) => port,
        Err(_) => return error!("Invalid port number"),
    };
    let snapshot_path = args.get(2).map(PathBuf::from);

    match Tracker::init(port, snapshot_path) {
        Ok(tracker) => match tracker.run() {
            Ok(_) => (),
            Err(e) => error!("Error: {:?}", e),
        },
        Err(error) => {
            error!("Error: {:?}", error);
        }
    }
}
