use serde::Serialize;

use crate::registry::catalog::AnnounceOutcome;

/// One peer contact in an announce response.
#[derive(Debug, Serialize)]
pub struct PeerEntry {
    pub peer_id: String,
    pub ip: String,
    pub port: u16,
}

/// Struct representing the response of a tracker announce request.
///
/// ## Fields
/// * `interval`: Seconds the client should wait between regular announces.
/// * `complete`: Number of active seeders for the torrent.
/// * `incomplete`: Number of active leechers for the torrent.
/// * `peers`: Up to 50 other active peers of the torrent.
#[derive(Debug, Serialize)]
pub struct AnnounceResponse {
    pub interval: u32,
    pub complete: u32,
    pub incomplete: u32,
    pub peers: Vec<PeerEntry>,
}

impl AnnounceResponse {
    /// Creates the response body from a catalog announce outcome.
    pub fn from_outcome(outcome: AnnounceOutcome) -> Self {
        let peers = outcome
            .peers
            .into_iter()
            .map(|peer| PeerEntry {
                peer_id: peer.peer_id,
                ip: peer.ip,
                port: peer.port,
            })
            .collect();

        Self {
            interval: outcome.interval,
            complete: outcome.complete,
            incomplete: outcome.incomplete,
            peers,
        }
    }
}
