use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Struct that represents a peer known to the tracker.
///
/// ## Fields
/// * `peer_id`: The self-selected id of the peer.
/// * `ip`: The ip the peer is reachable on.
/// * `port`: The port the peer is reachable on.
/// * `uploaded`: The number of bytes uploaded by the peer.
/// * `downloaded`: The number of bytes downloaded by the peer.
/// * `left`: The number of bytes the peer still has to download.
/// * `last_announce`: The last time the peer announced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: String,
    pub ip: String,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub last_announce: DateTime<Local>,
}

impl PeerRecord {
    /// Returns `true` if the peer holds the complete file.
    pub fn is_seeder(&self) -> bool {
        self.left == 0
    }

    /// Returns `true` if the peer announced after `cutoff`.
    pub fn is_active_since(&self, cutoff: DateTime<Local>) -> bool {
        self.last_announce > cutoff
    }
}
