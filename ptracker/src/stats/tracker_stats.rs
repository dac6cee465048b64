use serde::{Deserialize, Serialize};

/// Struct containing the current global counters of the tracker.
///
/// ## Fields
/// * `torrents`: The total number of registered torrents.
/// * `seeders`: The total number of active seeders across torrents.
/// * `leechers`: The total number of active leechers across torrents.
/// * `active_peers`: The total number of peers inside the activity window.
/// * `completed`: Lifetime completion events across torrents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackerStats {
    pub torrents: u32,
    pub seeders: u32,
    pub leechers: u32,
    pub active_peers: u32,
    pub completed: u32,
}
