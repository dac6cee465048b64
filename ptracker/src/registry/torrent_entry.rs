use chrono::{DateTime, Local};
use metafile::metainfo::Metainfo;
use serde::{Deserialize, Serialize};

/// Struct that represents a torrent registered with the tracker, with its
/// aggregate counters.
///
/// ## Fields
/// * `meta`: The registered descriptor.
/// * `seeders`: The current amount of active seeders.
/// * `leechers`: The current amount of active leechers.
/// * `completed`: Lifetime count of completion events.
/// * `added_at`: When the torrent was registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentEntry {
    pub meta: Metainfo,
    pub seeders: u32,
    pub leechers: u32,
    pub completed: u32,
    pub added_at: DateTime<Local>,
}

/// The view of a torrent returned by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentSummary {
    pub info_hash: String,
    pub name: String,
    pub length: u64,
    pub piece_length: u64,
    pub num_pieces: u32,
    pub seeders: u32,
    pub leechers: u32,
    pub completed: u32,
}

impl TorrentEntry {
    /// Creates a new entry for a freshly registered descriptor.
    pub fn new(meta: Metainfo) -> Self {
        Self {
            meta,
            seeders: 0,
            leechers: 0,
            completed: 0,
            added_at: Local::now(),
        }
    }

    pub fn summary(&self) -> TorrentSummary {
        TorrentSummary {
            info_hash: self.meta.info_hash.clone(),
            name: self.meta.name(),
            length: self.meta.length(),
            piece_length: self.meta.piece_length(),
            num_pieces: self.meta.total_pieces(),
            seeders: self.seeders,
            leechers: self.leechers,
            completed: self.completed,
        }
    }
}
