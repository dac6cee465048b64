use std::fs;
use std::path::Path;

use tracing::warn;

use super::catalog::CatalogSnapshot;

/// Posible snapshot storage errors.
#[derive(Debug)]
pub enum StorageError {
    FileError(std::io::Error),
    EncodingError(serde_json::Error),
}

/// Writes the catalog snapshot to `path` as JSON, going through a temp file
/// and a rename so a crash never leaves a half-written snapshot behind.
pub fn save(snapshot: &CatalogSnapshot, path: &Path) -> Result<(), StorageError> {
    let json = serde_json::to_string(snapshot).map_err(StorageError::EncodingError)?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    fs::write(&temp_path, json).map_err(StorageError::FileError)?;
    fs::rename(&temp_path, path).map_err(StorageError::FileError)
}

/// Loads a catalog snapshot from `path`. A missing file is an empty catalog;
/// an unreadable one is reported and skipped.
pub fn load(path: &Path) -> Option<CatalogSnapshot> {
    if !path.exists() {
        return None;
    }
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("Discarding unreadable snapshot {}: {}", path.display(), err);
                None
            }
        },
        Err(err) => {
            warn!("Could not read snapshot {}: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use chrono::Local;
    use metafile::metainfo::{Info, Metainfo};

    use crate::registry::catalog::TorrentSwarm;
    use crate::registry::peer_record::PeerRecord;
    use crate::registry::torrent_entry::TorrentEntry;

    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let path = PathBuf::from("./test_storage_round_trip.json");
        let snapshot = create_test_snapshot();

        save(&snapshot, &path).unwrap();
        let loaded = load(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded.len(), 1);
        let swarm = loaded.values().next().unwrap();
        assert_eq!(swarm.peers.len(), 1);
        assert_eq!(swarm.entry.completed, 3);
    }

    #[test]
    fn test_load_missing_file_is_none() {
        assert!(load(Path::new("./does_not_exist.json")).is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_none() {
        let path = PathBuf::from("./test_storage_corrupt.json");
        fs::write(&path, b"{not json").unwrap();

        let loaded = load(&path);
        fs::remove_file(&path).unwrap();

        assert!(loaded.is_none());
    }

    // Auxiliary functions

    fn create_test_snapshot() -> CatalogSnapshot {
        let info = Info {
            length: 600,
            name: "example".to_string(),
            piece_length: 256,
            pieces: "ab".repeat(20).repeat(3),
        };
        let info_hash = Metainfo::compute_info_hash(&info).unwrap();
        let meta = Metainfo {
            announce: "http://localhost:8000/announce".to_string(),
            info,
            info_hash: info_hash.clone(),
        };

        let mut entry = TorrentEntry::new(meta);
        entry.completed = 3;

        let mut peers = HashMap::new();
        peers.insert(
            "peer-1".to_string(),
            PeerRecord {
                peer_id: "peer-1".to_string(),
                ip: "10.0.0.1".to_string(),
                port: 6881,
                uploaded: 0,
                downloaded: 600,
                left: 0,
                last_announce: Local::now(),
            },
        );

        let mut snapshot = CatalogSnapshot::new();
        snapshot.insert(info_hash, TorrentSwarm { entry, peers });
        snapshot
    }
}
