use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Local};
use metafile::metainfo::Metainfo;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};

use crate::announce::announce_request::AnnounceRequest;
use crate::announce::event::PeerEvent;
use crate::stats::tracker_stats::TrackerStats;

use super::peer_record::PeerRecord;
use super::torrent_entry::{TorrentEntry, TorrentSummary};

/// Seconds a client should wait between regular announces.
pub const ANNOUNCE_INTERVAL_SECONDS: u32 = 1800;
/// Hours after which a silent peer stops being active.
pub const PEER_ACTIVE_HOURS: i64 = 2;
/// Maximum number of other peers handed out per announce.
pub const MAX_PEERS_RETURNED: usize = 50;

/// One registered torrent together with its peer table, keyed by peer id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentSwarm {
    pub entry: TorrentEntry,
    pub peers: HashMap<String, PeerRecord>,
}

/// The serializable whole-catalog state used for snapshots.
pub type CatalogSnapshot = HashMap<String, TorrentSwarm>;

/// Posible `AtomicCatalog` errors.
#[derive(Debug, PartialEq, Eq)]
pub enum CatalogError {
    UnknownTorrent,
}

/// What an accepted announce hands back to the peer.
#[derive(Debug)]
pub struct AnnounceOutcome {
    pub interval: u32,
    pub complete: u32,
    pub incomplete: u32,
    pub peers: Vec<PeerRecord>,
}

/// Struct that represents the whole tracker state: every registered torrent
/// with its peers and aggregate counters.
///
/// It is `Atomic`: all operations take the single internal lock, so each
/// announce is one consistent transaction.
#[derive(Debug, Default)]
pub struct AtomicCatalog {
    swarms: Mutex<CatalogSnapshot>,
}

impl AtomicCatalog {
    /// Registers a torrent descriptor. Re-registering an already known
    /// torrent keeps the existing entry and its counters.
    pub fn register(&self, meta: Metainfo) -> TorrentSummary {
        let mut swarms = self.lock_swarms();
        let swarm = swarms
            .entry(meta.info_hash.clone())
            .or_insert_with(|| TorrentSwarm {
                entry: TorrentEntry::new(meta),
                peers: HashMap::new(),
            });
        swarm.entry.summary()
    }

    /// Returns the summary of a torrent, if registered.
    pub fn get(&self, info_hash: &str) -> Option<TorrentSummary> {
        self.lock_swarms()
            .get(info_hash)
            .map(|swarm| swarm.entry.summary())
    }

    /// Returns the registered descriptor of a torrent, if registered.
    pub fn meta(&self, info_hash: &str) -> Option<Metainfo> {
        self.lock_swarms()
            .get(info_hash)
            .map(|swarm| swarm.entry.meta.clone())
    }

    /// Returns the summaries of every registered torrent.
    pub fn list(&self) -> Vec<TorrentSummary> {
        self.lock_swarms()
            .values()
            .map(|swarm| swarm.entry.summary())
            .collect()
    }

    /// Handles one announce as a single transaction: upserts the peer record,
    /// applies the event, recomputes the torrent aggregates and returns up to
    /// `MAX_PEERS_RETURNED` other active peers.
    ///
    /// # Errors
    /// - `UnknownTorrent` if the torrent was never registered.
    pub fn announce(
        &self,
        request: &AnnounceRequest,
        source_ip: &str,
    ) -> Result<AnnounceOutcome, CatalogError> {
        self.announce_at(request, source_ip, Local::now())
    }

    fn announce_at(
        &self,
        request: &AnnounceRequest,
        source_ip: &str,
        now: DateTime<Local>,
    ) -> Result<AnnounceOutcome, CatalogError> {
        let mut swarms = self.lock_swarms();
        let swarm = swarms
            .get_mut(&request.info_hash)
            .ok_or(CatalogError::UnknownTorrent)?;
        let cutoff = now - Duration::hours(PEER_ACTIVE_HOURS);

        if request.event == Some(PeerEvent::Stopped) {
            swarm.peers.remove(&request.peer_id);
            Self::recompute_aggregates(swarm, cutoff);
            return Ok(AnnounceOutcome {
                interval: ANNOUNCE_INTERVAL_SECONDS,
                complete: swarm.entry.seeders,
                incomplete: swarm.entry.leechers,
                peers: Vec::new(),
            });
        }

        let ip = match &request.ip {
            Some(ip) => ip.clone(),
            None => source_ip.to_string(),
        };
        swarm.peers.insert(
            request.peer_id.clone(),
            PeerRecord {
                peer_id: request.peer_id.clone(),
                ip,
                port: request.port,
                uploaded: request.uploaded,
                downloaded: request.downloaded,
                left: request.left,
                last_announce: now,
            },
        );

        if request.event == Some(PeerEvent::Completed) {
            swarm.entry.completed += 1;
        }

        Self::recompute_aggregates(swarm, cutoff);

        let mut rng = rand::thread_rng();
        let peers = swarm
            .peers
            .values()
            .filter(|peer| peer.peer_id != request.peer_id && peer.is_active_since(cutoff))
            .cloned()
            .choose_multiple(&mut rng, MAX_PEERS_RETURNED);

        Ok(AnnounceOutcome {
            interval: ANNOUNCE_INTERVAL_SECONDS,
            complete: swarm.entry.seeders,
            incomplete: swarm.entry.leechers,
            peers,
        })
    }

    /// Returns the active peers of a torrent.
    ///
    /// # Errors
    /// - `UnknownTorrent` if the torrent was never registered.
    pub fn active_peers(&self, info_hash: &str) -> Result<Vec<PeerRecord>, CatalogError> {
        let swarms = self.lock_swarms();
        let swarm = swarms.get(info_hash).ok_or(CatalogError::UnknownTorrent)?;
        let cutoff = Local::now() - Duration::hours(PEER_ACTIVE_HOURS);

        Ok(swarm
            .peers
            .values()
            .filter(|peer| peer.is_active_since(cutoff))
            .cloned()
            .collect())
    }

    /// Deletes every peer registered with the loopback address. Idempotent.
    pub fn cleanup_loopback(&self) -> usize {
        let mut swarms = self.lock_swarms();
        let cutoff = Local::now() - Duration::hours(PEER_ACTIVE_HOURS);
        let mut removed = 0;

        for swarm in swarms.values_mut() {
            let before = swarm.peers.len();
            swarm.peers.retain(|_, peer| peer.ip != "127.0.0.1");
            removed += before - swarm.peers.len();
            Self::recompute_aggregates(swarm, cutoff);
        }
        removed
    }

    /// For each `(torrent, ip, port)` keeps only the peer record with the
    /// latest announce and deletes the rest. Idempotent.
    pub fn deduplicate(&self) -> usize {
        let mut swarms = self.lock_swarms();
        let cutoff = Local::now() - Duration::hours(PEER_ACTIVE_HOURS);
        let mut removed = 0;

        for swarm in swarms.values_mut() {
            let mut latest: HashMap<(String, u16), (String, DateTime<Local>)> = HashMap::new();
            for (peer_id, peer) in swarm.peers.iter() {
                let key = (peer.ip.clone(), peer.port);
                match latest.get(&key) {
                    Some((_, best)) if *best >= peer.last_announce => (),
                    _ => {
                        latest.insert(key, (peer_id.clone(), peer.last_announce));
                    }
                }
            }
            let keep: HashSet<String> = latest.into_values().map(|(peer_id, _)| peer_id).collect();

            let before = swarm.peers.len();
            swarm.peers.retain(|peer_id, _| keep.contains(peer_id));
            removed += before - swarm.peers.len();
            Self::recompute_aggregates(swarm, cutoff);
        }
        removed
    }

    /// Deletes peers outside the activity window. Idempotent.
    pub fn remove_stale_peers(&self) {
        let mut swarms = self.lock_swarms();
        let cutoff = Local::now() - Duration::hours(PEER_ACTIVE_HOURS);

        for swarm in swarms.values_mut() {
            swarm.peers.retain(|_, peer| peer.is_active_since(cutoff));
            Self::recompute_aggregates(swarm, cutoff);
        }
    }

    /// Gets the current global counters of the tracker.
    pub fn global_stats(&self) -> TrackerStats {
        let swarms = self.lock_swarms();
        let cutoff = Local::now() - Duration::hours(PEER_ACTIVE_HOURS);

        let mut stats = TrackerStats {
            torrents: swarms.len() as u32,
            seeders: 0,
            leechers: 0,
            active_peers: 0,
            completed: 0,
        };
        for swarm in swarms.values() {
            let active = swarm
                .peers
                .values()
                .filter(|peer| peer.is_active_since(cutoff));
            for peer in active {
                stats.active_peers += 1;
                if peer.is_seeder() {
                    stats.seeders += 1;
                } else {
                    stats.leechers += 1;
                }
            }
            stats.completed += swarm.entry.completed;
        }
        stats
    }

    /// Clones the whole catalog state for persistence.
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.lock_swarms().clone()
    }

    /// Replaces the catalog state with a previously saved snapshot.
    pub fn restore(&self, snapshot: CatalogSnapshot) {
        *self.lock_swarms() = snapshot;
    }

    fn recompute_aggregates(swarm: &mut TorrentSwarm, cutoff: DateTime<Local>) {
        let mut seeders = 0;
        let mut leechers = 0;
        for peer in swarm.peers.values() {
            if !peer.is_active_since(cutoff) {
                continue;
            }
            if peer.is_seeder() {
                seeders += 1;
            } else {
                leechers += 1;
            }
        }
        swarm.entry.seeders = seeders;
        swarm.entry.leechers = leechers;
    }

    fn lock_swarms(&self) -> MutexGuard<CatalogSnapshot> {
        self.swarms.lock().unwrap() // Unwrap is safe here because no holder of this lock can panic.
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_register_idempotent.bin");

        let first = catalog.register(meta.clone());
        announce_ok(&catalog, create_request(&meta, "peer-1", 0, None));
        let second = catalog.register(meta.clone());

        assert_eq!(first.info_hash, second.info_hash);
        assert_eq!(catalog.list().len(), 1);
        // Counters survive the re-registration.
        assert_eq!(second.seeders, 1);
    }

    #[test]
    fn test_announce_for_unknown_torrent_fails() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_announce_unknown.bin");
        let request = create_request(&meta, "peer-1", 0, None);

        assert_eq!(
            catalog.announce(&request, "10.0.0.1").unwrap_err(),
            CatalogError::UnknownTorrent
        );
    }

    #[test]
    fn test_two_identical_announces_keep_one_record() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_announce_idempotent.bin");
        catalog.register(meta.clone());
        let request = create_request(&meta, "peer-1", 500, Some(PeerEvent::Started));

        announce_ok(&catalog, request.clone());
        announce_ok(&catalog, request);

        assert_eq!(catalog.active_peers(&meta.info_hash).unwrap().len(), 1);
    }

    #[test]
    fn test_seeder_and_leecher_accounting() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_accounting.bin");
        catalog.register(meta.clone());

        announce_ok(&catalog, create_request(&meta, "seeder-1", 0, None));
        let outcome = announce_ok(&catalog, create_request(&meta, "leecher-1", 900, None));

        assert_eq!(outcome.complete, 1);
        assert_eq!(outcome.incomplete, 1);
    }

    #[test]
    fn test_returning_leecher_becomes_seeder() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_returning_peer.bin");
        catalog.register(meta.clone());

        announce_ok(&catalog, create_request(&meta, "peer-1", 900, None));
        let outcome =
            announce_ok(&catalog, create_request(&meta, "peer-1", 0, Some(PeerEvent::Completed)));

        assert_eq!(outcome.complete, 1);
        assert_eq!(outcome.incomplete, 0);
        assert_eq!(catalog.get(&meta.info_hash).unwrap().completed, 1);
    }

    #[test]
    fn test_completed_increments_exactly_once_per_event() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_completed_counter.bin");
        catalog.register(meta.clone());

        announce_ok(&catalog, create_request(&meta, "peer-1", 0, Some(PeerEvent::Completed)));
        announce_ok(&catalog, create_request(&meta, "peer-1", 0, None));

        assert_eq!(catalog.get(&meta.info_hash).unwrap().completed, 1);
    }

    #[test]
    fn test_stopped_removes_the_peer() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_stopped_removes.bin");
        catalog.register(meta.clone());

        announce_ok(&catalog, create_request(&meta, "peer-1", 0, Some(PeerEvent::Started)));
        let outcome =
            announce_ok(&catalog, create_request(&meta, "peer-1", 0, Some(PeerEvent::Stopped)));

        assert!(outcome.peers.is_empty());
        assert_eq!(outcome.complete, 0);
        assert!(catalog.active_peers(&meta.info_hash).unwrap().is_empty());
    }

    #[test]
    fn test_announce_does_not_return_the_requester() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_no_self_in_peers.bin");
        catalog.register(meta.clone());

        announce_ok(&catalog, create_request(&meta, "peer-1", 0, None));
        let outcome = announce_ok(&catalog, create_request(&meta, "peer-2", 900, None));

        assert_eq!(outcome.peers.len(), 1);
        assert_eq!(outcome.peers[0].peer_id, "peer-1");
        assert_eq!(outcome.interval, ANNOUNCE_INTERVAL_SECONDS);
    }

    #[test]
    fn test_peer_list_is_capped() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_peer_list_cap.bin");
        catalog.register(meta.clone());

        for peer in 0..60 {
            announce_ok(&catalog, create_request(&meta, &format!("peer-{}", peer), 0, None));
        }
        let outcome = announce_ok(&catalog, create_request(&meta, "asker", 900, None));

        assert_eq!(outcome.peers.len(), MAX_PEERS_RETURNED);
    }

    #[test]
    fn test_explicit_ip_wins_over_source_ip() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_explicit_ip.bin");
        catalog.register(meta.clone());

        let mut request = create_request(&meta, "peer-1", 0, None);
        request.ip = Some("10.1.2.3".to_string());
        catalog.announce(&request, "192.168.0.9").unwrap();

        let peers = catalog.active_peers(&meta.info_hash).unwrap();
        assert_eq!(peers[0].ip, "10.1.2.3");
    }

    #[test]
    fn test_stale_peer_is_excluded_everywhere() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_stale_peer.bin");
        catalog.register(meta.clone());

        let old = Local::now() - Duration::hours(PEER_ACTIVE_HOURS) - Duration::minutes(1);
        catalog
            .announce_at(&create_request(&meta, "stale-seeder", 0, None), "10.0.0.1", old)
            .unwrap();

        let outcome = announce_ok(&catalog, create_request(&meta, "fresh", 900, None));

        assert!(outcome.peers.is_empty());
        assert_eq!(outcome.complete, 0);
        assert_eq!(outcome.incomplete, 1);
        assert_eq!(catalog.active_peers(&meta.info_hash).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_stale_peers_deletes_them() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_remove_stale.bin");
        catalog.register(meta.clone());

        let old = Local::now() - Duration::hours(PEER_ACTIVE_HOURS * 2);
        catalog
            .announce_at(&create_request(&meta, "stale", 0, None), "10.0.0.1", old)
            .unwrap();
        catalog.remove_stale_peers();

        assert_eq!(catalog.snapshot()[&meta.info_hash].peers.len(), 0);
    }

    #[test]
    fn test_cleanup_loopback() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_cleanup_loopback.bin");
        catalog.register(meta.clone());

        announce_ok(&catalog, create_request(&meta, "local", 0, None));
        let mut remote = create_request(&meta, "remote", 0, None);
        remote.ip = Some("10.0.0.8".to_string());
        catalog.announce(&remote, "127.0.0.1").unwrap();

        let removed = catalog.cleanup_loopback();

        assert_eq!(removed, 1);
        let peers = catalog.active_peers(&meta.info_hash).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].peer_id, "remote");
        assert_eq!(catalog.cleanup_loopback(), 0);
    }

    #[test]
    fn test_deduplicate_keeps_the_latest_record() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_deduplicate.bin");
        catalog.register(meta.clone());

        let earlier = Local::now() - Duration::minutes(30);
        catalog
            .announce_at(&create_request(&meta, "old-id", 0, None), "10.0.0.1", earlier)
            .unwrap();
        announce_ok(&catalog, create_request(&meta, "new-id", 0, None));

        let removed = catalog.deduplicate();

        assert_eq!(removed, 1);
        let peers = catalog.active_peers(&meta.info_hash).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].peer_id, "new-id");
        assert_eq!(catalog.deduplicate(), 0);
    }

    #[test]
    fn test_global_stats() {
        let catalog = AtomicCatalog::default();
        let meta_a = create_test_meta("test_global_stats_a.bin");
        let meta_b = create_test_meta_sized("test_global_stats_b.bin", 900);
        catalog.register(meta_a.clone());
        catalog.register(meta_b.clone());

        announce_ok(&catalog, create_request(&meta_a, "seeder", 0, None));
        announce_ok(&catalog, create_request(&meta_b, "leecher", 500, None));
        announce_ok(
            &catalog,
            create_request(&meta_b, "finisher", 0, Some(PeerEvent::Completed)),
        );

        let stats = catalog.global_stats();

        assert_eq!(stats.torrents, 2);
        assert_eq!(stats.seeders, 2);
        assert_eq!(stats.leechers, 1);
        assert_eq!(stats.active_peers, 3);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let catalog = AtomicCatalog::default();
        let meta = create_test_meta("test_snapshot_round_trip.bin");
        catalog.register(meta.clone());
        announce_ok(&catalog, create_request(&meta, "peer-1", 0, None));

        let snapshot = catalog.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: CatalogSnapshot = serde_json::from_str(&json).unwrap();

        let restored = AtomicCatalog::default();
        restored.restore(decoded);

        assert_eq!(restored.list().len(), 1);
        assert_eq!(restored.active_peers(&meta.info_hash).unwrap().len(), 1);
    }

    // Auxiliary functions

    fn create_test_meta(file_name: &str) -> Metainfo {
        create_test_meta_sized(file_name, 600)
    }

    fn create_test_meta_sized(file_name: &str, size: usize) -> Metainfo {
        let path = format!("./{}", file_name);
        let contents: Vec<u8> = (0..size).map(|i| (i % 243) as u8).collect();
        std::fs::write(&path, contents).unwrap();
        let meta =
            Metainfo::build(Path::new(&path), "http://localhost:8000/announce", 256).unwrap();
        std::fs::remove_file(&path).unwrap();
        meta
    }

    fn create_request(
        meta: &Metainfo,
        peer_id: &str,
        left: u64,
        event: Option<PeerEvent>,
    ) -> AnnounceRequest {
        AnnounceRequest {
            info_hash: meta.info_hash.clone(),
            peer_id: peer_id.to_string(),
            ip: None,
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left,
            event,
        }
    }

    fn announce_ok(catalog: &AtomicCatalog, request: AnnounceRequest) -> AnnounceOutcome {
        catalog.announce(&request, "10.0.0.1").unwrap()
    }
}
