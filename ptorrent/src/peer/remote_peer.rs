use serde::Deserialize;

/// `RemotePeer` struct containing the contact information of another peer,
/// as handed out by the tracker.
///
/// Equality and hashing go by `(ip, port)` so peer collections deduplicate
/// at insert time.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePeer {
    #[serde(default)]
    pub peer_id: Option<String>,
    pub ip: String,
    pub port: u16,
}

impl PartialEq for RemotePeer {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip && self.port == other.port
    }
}

impl Eq for RemotePeer {}

impl std::hash::Hash for RemotePeer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ip.hash(state);
        self.port.hash(state);
    }
}

impl RemotePeer {
    pub fn new(ip: String, port: u16) -> Self {
        Self {
            peer_id: None,
            ip,
            port,
        }
    }

    /// Returns the `ip:port` form used for connecting and as the peer key in
    /// the piece manager.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
