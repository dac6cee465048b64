use std::fmt::Write;

/// Announce events a peer can report to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    Started,
    Stopped,
    Completed,
}

impl AnnounceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnounceEvent::Started => "started",
            AnnounceEvent::Stopped => "stopped",
            AnnounceEvent::Completed => "completed",
        }
    }
}

/// `AnnounceQuery` struct containing the announce query parameters.
///
/// To build the query string use the method `build()`. All values are hex
/// digests, decimal numbers or the peer id charset, so no percent-encoding
/// is needed.
#[derive(Debug)]
pub struct AnnounceQuery {
    pub info_hash: String,
    pub peer_id: String,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: Option<AnnounceEvent>,
}

impl AnnounceQuery {
    pub fn new(
        info_hash: String,
        peer_id: String,
        port: u16,
        uploaded: u64,
        downloaded: u64,
        left: u64,
        event: Option<AnnounceEvent>,
    ) -> AnnounceQuery {
        AnnounceQuery {
            info_hash,
            peer_id,
            port,
            uploaded,
            downloaded,
            left,
            event,
        }
    }

    /// Builds the query string, leading `?` included.
    pub fn build(&self) -> String {
        let mut query = format!(
            "?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}",
            self.info_hash, self.peer_id, self.port, self.uploaded, self.downloaded, self.left
        );
        if let Some(event) = self.event {
            // Infallible when writing into a String.
            let _ = write!(query, "&event={}", event.as_str());
        }
        query
    }
}
