use super::peer_message::Bitfield;

/// Represents our status in a peer session, downloader side.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    /// We are choked by the peer
    pub choked: bool,
    /// We told the peer we are interested
    pub interested: bool,
    /// The pieces the peer advertised so far
    pub bitfield: Bitfield,
    /// Bytes of verified piece data received on this connection
    pub downloaded_bytes: u64,
}

impl SessionStatus {
    pub fn new(bitfield: Bitfield) -> Self {
        Self {
            choked: true,
            interested: false,
            bitfield,
            downloaded_bytes: 0,
        }
    }
}
