/// Identifier sent at the start of every connection.
pub const PSTR: &str = "PTorrent protocol";

/// Total handshake size: 1 + |PSTR| + 8 reserved + 20 info hash + 20 peer id.
pub const HANDSHAKE_LENGTH: usize = 49 + PSTR.len();

#[derive(Debug, PartialEq, Eq)]
pub enum FromHandshakeError {
    InvalidLength(usize),
    UnknownProtocol,
}

/// Represents a handshake message.
/// Is the first message sent to start a connection with a peer, in both
/// directions, before any framed message.
#[derive(Debug)]
pub struct Handshake {
    pub pstrlen: u8,
    pub pstr: String,
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Creates a new `Handshake` message.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            pstrlen: PSTR.len() as u8,
            pstr: PSTR.to_string(),
            reserved: [0; 8],
            info_hash,
            peer_id,
        }
    }

    /// Converts a `Handshake` message to a byte array.
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.pstrlen];
        bytes.extend(self.pstr.as_bytes());
        bytes.extend(&self.reserved);
        bytes.extend(&self.info_hash);
        bytes.extend(&self.peer_id);
        bytes
    }

    /// Parses a byte array into a `Handshake` message.
    ///
    /// # Errors
    /// - `InvalidLength` if the buffer is not exactly one handshake long.
    /// - `UnknownProtocol` if the advertised protocol name is not ours.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FromHandshakeError> {
        if bytes.len() != HANDSHAKE_LENGTH {
            return Err(FromHandshakeError::InvalidLength(bytes.len()));
        }

        let pstrlen = bytes[0];
        if pstrlen as usize != PSTR.len() {
            return Err(FromHandshakeError::UnknownProtocol);
        }

        let pstr_end = 1 + pstrlen as usize;
        if &bytes[1..pstr_end] != PSTR.as_bytes() {
            return Err(FromHandshakeError::UnknownProtocol);
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&bytes[pstr_end..pstr_end + 8]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&bytes[pstr_end + 8..pstr_end + 28]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&bytes[pstr_end + 28..pstr_end + 48]);

        Ok(Self {
            pstrlen,
            pstr: PSTR.to_string(),
            reserved,
            info_hash,
            peer_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_bytes() {
        let info_hash = [1u8; 20];
        let peer_id = [2u8; 20];
        let handshake = Handshake::new(info_hash, peer_id);

        let bytes = handshake.as_bytes();

        assert_eq!(bytes.len(), HANDSHAKE_LENGTH);
        assert_eq!(bytes[0] as usize, PSTR.len());
        assert_eq!(&bytes[1..1 + PSTR.len()], PSTR.as_bytes());
        assert_eq!(bytes[1 + PSTR.len()..9 + PSTR.len()], [0; 8]);
        assert_eq!(bytes[9 + PSTR.len()..29 + PSTR.len()], info_hash);
        assert_eq!(bytes[29 + PSTR.len()..], peer_id);
    }

    #[test]
    fn test_from_bytes() {
        let info_hash = [3u8; 20];
        let peer_id = [4u8; 20];
        let bytes = Handshake::new(info_hash, peer_id).as_bytes();

        let handshake = Handshake::from_bytes(&bytes).unwrap();

        assert_eq!(handshake.pstrlen as usize, PSTR.len());
        assert_eq!(handshake.pstr, PSTR);
        assert_eq!(handshake.reserved, [0; 8]);
        assert_eq!(handshake.info_hash, info_hash);
        assert_eq!(handshake.peer_id, peer_id);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let bytes = Handshake::new([0; 20], [0; 20]).as_bytes();

        assert_eq!(
            Handshake::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err(),
            FromHandshakeError::InvalidLength(HANDSHAKE_LENGTH - 1)
        );
    }

    #[test]
    fn test_unknown_protocol_is_rejected() {
        let mut bytes = Handshake::new([0; 20], [0; 20]).as_bytes();
        bytes[1] = b'X';

        assert_eq!(
            Handshake::from_bytes(&bytes).unwrap_err(),
            FromHandshakeError::UnknownProtocol
        );
    }
}
