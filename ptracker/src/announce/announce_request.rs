use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use super::announce_request_error::AnnounceRequestError;
use super::event::PeerEvent;

/// Struct that represents a validated announce request.
///
/// ## Fields
/// * `info_hash`: The info hash of the torrent, 40 lowercase hex chars.
/// * `peer_id`: The self-selected id of the announcing peer.
/// * `ip`: Explicit ip the peer wants registered *(Optional)*.
/// * `port`: The port the peer listens on.
/// * `uploaded`: Bytes uploaded so far.
/// * `downloaded`: Bytes downloaded so far.
/// * `left`: Bytes left to download.
/// * `event`: The announced event *(Optional)*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub info_hash: String,
    pub peer_id: String,
    pub ip: Option<String>,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: Option<PeerEvent>,
}

impl AnnounceRequest {
    /// Builds and validates an `AnnounceRequest` from the query parameters.
    ///
    /// # Errors
    /// - `InvalidInfoHash` unless `info_hash` is exactly 40 hex chars.
    /// - `InvalidPeerId` unless `peer_id` is between 1 and 20 bytes.
    /// - `InvalidPort` / `InvalidUploaded` / `InvalidDownloaded` /
    ///   `InvalidLeft` if a numeric field does not parse.
    /// - `InvalidIp` if an explicit ip is present but not an ip address.
    /// - `InvalidEvent` if an event is present but unknown.
    pub fn from_params(
        params: &HashMap<String, String>,
    ) -> Result<AnnounceRequest, AnnounceRequestError> {
        let info_hash = params
            .get("info_hash")
            .ok_or(AnnounceRequestError::InvalidInfoHash)?;
        if info_hash.len() != 40 || !info_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AnnounceRequestError::InvalidInfoHash);
        }

        let peer_id = params
            .get("peer_id")
            .ok_or(AnnounceRequestError::InvalidPeerId)?;
        if peer_id.is_empty() || peer_id.len() > 20 {
            return Err(AnnounceRequestError::InvalidPeerId);
        }

        let port = Self::parse_number(params, "port", AnnounceRequestError::InvalidPort)?;
        let uploaded =
            Self::parse_number(params, "uploaded", AnnounceRequestError::InvalidUploaded)?;
        let downloaded =
            Self::parse_number(params, "downloaded", AnnounceRequestError::InvalidDownloaded)?;
        let left = Self::parse_number(params, "left", AnnounceRequestError::InvalidLeft)?;

        let ip = match params.get("ip") {
            Some(ip) => {
                if IpAddr::from_str(ip).is_err() {
                    return Err(AnnounceRequestError::InvalidIp);
                }
                Some(ip.clone())
            }
            None => None,
        };

        let event = match params.get("event") {
            Some(event) => Some(
                PeerEvent::from_str(event).map_err(|_| AnnounceRequestError::InvalidEvent)?,
            ),
            None => None,
        };

        Ok(AnnounceRequest {
            info_hash: info_hash.to_lowercase(),
            peer_id: peer_id.clone(),
            ip,
            port,
            uploaded,
            downloaded,
            left,
            event,
        })
    }

    fn parse_number<N: FromStr>(
        params: &HashMap<String, String>,
        name: &str,
        error: AnnounceRequestError,
    ) -> Result<N, AnnounceRequestError> {
        match params.get(name) {
            Some(value) => value.parse().map_err(|_| error),
            None => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        let params = create_valid_params();

        let request = AnnounceRequest::from_params(&params).unwrap();

        assert_eq!(request.info_hash, "ab".repeat(20));
        assert_eq!(request.peer_id, "-PT0001-aaaaaaaaaaaa");
        assert_eq!(request.port, 6881);
        assert_eq!(request.left, 1000);
        assert_eq!(request.event, Some(PeerEvent::Started));
        assert_eq!(request.ip, None);
    }

    #[test]
    fn test_info_hash_is_normalized_to_lowercase() {
        let mut params = create_valid_params();
        params.insert("info_hash".to_string(), "AB".repeat(20));

        let request = AnnounceRequest::from_params(&params).unwrap();

        assert_eq!(request.info_hash, "ab".repeat(20));
    }

    #[test]
    fn test_short_info_hash_is_rejected() {
        let mut params = create_valid_params();
        params.insert("info_hash".to_string(), "abcd".to_string());

        assert_eq!(
            AnnounceRequest::from_params(&params).unwrap_err(),
            AnnounceRequestError::InvalidInfoHash
        );
    }

    #[test]
    fn test_non_hex_info_hash_is_rejected() {
        let mut params = create_valid_params();
        params.insert("info_hash".to_string(), "zz".repeat(20));

        assert_eq!(
            AnnounceRequest::from_params(&params).unwrap_err(),
            AnnounceRequestError::InvalidInfoHash
        );
    }

    #[test]
    fn test_long_peer_id_is_rejected() {
        let mut params = create_valid_params();
        params.insert("peer_id".to_string(), "x".repeat(21));

        assert_eq!(
            AnnounceRequest::from_params(&params).unwrap_err(),
            AnnounceRequestError::InvalidPeerId
        );
    }

    #[test]
    fn test_missing_port_is_rejected() {
        let mut params = create_valid_params();
        params.remove("port");

        assert_eq!(
            AnnounceRequest::from_params(&params).unwrap_err(),
            AnnounceRequestError::InvalidPort
        );
    }

    #[test]
    fn test_bad_event_is_rejected() {
        let mut params = create_valid_params();
        params.insert("event".to_string(), "paused".to_string());

        assert_eq!(
            AnnounceRequest::from_params(&params).unwrap_err(),
            AnnounceRequestError::InvalidEvent
        );
    }

    #[test]
    fn test_explicit_ip_must_be_an_address() {
        let mut params = create_valid_params();
        params.insert("ip".to_string(), "not-an-ip".to_string());

        assert_eq!(
            AnnounceRequest::from_params(&params).unwrap_err(),
            AnnounceRequestError::InvalidIp
        );

        params.insert("ip".to_string(), "10.0.0.7".to_string());
        let request = AnnounceRequest::from_params(&params).unwrap();
        assert_eq!(request.ip, Some("10.0.0.7".to_string()));
    }

    // Auxiliary functions

    fn create_valid_params() -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("info_hash".to_string(), "ab".repeat(20));
        params.insert("peer_id".to_string(), "-PT0001-aaaaaaaaaaaa".to_string());
        params.insert("port".to_string(), "6881".to_string());
        params.insert("uploaded".to_string(), "0".to_string());
        params.insert("downloaded".to_string(), "0".to_string());
        params.insert("left".to_string(), "1000".to_string());
        params.insert("event".to_string(), "started".to_string());
        params
    }
}
