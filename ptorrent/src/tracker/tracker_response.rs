use serde::Deserialize;

use crate::peer::remote_peer::RemotePeer;

/// `TrackerResponse` struct containing a decoded announce response.
#[derive(Debug, Deserialize)]
pub struct TrackerResponse {
    pub interval: u32,
    #[serde(default)]
    pub complete: u32,
    #[serde(default)]
    pub incomplete: u32,
    pub peers: Vec<RemotePeer>,
}

/// Posible `TrackerResponse` errors.
#[derive(Debug)]
pub enum FromTrackerResponseError {
    DecodeResponseError(serde_json::Error),
}

impl TrackerResponse {
    /// Builds a new `TrackerResponse` from the announce response body.
    pub fn from_json(response: &[u8]) -> Result<TrackerResponse, FromTrackerResponseError> {
        serde_json::from_slice(response).map_err(FromTrackerResponseError::DecodeResponseError)
    }
}
