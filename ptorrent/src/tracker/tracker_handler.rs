use std::time::Duration;

use metafile::metainfo::{Metainfo, MetainfoError};

use super::http::http_client::{HttpClient, HttpClientError};
use super::http::query_params::{AnnounceEvent, AnnounceQuery};
use super::http::url_parser::{TrackerUrl, TrackerUrlError};
use super::tracker_response::{FromTrackerResponseError, TrackerResponse};

const CONNECT_SECONDS_TIMEOUT: u64 = 10;

/// `TrackerHandler` struct for communicating with the tracker of a torrent.
///
/// To get the tracker's peer list use `announce()`; to publish a freshly
/// built descriptor use `register_torrent()`.
#[derive(Debug)]
pub struct TrackerHandler {
    pub meta: Metainfo,
    pub tracker_url: TrackerUrl,
    pub client_port: u16,
    client_peer_id: String,
}

/// Posible `TrackerHandler` errors.
#[derive(Debug)]
pub enum TrackerHandlerError {
    UrlParseError(TrackerUrlError),
    HttpClientError(HttpClientError),
    FromTrackerResponseError(FromTrackerResponseError),
    MetainfoError(MetainfoError),
}

impl TrackerHandler {
    /// Builds a new `TrackerHandler` from a torrent descriptor and the port
    /// we are reachable on.
    ///
    /// It returns a `TrackerHandlerError` if the descriptor's announce url
    /// could not be parsed.
    pub fn new(
        meta: Metainfo,
        client_port: u16,
        client_peer_id: String,
    ) -> Result<Self, TrackerHandlerError> {
        let tracker_url =
            TrackerUrl::parse(&meta.announce).map_err(TrackerHandlerError::UrlParseError)?;

        Ok(Self {
            meta,
            tracker_url,
            client_port,
            client_peer_id,
        })
    }

    /// Announces our state to the tracker and returns its peer list.
    ///
    /// It returns a `TrackerHandlerError` if:
    /// - There was a problem reaching the tracker.
    /// - The tracker rejected the announce.
    /// - The response could not be decoded.
    pub fn announce(
        &self,
        event: Option<AnnounceEvent>,
        uploaded: u64,
        downloaded: u64,
        left: u64,
    ) -> Result<TrackerResponse, TrackerHandlerError> {
        let query = AnnounceQuery::new(
            self.meta.info_hash.clone(),
            self.client_peer_id.clone(),
            self.client_port,
            uploaded,
            downloaded,
            left,
            event,
        );

        let path_and_query = format!("/{}{}", self.tracker_url.endpoint, query.build());
        let body = self
            .client()
            .get(&path_and_query)
            .map_err(TrackerHandlerError::HttpClientError)?;

        TrackerResponse::from_json(&body).map_err(TrackerHandlerError::FromTrackerResponseError)
    }

    /// Registers the torrent descriptor with the tracker.
    pub fn register_torrent(&self) -> Result<(), TrackerHandlerError> {
        let body = self
            .meta
            .to_json()
            .map_err(TrackerHandlerError::MetainfoError)?;

        self.client()
            .post_json("/torrents", &body)
            .map_err(TrackerHandlerError::HttpClientError)?;
        Ok(())
    }

    fn client(&self) -> HttpClient {
        HttpClient::new(
            self.tracker_url.clone(),
            Duration::from_secs(CONNECT_SECONDS_TIMEOUT),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_announce_url_is_parsed_on_creation() {
        let meta = create_test_meta("test_tracker_handler_url.bin");

        let handler =
            TrackerHandler::new(meta, 6881, "-PT0001-testtesttest".to_string()).unwrap();

        assert_eq!(handler.tracker_url.host, "localhost");
        assert_eq!(handler.tracker_url.port, 8000);
        assert_eq!(handler.tracker_url.endpoint, "announce");
    }

    #[test]
    fn test_bad_announce_url_is_rejected() {
        let mut meta = create_test_meta("test_tracker_handler_bad_url.bin");
        meta.announce = "udp://tracker.example.org/announce".to_string();

        assert!(matches!(
            TrackerHandler::new(meta, 6881, "-PT0001-testtesttest".to_string()),
            Err(TrackerHandlerError::UrlParseError(_))
        ));
    }

    // Auxiliary functions

    fn create_test_meta(file_name: &str) -> Metainfo {
        let path = format!("./{}", file_name);
        std::fs::write(&path, vec![1u8; 600]).unwrap();
        let meta =
            Metainfo::build(Path::new(&path), "http://localhost:8000/announce", 256).unwrap();
        std::fs::remove_file(&path).unwrap();
        meta
    }
}
