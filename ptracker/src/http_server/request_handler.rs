use std::io::Write;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use metafile::metainfo::Metainfo;

use crate::announce::announce_request::AnnounceRequest;
use crate::announce::announce_response::AnnounceResponse;
use crate::http::http_method::HttpMethod;
use crate::http::http_parser::{Http, HttpError};
use crate::http::http_status::HttpStatus;
use crate::registry::catalog::{AtomicCatalog, CatalogError};
use crate::registry::storage;

/// Struct that represents a connection capable of reading one request and
/// sending back an answer.
pub struct RequestHandler {
    pub stream: TcpStream,
}

/// Posible `RequestHandler` errors.
#[derive(Debug)]
pub enum RequestHandlerError {
    ParseHttpError(HttpError),
    GettingPeerIpError,
    WritingResponseError(std::io::Error),
    EncodingResponseError(serde_json::Error),
}

#[derive(Debug, Serialize)]
struct FailureResponse {
    failure_reason: String,
}

#[derive(Debug, Serialize)]
struct RemovedResponse {
    removed: usize,
}

impl RequestHandler {
    /// Returns a new RequestHandler.
    ///
    /// ## Arguments
    /// * `stream`: a TcpStream responsible of reading one HTTP request and sending a response.
    pub fn new(stream: TcpStream) -> RequestHandler {
        RequestHandler { stream }
    }

    /// Reads the request, routes it against the HTTP surface and sends the
    /// response.
    ///
    /// ## Arguments
    /// * `catalog`: The tracker state the endpoints operate on.
    /// * `snapshot_path`: Where to persist the catalog after registrations.
    pub fn handle(
        &mut self,
        catalog: Arc<AtomicCatalog>,
        snapshot_path: Option<Arc<PathBuf>>,
    ) -> Result<(), RequestHandlerError> {
        let http = match Http::read_from(&mut self.stream) {
            Ok(http) => http,
            Err(err) => {
                self.send_failure(HttpStatus::BadRequest, "Malformed request")?;
                return Err(RequestHandlerError::ParseHttpError(err));
            }
        };

        let endpoint = http.endpoint.trim_matches('/').to_string();
        let segments: Vec<&str> = endpoint.split('/').collect();

        match (http.method, segments.as_slice()) {
            (_, ["announce"]) => self.handle_announce(&http, &catalog),
            (HttpMethod::Post, ["torrents"]) => {
                self.handle_register(&http, &catalog, snapshot_path)
            }
            (HttpMethod::Get, ["torrents"]) => self.send_json(HttpStatus::Ok, &catalog.list()),
            (HttpMethod::Get, ["torrents", info_hash]) => match catalog.get(info_hash) {
                Some(summary) => self.send_json(HttpStatus::Ok, &summary),
                None => self.send_failure(HttpStatus::NotFound, "Torrent not found"),
            },
            (HttpMethod::Get, ["torrents", info_hash, "download"]) => {
                self.handle_download(info_hash, &catalog)
            }
            (HttpMethod::Get, ["peers", info_hash]) => match catalog.active_peers(info_hash) {
                Ok(peers) => self.send_json(HttpStatus::Ok, &peers),
                Err(CatalogError::UnknownTorrent) => {
                    self.send_failure(HttpStatus::NotFound, "Torrent not found")
                }
            },
            (HttpMethod::Get, ["stats"]) => {
                self.send_json(HttpStatus::Ok, &catalog.global_stats())
            }
            (HttpMethod::Post, ["peers", "cleanup"]) => {
                let removed = catalog.cleanup_loopback();
                self.send_json(HttpStatus::Ok, &RemovedResponse { removed })
            }
            (HttpMethod::Post, ["peers", "deduplicate"]) => {
                let removed = catalog.deduplicate();
                self.send_json(HttpStatus::Ok, &RemovedResponse { removed })
            }
            _ => self.send_failure(HttpStatus::NotFound, "No such endpoint"),
        }
    }

    fn handle_announce(
        &mut self,
        http: &Http,
        catalog: &AtomicCatalog,
    ) -> Result<(), RequestHandlerError> {
        let request = match AnnounceRequest::from_params(&http.params) {
            Ok(request) => request,
            Err(err) => return self.send_failure(HttpStatus::BadRequest, &err.to_string()),
        };

        let source_ip = self.peer_ip()?;
        match catalog.announce(&request, &source_ip) {
            Ok(outcome) => {
                self.send_json(HttpStatus::Ok, &AnnounceResponse::from_outcome(outcome))
            }
            Err(CatalogError::UnknownTorrent) => {
                self.send_failure(HttpStatus::NotFound, "Torrent not found")
            }
        }
    }

    fn handle_register(
        &mut self,
        http: &Http,
        catalog: &AtomicCatalog,
        snapshot_path: Option<Arc<PathBuf>>,
    ) -> Result<(), RequestHandlerError> {
        let meta = match Metainfo::from_json(&http.body) {
            Ok(meta) => meta,
            Err(err) => {
                warn!("Rejecting torrent registration: {:?}", err);
                return self.send_failure(HttpStatus::BadRequest, "Invalid torrent descriptor");
            }
        };

        let summary = catalog.register(meta);

        if let Some(path) = snapshot_path {
            if let Err(err) = storage::save(&catalog.snapshot(), &path) {
                warn!("Could not persist catalog snapshot: {:?}", err);
            }
        }
        self.send_json(HttpStatus::Ok, &summary)
    }

    fn handle_download(
        &mut self,
        info_hash: &str,
        catalog: &AtomicCatalog,
    ) -> Result<(), RequestHandlerError> {
        let meta = match catalog.meta(info_hash) {
            Some(meta) => meta,
            None => return self.send_failure(HttpStatus::NotFound, "Torrent not found"),
        };
        match meta.to_json() {
            Ok(json) => self.send_response(json.into_bytes(), HttpStatus::Ok),
            Err(_) => self.send_failure(HttpStatus::InternalServerError, "Unencodable descriptor"),
        }
    }

    fn send_json(
        &mut self,
        status: HttpStatus,
        body: &impl Serialize,
    ) -> Result<(), RequestHandlerError> {
        let contents =
            serde_json::to_vec(body).map_err(RequestHandlerError::EncodingResponseError)?;
        self.send_response(contents, status)
    }

    fn send_failure(
        &mut self,
        status: HttpStatus,
        reason: &str,
    ) -> Result<(), RequestHandlerError> {
        self.send_json(
            status,
            &FailureResponse {
                failure_reason: reason.to_string(),
            },
        )
    }

    fn create_response(mut contents: Vec<u8>, status_line: HttpStatus) -> Vec<u8> {
        let response = format!(
            "HTTP/1.1 {}\r\nAccess-Control-Allow-Origin: *\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            status_line,
            contents.len(),
        );
        let mut response = response.into_bytes();
        response.append(&mut contents);
        response
    }

    fn send_response(
        &mut self,
        contents: Vec<u8>,
        status_line: HttpStatus,
    ) -> Result<(), RequestHandlerError> {
        let response = Self::create_response(contents, status_line);

        self.stream
            .write_all(&response)
            .and_then(|_| self.stream.flush())
            .map_err(RequestHandlerError::WritingResponseError)
    }

    fn peer_ip(&self) -> Result<String, RequestHandlerError> {
        Ok(self
            .stream
            .peer_addr()
            .map_err(|_| RequestHandlerError::GettingPeerIpError)?
            .ip()
            .to_string())
    }
}
