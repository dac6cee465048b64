use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::url_parser::TrackerUrl;

/// Posible `HttpClient` errors.
#[derive(Debug)]
pub enum HttpClientError {
    AddressResolutionError,
    TcpStreamConnectError(std::io::Error),
    ErrorWritingStream(std::io::Error),
    ErrorReadingStream(std::io::Error),
    MalformedResponse,
    UnexpectedStatus(u16),
}

/// `HttpClient` struct to make plain **HTTP/1.1** requests to the tracker.
///
/// Requests are one-shot: every call opens a connection, sends
/// `Connection: close` and reads until the tracker hangs up.
#[derive(Debug)]
pub struct HttpClient {
    tracker_url: TrackerUrl,
    connect_timeout: Duration,
}

impl HttpClient {
    pub fn new(tracker_url: TrackerUrl, connect_timeout: Duration) -> Self {
        Self {
            tracker_url,
            connect_timeout,
        }
    }

    /// Makes a GET request for `path_and_query` (absolute, starting with `/`)
    /// and returns the response body.
    pub fn get(&self, path_and_query: &str) -> Result<Vec<u8>, HttpClientError> {
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path_and_query, self.tracker_url.host
        );
        self.request(request.into_bytes())
    }

    /// Makes a POST request with a JSON body and returns the response body.
    pub fn post_json(&self, path: &str, body: &str) -> Result<Vec<u8>, HttpClientError> {
        let request = format!(
            "POST {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            path,
            self.tracker_url.host,
            body.len(),
            body
        );
        self.request(request.into_bytes())
    }

    fn request(&self, request: Vec<u8>) -> Result<Vec<u8>, HttpClientError> {
        let mut stream = self.connect()?;

        stream
            .write_all(&request)
            .map_err(HttpClientError::ErrorWritingStream)?;

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .map_err(HttpClientError::ErrorReadingStream)?;

        Self::split_response(&response)
    }

    fn connect(&self) -> Result<TcpStream, HttpClientError> {
        let addr = format!("{}:{}", self.tracker_url.host, self.tracker_url.port)
            .to_socket_addrs()
            .map_err(|_| HttpClientError::AddressResolutionError)?
            .next()
            .ok_or(HttpClientError::AddressResolutionError)?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(HttpClientError::TcpStreamConnectError)?;
        stream
            .set_read_timeout(Some(self.connect_timeout))
            .map_err(HttpClientError::TcpStreamConnectError)?;
        Ok(stream)
    }

    /// Splits a raw HTTP response into status + body, failing on non-200.
    fn split_response(response: &[u8]) -> Result<Vec<u8>, HttpClientError> {
        let separator = response
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .ok_or(HttpClientError::MalformedResponse)?;

        let head = &response[..separator];
        let status_line = head
            .split(|&b| b == b'\r')
            .next()
            .ok_or(HttpClientError::MalformedResponse)?;
        let status = std::str::from_utf8(status_line)
            .ok()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or(HttpClientError::MalformedResponse)?;

        if status != 200 {
            return Err(HttpClientError::UnexpectedStatus(status));
        }

        Ok(response[separator + 4..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ok_response() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi";

        assert_eq!(HttpClient::split_response(response).unwrap(), b"hi");
    }

    #[test]
    fn test_split_error_status() {
        let response = b"HTTP/1.1 404 NOT FOUND\r\nContent-Length: 0\r\n\r\n";

        assert!(matches!(
            HttpClient::split_response(response),
            Err(HttpClientError::UnexpectedStatus(404))
        ));
    }

    #[test]
    fn test_split_garbage() {
        assert!(matches!(
            HttpClient::split_response(b"not-http"),
            Err(HttpClientError::MalformedResponse)
        ));
    }
}
