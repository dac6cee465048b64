use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;

use super::http_method::HttpMethod;

/// Upper bound for the request head (request line plus headers).
const MAX_HEAD_BYTES: usize = 8 * 1024;
/// Upper bound for a request body; descriptors of very large files stay
/// well below this.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// A struct that represents a parsed HTTP request.
///
/// # Fields
/// * `method`: The HTTP method of the request.
/// * `endpoint`: The path of the request, query string removed.
/// * `params`: The query parameters of the request.
/// * `body`: The request body (empty for bodyless requests).
#[derive(Debug)]
pub struct Http {
    pub method: HttpMethod,
    pub endpoint: String,
    pub params: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub enum HttpError {
    ParseError,
    HttpMethodNotSupported,
    ReadError(std::io::Error),
    UnexpectedEof,
    HeadTooLarge,
    BodyTooLarge,
}

impl Http {
    /// Reads one full request (head plus `Content-Length` body) from the
    /// stream and parses it.
    pub fn read_from(stream: &mut impl Read) -> Result<Http, HttpError> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];

        let head_end = loop {
            if let Some(position) = find_head_end(&buffer) {
                break position;
            }
            if buffer.len() > MAX_HEAD_BYTES {
                return Err(HttpError::HeadTooLarge);
            }
            let read = stream.read(&mut chunk).map_err(HttpError::ReadError)?;
            if read == 0 {
                return Err(HttpError::UnexpectedEof);
            }
            buffer.extend_from_slice(&chunk[..read]);
        };

        let content_length = content_length(&buffer[..head_end])?;
        if content_length > MAX_BODY_BYTES {
            return Err(HttpError::BodyTooLarge);
        }

        let body_start = head_end + 4;
        while buffer.len() < body_start + content_length {
            let read = stream.read(&mut chunk).map_err(HttpError::ReadError)?;
            if read == 0 {
                return Err(HttpError::UnexpectedEof);
            }
            buffer.extend_from_slice(&chunk[..read]);
        }

        let mut http = Self::parse_head(&buffer[..head_end])?;
        http.body = buffer[body_start..body_start + content_length].to_vec();
        Ok(http)
    }

    /// Parses the request line and query string. The body is left empty.
    pub fn parse_head(head: &[u8]) -> Result<Http, HttpError> {
        let request_line = head
            .split(|&b| b == b'\r')
            .next()
            .ok_or(HttpError::ParseError)?;
        let mut line_split = request_line.split(|&b| b == b' ');

        let method_bytes = line_split.next().ok_or(HttpError::ParseError)?;
        let method = HttpMethod::from_str(&String::from_utf8_lossy(method_bytes))
            .map_err(|_| HttpError::HttpMethodNotSupported)?;

        let target = line_split.next().ok_or(HttpError::ParseError)?;
        let mut target_split = target.split(|&b| b == b'?');
        let endpoint =
            String::from_utf8_lossy(target_split.next().ok_or(HttpError::ParseError)?).to_string();
        let params = match target_split.next() {
            Some(query) => parse_params(query)?,
            None => HashMap::new(),
        };

        Ok(Http {
            method,
            endpoint,
            params,
            body: Vec::new(),
        })
    }
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn content_length(head: &[u8]) -> Result<usize, HttpError> {
    for line in head.split(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(line);
        let mut parts = line.splitn(2, ':');
        let name = parts.next().unwrap_or("").trim();
        if name.eq_ignore_ascii_case("content-length") {
            return parts
                .next()
                .and_then(|value| value.trim().parse().ok())
                .ok_or(HttpError::ParseError);
        }
    }
    Ok(0)
}

fn parse_params(query: &[u8]) -> Result<HashMap<String, String>, HttpError> {
    let mut params = HashMap::new();

    for param in query.split(|&b| b == b'&') {
        if param.is_empty() {
            continue;
        }
        let mut param_split = param.split(|&b| b == b'=');
        let key =
            String::from_utf8_lossy(param_split.next().ok_or(HttpError::ParseError)?).to_string();
        let value =
            String::from_utf8_lossy(param_split.next().ok_or(HttpError::ParseError)?).to_string();
        params.insert(key, value);
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_parse_announce_request() {
        let raw = format!(
            "GET /announce?info_hash={}&peer_id=-PT0001-aaaaaaaaaaaa&port=6881&uploaded=0&downloaded=0&left=1000&event=started HTTP/1.1\r\nHost: localhost\r\n\r\n",
            "ab".repeat(20)
        );

        let http = Http::read_from(&mut Cursor::new(raw.into_bytes())).unwrap();

        assert_eq!(http.method, HttpMethod::Get);
        assert_eq!(http.endpoint, "/announce");
        assert_eq!(http.params.get("info_hash").unwrap(), &"ab".repeat(20));
        assert_eq!(http.params.get("event").unwrap(), "started");
        assert_eq!(http.params.len(), 7);
        assert!(http.body.is_empty());
    }

    #[test]
    fn test_parse_request_without_query() {
        let raw = b"GET /torrents HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec();

        let http = Http::read_from(&mut Cursor::new(raw)).unwrap();

        assert_eq!(http.endpoint, "/torrents");
        assert!(http.params.is_empty());
    }

    #[test]
    fn test_parse_post_with_body() {
        let body = r#"{"answer":42}"#;
        let raw = format!(
            "POST /torrents HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );

        let http = Http::read_from(&mut Cursor::new(raw.into_bytes())).unwrap();

        assert_eq!(http.method, HttpMethod::Post);
        assert_eq!(http.endpoint, "/torrents");
        assert_eq!(http.body, body.as_bytes());
    }

    #[test]
    fn test_unsupported_method_is_rejected() {
        let raw = b"DELETE /torrents HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec();

        assert!(matches!(
            Http::read_from(&mut Cursor::new(raw)),
            Err(HttpError::HttpMethodNotSupported)
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let raw = b"hello\r\n\r\n".to_vec();

        assert!(matches!(
            Http::read_from(&mut Cursor::new(raw)),
            Err(HttpError::ParseError) | Err(HttpError::HttpMethodNotSupported)
        ));
    }

    #[test]
    fn test_truncated_body_is_rejected() {
        let raw = b"POST /torrents HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc".to_vec();

        assert!(matches!(
            Http::read_from(&mut Cursor::new(raw)),
            Err(HttpError::UnexpectedEof)
        ));
    }
}
