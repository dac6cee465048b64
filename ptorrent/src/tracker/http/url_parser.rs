/// `TrackerUrl` struct containing a tracker url information.
///
/// To create a new `TrackerUrl` use the method builder `parse()`. Only plain
/// `http://` urls are supported; the tracker does not speak TLS.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TrackerUrl {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
}

/// Posible `TrackerUrl` Errors.
#[derive(Debug, PartialEq, Eq)]
pub enum TrackerUrlError {
    InvalidTrackerUrl,
    UnsupportedConnectionProtocol,
    InvalidPortNumber,
}

impl TrackerUrl {
    /// Builds a new `TrackerUrl` from a &str tracker url.
    ///
    /// It returns an `TrackerUrlError` if:
    /// - the url format is invalid.
    /// - the url connection protocol is not http.
    /// - the url port number is not a number.
    pub fn parse(url: &str) -> Result<Self, TrackerUrlError> {
        let url_without_protocol = Self::remove_protocol(url)?;

        let (url_without_endpoint, endpoint) =
            Self::identify_and_remove_endpoint(&url_without_protocol)?;

        let host = Self::identify_host(&url_without_endpoint)?;

        let port = if url_without_endpoint.contains(':') {
            Self::identify_port(&url_without_endpoint)?
        } else {
            80
        };

        Ok(Self {
            host,
            port,
            endpoint,
        })
    }

    fn remove_protocol(url: &str) -> Result<String, TrackerUrlError> {
        let mut splitted_url = url.split("://");

        match splitted_url.next() {
            Some("http") => (),
            Some(_) => return Err(TrackerUrlError::UnsupportedConnectionProtocol),
            None => return Err(TrackerUrlError::InvalidTrackerUrl),
        };

        match splitted_url.next() {
            Some(url_without_protocol) => Ok(url_without_protocol.to_string()),
            None => Err(TrackerUrlError::InvalidTrackerUrl),
        }
    }

    fn identify_and_remove_endpoint(url: &str) -> Result<(String, String), TrackerUrlError> {
        let mut splitted_url = url.split('/');

        let url_without_endpoint = match splitted_url.next() {
            Some(url_without_endpoint) => url_without_endpoint,
            None => return Err(TrackerUrlError::InvalidTrackerUrl),
        };

        match splitted_url.next() {
            Some(endpoint) => Ok((url_without_endpoint.to_string(), endpoint.to_string())),
            None => Err(TrackerUrlError::InvalidTrackerUrl),
        }
    }

    fn identify_host(url: &str) -> Result<String, TrackerUrlError> {
        match url.split(':').next() {
            Some("") | None => Err(TrackerUrlError::InvalidTrackerUrl),
            Some(host) => Ok(host.to_string()),
        }
    }

    fn identify_port(url: &str) -> Result<u16, TrackerUrlError> {
        match url.split(':').last() {
            Some(port) => port.parse().map_err(|_| TrackerUrlError::InvalidPortNumber),
            None => Err(TrackerUrlError::InvalidTrackerUrl),
        }
    }
}
