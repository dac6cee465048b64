/// Possible errors that can occur when creating an AnnounceRequest.
#[derive(Debug, PartialEq, Eq)]
pub enum AnnounceRequestError {
    InvalidInfoHash,
    InvalidPeerId,
    InvalidPort,
    InvalidUploaded,
    InvalidDownloaded,
    InvalidLeft,
    InvalidIp,
    InvalidEvent,
}

impl std::fmt::Display for AnnounceRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            AnnounceRequestError::InvalidInfoHash => "Invalid info_hash",
            AnnounceRequestError::InvalidPeerId => "Invalid peer_id",
            AnnounceRequestError::InvalidPort => "Invalid port",
            AnnounceRequestError::InvalidUploaded => "Invalid uploaded",
            AnnounceRequestError::InvalidDownloaded => "Invalid downloaded",
            AnnounceRequestError::InvalidLeft => "Invalid left",
            AnnounceRequestError::InvalidIp => "Invalid ip",
            AnnounceRequestError::InvalidEvent => "Invalid event",
        };
        write!(f, "{}", reason)
    }
}
