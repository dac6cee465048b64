pub const TCP_PORT: &str = "TCP_PORT";
pub const DOWNLOAD_DIRECTORY: &str = "DOWNLOAD_DIRECTORY";
pub const CONNECT_SECONDS_TIMEOUT: &str = "CONNECT_SECONDS_TIMEOUT";
pub const READ_WRITE_SECONDS_TIMEOUT: &str = "READ_WRITE_SECONDS_TIMEOUT";
pub const INACTIVITY_SECONDS_TIMEOUT: &str = "INACTIVITY_SECONDS_TIMEOUT";
pub const MAX_PEERS_PER_DOWNLOAD: &str = "MAX_PEERS_PER_DOWNLOAD";
pub const MAX_FRAME_KB_SIZE: &str = "MAX_FRAME_KB_SIZE";

pub const MIN_SETTINGS: u32 = 7;
