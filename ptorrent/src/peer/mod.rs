pub mod handshake;
pub mod message_handler;
pub mod peer_message;
pub mod peer_session;
pub mod remote_peer;
pub mod session_status;
