pub mod announce;
pub mod http;
pub mod http_server;
pub mod registry;
pub mod service;
pub mod stats;
