pub mod request_handler;
pub mod server;
pub mod worker_pool;
