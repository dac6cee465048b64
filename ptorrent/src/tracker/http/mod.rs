pub mod http_client;
pub mod query_params;
pub mod url_parser;
