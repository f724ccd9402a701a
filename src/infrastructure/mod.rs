pub mod http_client;
pub mod memory_repo;
pub mod models;
pub mod order_repo;
pub mod query_store;
