pub mod errors;
pub mod list_query;
pub mod order;
pub mod ports;
pub mod pricing;
