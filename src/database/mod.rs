// Database module
// Durable vector storage backed by an embedded LanceDB instance

pub mod lancedb;
