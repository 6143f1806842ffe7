pub mod embeddings;
pub mod formatter;
pub mod ingestion;
pub mod maintenance;
pub mod matcher;
pub mod retrieval;
pub mod similarity;
pub mod store;
