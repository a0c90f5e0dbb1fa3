//! Domain types shared by the ingestion pipeline and the netscan worker pool.

pub mod retry;
pub mod suffix;
pub mod types;
