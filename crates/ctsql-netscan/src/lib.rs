//! DNS and geolocation enrichment of names queued by the ingestion pipeline.
//!
//! [`pool::NetScan`] drains a batch of queued names through a bounded
//! channel into a fixed set of workers. Each worker removes a name from the
//! queue, resolves it, and records the addresses and the location of the
//! first one.

pub mod config;
pub mod error;
pub mod geo;
pub mod pool;
pub mod resolver;
pub mod signal;

#[cfg(test)]
mod tests;

pub use error::{Result, ScanError};
pub use pool::{NetScan, ScanStats};
