//! SeaORM entities, one per table created by the `migration` crate.
//!
//! Link and queue tables have no surrogate key; their entities declare the
//! natural key columns as the primary key.

pub mod censys_entry;
pub mod cert_fqdn;
pub mod cert_registered_domain;
pub mod certificate;
pub mod ct_log;
pub mod ct_log_entry;
pub mod firefox_pageload_is_tls;
pub mod fqdn;
pub mod issuer;
pub mod netscan_queue;
pub mod registered_domain;
pub mod resolved_name;
pub mod resolved_place;
pub mod unexpired_certificate;
