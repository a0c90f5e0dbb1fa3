use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use std::net::IpAddr;

use crate::error::{Result, ScanError};

/// Resolves a DNS name to its addresses.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Returns every A and AAAA address for `name`. An empty answer is an
    /// error.
    async fn lookup(&self, name: &str) -> Result<Vec<IpAddr>>;
}

/// [`NameResolver`] backed by the system resolver configuration.
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    pub fn new() -> Result<Self> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| ScanError::Resolver(e.to_string()))?
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl NameResolver for DnsResolver {
    async fn lookup(&self, name: &str) -> Result<Vec<IpAddr>> {
        let response = self
            .resolver
            .lookup_ip(name)
            .await
            .map_err(|e| ScanError::Lookup {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let addresses: Vec<IpAddr> = response.iter().collect();
        if addresses.is_empty() {
            return Err(ScanError::Lookup {
                name: name.to_string(),
                reason: "no addresses".to_string(),
            });
        }
        Ok(addresses)
    }
}
