use async_trait::async_trait;
use ctsql_common::types::GeoPlace;
use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;

use crate::error::{Result, ScanError};

/// Maps an address to the place it is registered in.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup_city(&self, address: IpAddr) -> Result<GeoPlace>;
}

/// [`GeoLookup`] over a MaxMind GeoIP2/GeoLite2 City database loaded into
/// memory.
pub struct MaxMindGeo {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeo {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = Reader::open_readfile(path).map_err(|e| ScanError::GeoDatabase {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!(
            path = %path.display(),
            database_type = %reader.metadata.database_type,
            "Opened geo database"
        );
        Ok(Self { reader })
    }
}

#[async_trait]
impl GeoLookup for MaxMindGeo {
    async fn lookup_city(&self, address: IpAddr) -> Result<GeoPlace> {
        let record: geoip2::City = self.reader.lookup(address).map_err(|e| ScanError::Geo {
            address,
            reason: e.to_string(),
        })?;

        let city = record
            .city
            .and_then(|c| c.names)
            .and_then(|names| names.get("en").map(|s| s.to_string()))
            .unwrap_or_default();
        let country = record
            .country
            .and_then(|c| c.iso_code)
            .map(str::to_string)
            .unwrap_or_default();
        let continent = record
            .continent
            .and_then(|c| c.names)
            .and_then(|names| names.get("en").map(|s| s.to_string()))
            .unwrap_or_default();

        Ok(GeoPlace {
            city,
            country,
            continent,
        })
    }
}
