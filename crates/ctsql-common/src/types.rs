use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use x509_parser::prelude::*;

/// Width of the zero-padded hex serial stored in the certificate table.
pub const SERIAL_HEX_WIDTH: usize = 36;

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("Certificate: malformed DER: {0}")]
    Der(String),

    #[error("Certificate: {field} is out of range")]
    TimeOutOfRange { field: &'static str },
}

/// The fields of an X.509 certificate (or precertificate TBS body) that the
/// ingestion pipeline stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Big-endian serial number bytes as encoded in the certificate.
    pub serial: Vec<u8>,
    /// Key identifier from the authority key identifier extension, empty when absent.
    pub authority_key_id: Vec<u8>,
    pub issuer_common_name: String,
    pub subject_common_name: String,
    /// DNS names from the subject alternative name extension.
    pub dns_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// The DER bytes the certificate was parsed from.
    pub raw: Vec<u8>,
}

impl CertificateInfo {
    /// Parses a DER-encoded X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| CertificateError::Der(e.to_string()))?;
        Self::from_tbs(&cert.tbs_certificate, der)
    }

    /// Parses the DER-encoded to-be-signed body of a CT precertificate.
    pub fn from_tbs_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, tbs) =
            TbsCertificate::from_der(der).map_err(|e| CertificateError::Der(e.to_string()))?;
        Self::from_tbs(&tbs, der)
    }

    fn from_tbs(tbs: &TbsCertificate<'_>, raw: &[u8]) -> Result<Self, CertificateError> {
        let authority_key_id = tbs
            .extensions()
            .iter()
            .find_map(|ext| match ext.parsed_extension() {
                ParsedExtension::AuthorityKeyIdentifier(aki) => {
                    aki.key_identifier.as_ref().map(|kid| kid.0.to_vec())
                }
                _ => None,
            })
            .unwrap_or_default();

        let dns_names = tbs
            .subject_alternative_name()
            .ok()
            .flatten()
            .map(|san| {
                san.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some(dns.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let not_before = DateTime::from_timestamp(tbs.validity().not_before.timestamp(), 0)
            .ok_or(CertificateError::TimeOutOfRange { field: "notBefore" })?;
        let not_after = DateTime::from_timestamp(tbs.validity().not_after.timestamp(), 0)
            .ok_or(CertificateError::TimeOutOfRange { field: "notAfter" })?;

        Ok(Self {
            serial: tbs.raw_serial().to_vec(),
            authority_key_id,
            issuer_common_name: first_common_name(tbs.issuer()),
            subject_common_name: first_common_name(tbs.subject()),
            dns_names,
            not_before,
            not_after,
            raw: raw.to_vec(),
        })
    }

    /// Serial as lowercase hex, left-padded with zeros to [`SERIAL_HEX_WIDTH`].
    pub fn serial_hex(&self) -> String {
        format_serial(&self.serial)
    }

    /// Base64 (standard alphabet) of the authority key identifier; the
    /// issuer's natural key.
    pub fn authority_key_id_b64(&self) -> String {
        BASE64.encode(&self.authority_key_id)
    }

    /// Subject common name (when non-empty) and SAN DNS names, de-duplicated.
    pub fn names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.dns_names.iter().cloned().collect();
        if !self.subject_common_name.is_empty() {
            names.insert(self.subject_common_name.clone());
        }
        names
    }

    /// Whether `now` falls inside `[not_before, not_after]`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.not_after < now
    }
}

fn first_common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Formats big-endian serial bytes as zero-padded lowercase hex.
///
/// # Examples
///
/// ```
/// use ctsql_common::types::format_serial;
///
/// assert_eq!(format_serial(&[0x00, 0x0a, 0xbc]), format!("{:0>36}", "abc"));
/// ```
pub fn format_serial(serial: &[u8]) -> String {
    let hex = hex::encode(serial);
    let digits = hex.trim_start_matches('0');
    format!("{digits:0>width$}", width = SERIAL_HEX_WIDTH)
}

/// One entry fetched from a CT log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Position of the entry in the log's Merkle tree.
    pub index: u64,
    /// Milliseconds since the Unix epoch, from the timestamped entry.
    pub timestamp_ms: u64,
    pub kind: LogEntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntryKind {
    /// A DER-encoded leaf certificate.
    X509(Vec<u8>),
    /// The DER-encoded TBS body of a precertificate.
    Precert { tbs_certificate: Vec<u8> },
}

impl LogEntry {
    pub fn parse_certificate(&self) -> Result<CertificateInfo, CertificateError> {
        match &self.kind {
            LogEntryKind::X509(der) => CertificateInfo::from_der(der),
            LogEntryKind::Precert { tbs_certificate } => {
                CertificateInfo::from_tbs_der(tbs_certificate)
            }
        }
    }

    pub fn entry_time(&self) -> Result<DateTime<Utc>, CertificateError> {
        i64::try_from(self.timestamp_ms)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or(CertificateError::TimeOutOfRange { field: "entryTime" })
    }
}

/// A certificate delivered by the third-party feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub cert_bytes: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Geolocation of a resolved address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPlace {
    pub city: String,
    /// ISO 3166 country code.
    pub country: String,
    pub continent: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rcgen::{CertificateParams, DnType, KeyPair, SerialNumber};

    fn self_signed(cn: &str, sans: &[&str], serial: &[u8]) -> Vec<u8> {
        let mut params =
            CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.serial_number = Some(SerialNumber::from(serial.to_vec()));
        params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        params.not_after = rcgen::date_time_ymd(2040, 1, 1);
        let key_pair = KeyPair::generate().unwrap();
        params.self_signed(&key_pair).unwrap().der().to_vec()
    }

    fn info(cn: &str, sans: &[&str]) -> CertificateInfo {
        CertificateInfo {
            serial: vec![1],
            authority_key_id: vec![],
            issuer_common_name: "Test CA".into(),
            subject_common_name: cn.into(),
            dns_names: sans.iter().map(|s| s.to_string()).collect(),
            not_before: Utc::now() - Duration::days(1),
            not_after: Utc::now() + Duration::days(1),
            raw: vec![],
        }
    }

    #[test]
    fn parses_generated_certificate() {
        let der = self_signed("example.com", &["www.example.com", "example.com"], &[0x01, 0x02]);
        let cert = CertificateInfo::from_der(&der).unwrap();

        assert_eq!(cert.subject_common_name, "example.com");
        assert_eq!(cert.issuer_common_name, "example.com");
        assert_eq!(cert.dns_names, vec!["www.example.com", "example.com"]);
        assert_eq!(cert.serial_hex(), format!("{:0>36}", "102"));
        assert_eq!(
            cert.not_before,
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(cert.raw, der);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            CertificateInfo::from_der(b"not a certificate"),
            Err(CertificateError::Der(_))
        ));
        assert!(CertificateInfo::from_tbs_der(&[0x30, 0x03, 0x02]).is_err());
    }

    #[test]
    fn serial_is_padded_to_fixed_width() {
        assert_eq!(format_serial(&[0xff]).len(), SERIAL_HEX_WIDTH);
        assert_eq!(format_serial(&[0x00, 0x00, 0x01]), format!("{:0>36}", "1"));
        assert_eq!(format_serial(&[]), "0".repeat(SERIAL_HEX_WIDTH));
    }

    #[test]
    fn common_name_is_merged_with_sans() {
        let cert = info("example.com", &["example.com", "www.example.com"]);
        let names: Vec<_> = cert.names().into_iter().collect();
        assert_eq!(names, vec!["example.com", "www.example.com"]);
    }

    #[test]
    fn empty_common_name_is_ignored() {
        let cert = info("", &["a.example.com"]);
        assert_eq!(cert.names().len(), 1);
    }

    #[test]
    fn validity_window_is_inclusive() {
        let cert = info("example.com", &[]);
        assert!(cert.is_valid_at(cert.not_before));
        assert!(cert.is_valid_at(cert.not_after));
        assert!(!cert.is_valid_at(cert.not_after + Duration::seconds(1)));
        assert!(cert.is_expired_at(cert.not_after + Duration::seconds(1)));
    }

    #[test]
    fn entry_time_is_millisecond_epoch() {
        let entry = LogEntry {
            index: 7,
            timestamp_ms: 1_500_000_000_123,
            kind: LogEntryKind::X509(vec![]),
        };
        assert_eq!(entry.entry_time().unwrap().timestamp_millis(), 1_500_000_000_123);
    }

    #[test]
    fn authority_key_id_is_base64() {
        let mut cert = info("example.com", &[]);
        cert.authority_key_id = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(cert.authority_key_id_b64(), "3q2+7w==");
    }
}
