use chrono::{DateTime, Utc};
use ctsql_common::retry::RetryPolicy;
use ctsql_common::types::{CertificateInfo, FeedEntry, LogEntry};
use sea_orm::{ActiveValue::Set, EntityTrait};
use serde::{Deserialize, Serialize};

use crate::entities::censys_entry::{self, Entity as CensysEntity};
use crate::entities::ct_log_entry::{self, Entity as LogEntryEntity};
use crate::error::Result;
use crate::store::{ignore_duplicate, EntriesStore};

/// Which certificates the entry points store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPolicy {
    /// Skip certificates whose `notBefore` is earlier than this.
    #[serde(default)]
    pub earliest_date: Option<DateTime<Utc>>,
    /// Store certificates that are already expired.
    #[serde(default)]
    pub log_expired_entries: bool,
    /// When non-empty, only issuers whose common name starts with one of
    /// these prefixes are stored.
    #[serde(default)]
    pub issuer_cn_filter: Vec<String>,
}

impl FilterPolicy {
    /// Returns why `cert` is skipped, or `None` when it should be stored.
    pub fn rejection(&self, cert: &CertificateInfo, now: DateTime<Utc>) -> Option<&'static str> {
        if self
            .earliest_date
            .is_some_and(|earliest| cert.not_before < earliest)
        {
            return Some("issued before earliest date");
        }
        if !self.log_expired_entries && cert.is_expired_at(now) {
            return Some("expired");
        }
        if !self.issuer_cn_filter.is_empty()
            && !self
                .issuer_cn_filter
                .iter()
                .any(|prefix| cert.issuer_common_name.starts_with(prefix.as_str()))
        {
            return Some("issuer not in filter");
        }
        None
    }

    pub fn admits(&self, cert: &CertificateInfo, now: DateTime<Utc>) -> bool {
        self.rejection(cert, now).is_none()
    }
}

/// Behaviour shared by both entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    #[serde(default)]
    pub filter: FilterPolicy,
    /// Record which log and index every CT entry came from.
    #[serde(default)]
    pub correlate_log_entries: bool,
    /// Bounds both the issuer upsert loop and the CT entry retry loop.
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted(i64),
    /// Skipped by the filter policy; nothing was written.
    Filtered,
}

impl EntriesStore {
    fn filter_out(&self, cert: &CertificateInfo) -> bool {
        match self.options.filter.rejection(cert, Utc::now()) {
            Some(reason) => {
                tracing::debug!(serial = %cert.serial_hex(), reason, "Certificate filtered out");
                true
            }
            None => false,
        }
    }

    /// Stores a certificate from the third-party feed together with its
    /// import marker. Runs once; a failure rolls back and is returned.
    pub async fn insert_feed_entry(&self, entry: &FeedEntry) -> Result<IngestOutcome> {
        let cert = CertificateInfo::from_der(&entry.cert_bytes)?;
        if self.filter_out(&cert) {
            return Ok(IngestOutcome::Filtered);
        }

        let (txn, cert_id) = self.insert_certificate(&cert).await.inspect_err(|e| {
            tracing::debug!(serial = %cert.serial_hex(), error = %e, "Error inserting feed certificate");
        })?;

        let marker = censys_entry::ActiveModel {
            cert_id: Set(cert_id),
            entry_time: Set(entry.timestamp.naive_utc()),
            ..Default::default()
        };
        ignore_duplicate(async {
            CensysEntity::insert(marker)
                .exec_without_returning(&txn)
                .await
                .map(|_| ())
        })
        .await?;

        txn.commit().await?;
        Ok(IngestOutcome::Inserted(cert_id))
    }

    /// Stores the certificate carried by a CT log entry.
    ///
    /// The pipeline runs up to `retry.attempts` times with jittered backoff
    /// between attempts. Every failed attempt is rolled back; after the last
    /// one its error is returned. Re-ingesting an entry that is already stored
    /// succeeds without creating new rows.
    pub async fn insert_ct_entry(&self, entry: &LogEntry, log_id: i64) -> Result<IngestOutcome> {
        let cert = entry.parse_certificate()?;
        if self.filter_out(&cert) {
            return Ok(IngestOutcome::Filtered);
        }

        let attempts = self.options.retry.attempts.max(1);
        let mut backoff = self.options.retry.backoff();
        let mut attempt = 1;
        loop {
            let err = match self.try_insert_ct_entry(&cert, entry, log_id).await {
                Ok(cert_id) => return Ok(IngestOutcome::Inserted(cert_id)),
                Err(e) => e,
            };
            if attempt >= attempts {
                tracing::warn!(
                    log_id,
                    index = entry.index,
                    attempts,
                    error = %err,
                    "Giving up on CT entry"
                );
                return Err(err);
            }
            tracing::debug!(
                log_id,
                index = entry.index,
                attempt,
                attempts,
                error = %err,
                "Error inserting cert, retrying"
            );
            tokio::time::sleep(backoff.next_delay()).await;
            attempt += 1;
        }
    }

    async fn try_insert_ct_entry(
        &self,
        cert: &CertificateInfo,
        entry: &LogEntry,
        log_id: i64,
    ) -> Result<i64> {
        let (txn, cert_id) = self.insert_certificate(cert).await?;

        if self.options.correlate_log_entries {
            let provenance = ct_log_entry::ActiveModel {
                cert_id: Set(cert_id),
                log_id: Set(log_id),
                entry_id: Set(entry.index as i64),
                entry_time: Set(entry.entry_time()?.naive_utc()),
            };
            // A replayed entry finds its provenance row already present.
            ignore_duplicate(async {
                LogEntryEntity::insert(provenance)
                    .exec_without_returning(&txn)
                    .await
                    .map(|_| ())
            })
            .await?;
        }

        txn.commit().await?;
        Ok(cert_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cert(issuer: &str, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> CertificateInfo {
        CertificateInfo {
            serial: vec![9],
            authority_key_id: vec![1, 2, 3],
            issuer_common_name: issuer.into(),
            subject_common_name: "example.com".into(),
            dns_names: vec![],
            not_before,
            not_after,
            raw: vec![],
        }
    }

    #[test]
    fn default_policy_skips_only_expired() {
        let now = Utc::now();
        let policy = FilterPolicy::default();
        let valid = cert("Any CA", now - Duration::days(10), now + Duration::days(10));
        let expired = cert("Any CA", now - Duration::days(10), now - Duration::days(1));

        assert!(policy.admits(&valid, now));
        assert_eq!(policy.rejection(&expired, now), Some("expired"));

        let keep_expired = FilterPolicy {
            log_expired_entries: true,
            ..Default::default()
        };
        assert!(keep_expired.admits(&expired, now));
    }

    #[test]
    fn earliest_date_cutoff() {
        let now = Utc::now();
        let policy = FilterPolicy {
            earliest_date: Some(now - Duration::days(30)),
            ..Default::default()
        };
        let old = cert("Any CA", now - Duration::days(31), now + Duration::days(10));
        let recent = cert("Any CA", now - Duration::days(29), now + Duration::days(10));

        assert_eq!(policy.rejection(&old, now), Some("issued before earliest date"));
        assert!(policy.admits(&recent, now));
    }

    #[test]
    fn issuer_prefix_allow_list() {
        let now = Utc::now();
        let policy = FilterPolicy {
            issuer_cn_filter: vec!["Let's Encrypt".into(), "R3".into()],
            ..Default::default()
        };
        let window = (now - Duration::days(1), now + Duration::days(1));

        assert!(policy.admits(&cert("Let's Encrypt Authority X3", window.0, window.1), now));
        assert!(policy.admits(&cert("R3", window.0, window.1), now));
        assert_eq!(
            policy.rejection(&cert("DigiCert SHA2", window.0, window.1), now),
            Some("issuer not in filter")
        );
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: IngestOptions = toml::from_str(
            r#"
            correlate_log_entries = true

            [filter]
            issuer_cn_filter = ["R3"]
            "#,
        )
        .unwrap();
        assert!(options.correlate_log_entries);
        assert_eq!(options.filter.issuer_cn_filter, vec!["R3"]);
        assert!(!options.filter.log_expired_entries);
        assert_eq!(options.retry, RetryPolicy::default());
    }
}
