use ctsql_storage::{EntriesStore, PendingName};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::error::{Result, ScanError};
use crate::geo::GeoLookup;
use crate::resolver::NameResolver;
use crate::signal::StopSignal;

/// Capacity of the channel between the producer and the workers.
pub const QUEUE_CAPACITY: usize = 10;

/// Progress is logged every this many names handed to workers.
const PROGRESS_INTERVAL: usize = 256;

/// Per-run counters, summed over all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Names taken off the queue by this run.
    pub dequeued: u64,
    /// Names already gone from the queue, left to whoever took them.
    pub skipped: u64,
    /// Names that resolved to at least one address.
    pub resolved: u64,
    /// Wildcards and failed lookups, recorded with an empty address.
    pub unresolved: u64,
    /// Names with a recorded place.
    pub placed: u64,
}

impl ScanStats {
    fn merge(&mut self, other: ScanStats) {
        self.dequeued += other.dequeued;
        self.skipped += other.skipped;
        self.resolved += other.resolved;
        self.unresolved += other.unresolved;
        self.placed += other.placed;
    }
}

/// Resolves queued names and records their addresses and location.
///
/// A name is removed from the queue before it is resolved: if the process
/// dies mid-lookup, that name is not enriched, but no name is ever resolved
/// twice. Lookup failures are recorded as an empty address so the name is
/// not picked up again.
#[derive(Clone)]
pub struct NetScan {
    store: Arc<EntriesStore>,
    resolver: Arc<dyn NameResolver>,
    geo: Arc<dyn GeoLookup>,
    workers: usize,
    lookup_timeout: Duration,
}

impl NetScan {
    pub fn new(
        store: Arc<EntriesStore>,
        resolver: Arc<dyn NameResolver>,
        geo: Arc<dyn GeoLookup>,
        workers: usize,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            geo,
            workers: workers.max(1),
            lookup_timeout,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Feeds `entries` to the worker pool and waits for every worker to
    /// finish.
    ///
    /// When `stop` fires, no further names are handed out. Names already in
    /// the channel are still processed, the rest stay queued in storage, and
    /// the call returns [`ScanError::Cancelled`] once the workers are done.
    pub async fn process_entries(
        &self,
        entries: Vec<PendingName>,
        stop: &StopSignal,
    ) -> Result<ScanStats> {
        let (tx, rx) = mpsc::channel::<PendingName>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            let scan = self.clone();
            let rx = Arc::clone(&rx);
            workers.spawn(async move { scan.run_worker(worker_id, rx).await });
        }
        tracing::info!(
            workers = self.workers,
            pending = entries.len(),
            "Starting netscan"
        );

        let total = entries.len();
        let mut cancelled = None;
        for (i, entry) in entries.into_iter().enumerate() {
            tokio::select! {
                biased;
                _ = stop.stopped() => {
                    cancelled = Some(stop.reason());
                    break;
                }
                sent = tx.send(entry) => {
                    if sent.is_err() {
                        tracing::warn!("All netscan workers exited early");
                        break;
                    }
                    if i % PROGRESS_INTERVAL == 0 {
                        tracing::info!(sent = i, total, "Netscan progress");
                    }
                }
            }
        }
        drop(tx);

        let mut stats = ScanStats::default();
        while let Some(joined) = workers.join_next().await {
            stats.merge(joined?);
        }
        tracing::info!(
            dequeued = stats.dequeued,
            resolved = stats.resolved,
            unresolved = stats.unresolved,
            placed = stats.placed,
            skipped = stats.skipped,
            "Netscan finished"
        );

        match cancelled {
            Some(signal) => Err(ScanError::Cancelled { signal }),
            None => Ok(stats),
        }
    }

    async fn run_worker(
        &self,
        worker_id: usize,
        rx: Arc<Mutex<mpsc::Receiver<PendingName>>>,
    ) -> ScanStats {
        let mut stats = ScanStats::default();
        loop {
            let next = rx.lock().await.recv().await;
            let Some(entry) = next else {
                break;
            };
            self.resolve_entry(&entry, &mut stats).await;
        }
        tracing::debug!(worker_id, dequeued = stats.dequeued, "Netscan worker done");
        stats
    }

    async fn resolve_entry(&self, entry: &PendingName, stats: &mut ScanStats) {
        match self.store.unqueue_from_netscan(entry.name_id).await {
            Ok(true) => stats.dequeued += 1,
            Ok(false) => {
                tracing::debug!(name = %entry.name, name_id = entry.name_id, "Already dequeued");
                stats.skipped += 1;
                return;
            }
            Err(e) => {
                tracing::warn!(
                    name = %entry.name,
                    name_id = entry.name_id,
                    error = %e,
                    "Could not dequeue host"
                );
                stats.skipped += 1;
                return;
            }
        }

        if entry.name.contains('*') {
            self.record_address(entry, "").await;
            stats.unresolved += 1;
            return;
        }

        let addresses = match self.lookup(&entry.name).await {
            Ok(addresses) => addresses,
            Err(e) => {
                tracing::debug!(name = %entry.name, error = %e, "Could not lookup host");
                self.record_address(entry, "").await;
                stats.unresolved += 1;
                return;
            }
        };

        for address in &addresses {
            self.record_address(entry, &address.to_string()).await;
        }
        stats.resolved += 1;

        let Some(first) = addresses.first().copied() else {
            return;
        };
        match self.locate(first).await {
            Ok(place) => match self.store.insert_resolved_place(entry.name_id, &place).await {
                Ok(()) => stats.placed += 1,
                Err(e) => tracing::warn!(name = %entry.name, error = %e, "Could not record place"),
            },
            Err(e) => {
                tracing::debug!(name = %entry.name, address = %first, error = %e, "Could not lookup geo-ip record");
            }
        }
    }

    async fn lookup(&self, name: &str) -> Result<Vec<IpAddr>> {
        match timeout(self.lookup_timeout, self.resolver.lookup(name)).await {
            Ok(Ok(addresses)) if addresses.is_empty() => Err(ScanError::Lookup {
                name: name.to_string(),
                reason: "no addresses".to_string(),
            }),
            Ok(res) => res,
            Err(_) => Err(ScanError::Timeout {
                what: format!("DNS lookup of {name}"),
            }),
        }
    }

    async fn locate(&self, address: IpAddr) -> Result<ctsql_common::types::GeoPlace> {
        timeout(self.lookup_timeout, self.geo.lookup_city(address))
            .await
            .map_err(|_| ScanError::Timeout {
                what: format!("geo lookup of {address}"),
            })?
    }

    async fn record_address(&self, entry: &PendingName, address: &str) {
        if let Err(e) = self.store.insert_resolved_name(entry.name_id, address).await {
            tracing::warn!(
                name = %entry.name,
                address,
                error = %e,
                "Could not record resolution"
            );
        }
    }
}
