use crate::error::{Result, ScanError};
use crate::geo::GeoLookup;
use crate::pool::NetScan;
use crate::resolver::NameResolver;
use crate::signal::StopSignal;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ctsql_common::types::{CertificateInfo, GeoPlace};
use ctsql_storage::{EntriesStore, IngestOptions};
use sea_orm::{ConnectOptions, Database};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct FakeResolver {
    answers: HashMap<String, Vec<IpAddr>>,
    slow: Vec<String>,
    asked: Mutex<Vec<String>>,
}

impl FakeResolver {
    fn answer(mut self, name: &str, addresses: &[&str]) -> Self {
        self.answers.insert(
            name.to_string(),
            addresses.iter().map(|a| a.parse().unwrap()).collect(),
        );
        self
    }

    fn slow(mut self, name: &str) -> Self {
        self.slow.push(name.to_string());
        self
    }

    fn asked(&self) -> Vec<String> {
        let mut asked = self.asked.lock().unwrap().clone();
        asked.sort();
        asked
    }
}

#[async_trait]
impl NameResolver for FakeResolver {
    async fn lookup(&self, name: &str) -> Result<Vec<IpAddr>> {
        self.asked.lock().unwrap().push(name.to_string());
        if self.slow.iter().any(|n| n == name) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.answers
            .get(name)
            .cloned()
            .ok_or_else(|| ScanError::Lookup {
                name: name.to_string(),
                reason: "NXDOMAIN".to_string(),
            })
    }
}

#[derive(Default)]
struct FakeGeo {
    places: HashMap<IpAddr, GeoPlace>,
}

impl FakeGeo {
    fn place(mut self, address: &str, city: &str, country: &str, continent: &str) -> Self {
        self.places.insert(
            address.parse().unwrap(),
            GeoPlace {
                city: city.into(),
                country: country.into(),
                continent: continent.into(),
            },
        );
        self
    }
}

#[async_trait]
impl GeoLookup for FakeGeo {
    async fn lookup_city(&self, address: IpAddr) -> Result<GeoPlace> {
        self.places.get(&address).cloned().ok_or_else(|| ScanError::Geo {
            address,
            reason: "not in database".to_string(),
        })
    }
}

async fn setup(names: &[&str]) -> (TempDir, Arc<EntriesStore>) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("ct.db").display());
    let mut opts = ConnectOptions::new(url);
    opts.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    let store = EntriesStore::new(db, IngestOptions::default()).await.unwrap();

    let now = Utc::now();
    let cert = CertificateInfo {
        serial: vec![1],
        authority_key_id: vec![0x42],
        issuer_common_name: "Test CA".into(),
        subject_common_name: String::new(),
        dns_names: names.iter().map(|n| n.to_string()).collect(),
        not_before: now - ChronoDuration::days(1),
        not_after: now + ChronoDuration::days(90),
        raw: vec![],
    };
    let (txn, _) = store.insert_certificate(&cert).await.unwrap();
    txn.commit().await.unwrap();

    (dir, Arc::new(store))
}

fn scan(
    store: &Arc<EntriesStore>,
    resolver: Arc<FakeResolver>,
    geo: FakeGeo,
    lookup_timeout: Duration,
) -> NetScan {
    NetScan::new(Arc::clone(store), resolver, Arc::new(geo), 4, lookup_timeout)
}

async fn name_id(store: &EntriesStore, name: &str) -> i64 {
    store
        .pending_names(100)
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.name == name)
        .unwrap()
        .name_id
}

#[tokio::test]
async fn drains_queue_and_records_every_name() {
    let names = ["a.example.com", "b.example.com", "*.example.com", "c.example.com"];
    let (_dir, store) = setup(&names).await;
    let ids: HashMap<&str, i64> = {
        let mut ids = HashMap::new();
        for name in names {
            ids.insert(name, name_id(&store, name).await);
        }
        ids
    };

    let resolver = Arc::new(
        FakeResolver::default()
            .answer("a.example.com", &["192.0.2.10", "2001:db8::10"])
            .answer("c.example.com", &["198.51.100.7"]),
    );
    let geo = FakeGeo::default().place("192.0.2.10", "Paris", "FR", "Europe");
    let pool = scan(&store, resolver.clone(), geo, Duration::from_secs(5));

    let pending = store.pending_names(100).await.unwrap();
    let stats = pool
        .process_entries(pending, &StopSignal::new())
        .await
        .unwrap();

    assert_eq!(store.count_queue().await.unwrap(), 0);
    assert_eq!(stats.dequeued, 4);
    assert_eq!(stats.resolved, 2);
    assert_eq!(stats.unresolved, 2);
    assert_eq!(stats.placed, 1);

    assert_eq!(
        store.resolved_addresses(ids["a.example.com"]).await.unwrap(),
        vec!["192.0.2.10".to_string(), "2001:db8::10".to_string()]
    );
    assert_eq!(
        store.resolved_addresses(ids["b.example.com"]).await.unwrap(),
        vec![String::new()]
    );
    assert_eq!(
        store.resolved_addresses(ids["*.example.com"]).await.unwrap(),
        vec![String::new()]
    );

    let places = store.resolved_places(ids["a.example.com"]).await.unwrap();
    assert_eq!(places.len(), 1);
    assert_eq!(places[0].city, "Paris");
    // Geo failure on the first address leaves only the address rows.
    assert!(store.resolved_places(ids["c.example.com"]).await.unwrap().is_empty());
    assert_eq!(
        store.resolved_addresses(ids["c.example.com"]).await.unwrap(),
        vec!["198.51.100.7".to_string()]
    );

    // Wildcards never reach the resolver.
    assert_eq!(
        resolver.asked(),
        vec!["a.example.com", "b.example.com", "c.example.com"]
    );
}

#[tokio::test]
async fn slow_lookups_degrade_to_empty_record() {
    let (_dir, store) = setup(&["slow.example.com"]).await;
    let id = name_id(&store, "slow.example.com").await;
    let resolver = Arc::new(
        FakeResolver::default()
            .answer("slow.example.com", &["192.0.2.1"])
            .slow("slow.example.com"),
    );
    let pool = scan(&store, resolver, FakeGeo::default(), Duration::from_millis(50));

    let pending = store.pending_names(10).await.unwrap();
    let stats = pool.process_entries(pending, &StopSignal::new()).await.unwrap();

    assert_eq!(stats.unresolved, 1);
    assert_eq!(store.resolved_addresses(id).await.unwrap(), vec![String::new()]);
    assert_eq!(store.count_queue().await.unwrap(), 0);
}

#[tokio::test]
async fn names_dequeued_elsewhere_are_skipped() {
    let (_dir, store) = setup(&["taken.example.com", "mine.example.com"]).await;
    let taken = name_id(&store, "taken.example.com").await;
    let pending = store.pending_names(10).await.unwrap();
    store.unqueue_from_netscan(taken).await.unwrap();

    let resolver = Arc::new(FakeResolver::default().answer("mine.example.com", &["192.0.2.2"]));
    let pool = scan(&store, resolver.clone(), FakeGeo::default(), Duration::from_secs(5));
    let stats = pool.process_entries(pending, &StopSignal::new()).await.unwrap();

    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.dequeued, 1);
    assert!(store.resolved_addresses(taken).await.unwrap().is_empty());
    assert_eq!(resolver.asked(), vec!["mine.example.com"]);
}

#[tokio::test]
async fn stop_signal_leaves_unsent_names_queued() {
    let (_dir, store) = setup(&["one.example.com", "two.example.com", "three.example.com"]).await;
    let resolver = Arc::new(FakeResolver::default());
    let pool = scan(&store, resolver.clone(), FakeGeo::default(), Duration::from_secs(5));

    let stop = StopSignal::new();
    stop.trigger("interrupt");
    let pending = store.pending_names(10).await.unwrap();
    let err = pool.process_entries(pending, &stop).await.unwrap_err();

    match err {
        ScanError::Cancelled { signal } => assert_eq!(signal, "interrupt"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.count_queue().await.unwrap(), 3);
    assert!(resolver.asked().is_empty());
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let (_dir, store) = setup(&[]).await;
    let pool = scan(
        &store,
        Arc::new(FakeResolver::default()),
        FakeGeo::default(),
        Duration::from_secs(5),
    );
    let stats = pool
        .process_entries(Vec::new(), &StopSignal::new())
        .await
        .unwrap();
    assert_eq!(stats, crate::ScanStats::default());
}
