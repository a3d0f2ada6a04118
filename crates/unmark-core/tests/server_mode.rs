//! Behaviour specific to the server backend: identity registration, sharing,
//! the public feed and the partial-failure asymmetry.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use common::*;
use unmark_core::{HistoryReader, Processor, SharePublisher, TransformError, Transformer};
use unmark_shared::constants::{DAILY_LIMIT, MAX_HISTORY_PAGE};
use unmark_shared::validation::{ImageKind, ImageUpload};
use unmark_shared::{Clock, EntryId, HistoryEntry, Identity, QuotaRecord, ResultReference, UnmarkError};
use unmark_store::{Backend, ServerBackend, StoreError};

struct Server {
    backend: Arc<ServerBackend>,
    processor: Processor<ServerBackend>,
    reader: HistoryReader<ServerBackend>,
    publisher: SharePublisher<ServerBackend>,
    transformer: Arc<FakeTransformer>,
    clock: Arc<ManualClock>,
    _dir: tempfile::TempDir,
}

async fn server() -> Server {
    let (backend, dir) = server_backend().await;
    let transformer = FakeTransformer::succeeding();
    let clock = ManualClock::new();
    Server {
        processor: Processor::new(backend.clone(), transformer.clone(), clock.clone()),
        reader: HistoryReader::new(backend.clone(), clock.clone()),
        publisher: SharePublisher::new(backend.clone(), "https://unmark.test/"),
        backend,
        transformer,
        clock,
        _dir: dir,
    }
}

impl Server {
    async fn registered(&self, raw: &str) -> Identity {
        let id = Identity::parse(raw).unwrap();
        self.reader.get_history(&id).await.unwrap();
        id
    }

    async fn processed(&self, id: &Identity) -> EntryId {
        self.processor
            .process(id, &upload(), "photo.png")
            .await
            .unwrap()
            .entry
            .id
    }
}

#[tokio::test]
async fn unregistered_identity_is_rejected_before_transform() {
    let s = server().await;
    let id = Identity::parse("never-registered").unwrap();

    let err = s.processor.process(&id, &upload(), "a.png").await.unwrap_err();
    assert!(matches!(err, UnmarkError::IdentityNotFound));
    assert_eq!(s.transformer.calls(), 0);
}

#[tokio::test]
async fn sixth_attempt_leaves_count_at_limit() {
    let s = server().await;
    let u1 = s.registered("u1").await;
    for _ in 0..DAILY_LIMIT {
        s.processed(&u1).await;
    }

    let err = s.processor.process(&u1, &upload(), "a.png").await.unwrap_err();
    assert!(err.to_string().starts_with("Daily limit reached"));

    let today = s.clock.today();
    let record = s.backend.read_quota(&u1, today).await.unwrap();
    assert_eq!(record.daily_count, DAILY_LIMIT);
}

#[tokio::test]
async fn hosted_url_points_at_object_store() {
    let s = server().await;
    let id = s.registered("u1").await;
    let entry_id = s.processed(&id).await;

    let entry = s.reader.get(entry_id).await.unwrap();
    let url = entry.result.url().unwrap();
    assert_eq!(url, format!("http://localhost:8080/objects/{entry_id}.webp"));

    let key = url.rsplit('/').next().unwrap();
    assert_eq!(s.backend.objects().get(key).await.unwrap(), WEBP_OUTPUT);
}

#[tokio::test]
async fn history_pages_are_capped() {
    let s = server().await;
    let id = s.registered("u6").await;
    for _ in 0..MAX_HISTORY_PAGE + 5 {
        let entry = HistoryEntry {
            id: EntryId::new(),
            identity: id.clone(),
            source_reference: "bulk.png".to_string(),
            result: ResultReference::Url("http://localhost:8080/objects/x.webp".to_string()),
            created_at: s.clock.now(),
            share_slug: None,
        };
        s.backend.append(&entry).await.unwrap();
    }

    let page = s.reader.list(&id, u32::MAX, 0).await.unwrap();
    assert_eq!(page.len(), MAX_HISTORY_PAGE as usize);

    let rest = s.reader.list(&id, u32::MAX, MAX_HISTORY_PAGE).await.unwrap();
    assert_eq!(rest.len(), 5);
}

#[tokio::test]
async fn publish_is_idempotent() {
    let s = server().await;
    let id = s.registered("u1").await;
    let entry_id = s.processed(&id).await;

    let first = s.publisher.publish(entry_id, &id).await.unwrap();
    let second = s.publisher.publish(entry_id, &id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.share_slug.as_str().len(), 8);
    assert_eq!(
        first.share_url,
        format!("https://unmark.test/s/{}", first.share_slug)
    );
    assert!(s.reader.get(entry_id).await.unwrap().is_public());
}

#[tokio::test]
async fn publish_by_other_identity_looks_missing() {
    let s = server().await;
    let owner = s.registered("owner").await;
    let intruder = s.registered("intruder").await;
    let entry_id = s.processed(&owner).await;

    let foreign = s.publisher.publish(entry_id, &intruder).await.unwrap_err();
    let missing = s.publisher.publish(EntryId::new(), &intruder).await.unwrap_err();

    assert!(matches!(foreign, UnmarkError::NotFound));
    assert!(matches!(missing, UnmarkError::NotFound));
    assert_eq!(foreign.to_string(), missing.to_string());
    assert!(!s.reader.get(entry_id).await.unwrap().is_public());
}

#[tokio::test]
async fn public_feed_lists_only_shared_entries() {
    let s = server().await;
    let a = s.registered("a").await;
    let b = s.registered("b").await;

    let first = s.processed(&a).await;
    s.clock.advance(Duration::minutes(1));
    let _private = s.processed(&a).await;
    s.clock.advance(Duration::minutes(1));
    let second = s.processed(&b).await;

    s.publisher.publish(first, &a).await.unwrap();
    let shared = s.publisher.publish(second, &b).await.unwrap();

    let feed: Vec<_> = s
        .reader
        .public_feed()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(feed, vec![second, first]);

    let resolved = s.reader.get_shared(shared.share_slug.as_str()).await.unwrap();
    assert_eq!(resolved.id, second);
    assert!(matches!(
        s.reader.get_shared("00000000").await,
        Err(UnmarkError::NotFound)
    ));
}

/// Persistence step a [`Faulty`] backend refuses to perform.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Fail {
    ObjectWrite,
    HistoryAppend,
    QuotaIncrement,
}

/// Delegates to a real backend except for one failing step.
struct Faulty {
    inner: Arc<ServerBackend>,
    fail: Fail,
}

impl Faulty {
    fn refuse(&self, step: Fail) -> unmark_store::Result<()> {
        if self.fail == step {
            return Err(StoreError::LockPoisoned);
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for Faulty {
    async fn open_session(
        &self,
        identity: &Identity,
        today: NaiveDate,
    ) -> unmark_store::Result<QuotaRecord> {
        self.inner.open_session(identity, today).await
    }

    async fn read_quota(
        &self,
        identity: &Identity,
        today: NaiveDate,
    ) -> unmark_store::Result<QuotaRecord> {
        self.inner.read_quota(identity, today).await
    }

    async fn increment(&self, identity: &Identity, today: NaiveDate) -> unmark_store::Result<QuotaRecord> {
        self.refuse(Fail::QuotaIncrement)?;
        self.inner.increment(identity, today).await
    }

    async fn store_result(
        &self,
        id: EntryId,
        kind: ImageKind,
        bytes: Vec<u8>,
    ) -> unmark_store::Result<ResultReference> {
        self.refuse(Fail::ObjectWrite)?;
        self.inner.store_result(id, kind, bytes).await
    }

    async fn append(&self, entry: &HistoryEntry) -> unmark_store::Result<EntryId> {
        self.refuse(Fail::HistoryAppend)?;
        self.inner.append(entry).await
    }

    async fn list_by_identity(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> unmark_store::Result<Vec<HistoryEntry>> {
        self.inner.list_by_identity(identity, limit, offset).await
    }

    async fn get(&self, id: EntryId) -> unmark_store::Result<HistoryEntry> {
        self.inner.get(id).await
    }
}

struct FaultyServer {
    processor: Processor<Faulty>,
    reader: HistoryReader<Faulty>,
    transformer: Arc<FakeTransformer>,
    _dir: tempfile::TempDir,
}

async fn faulty(fail: Fail) -> FaultyServer {
    let (inner, dir) = server_backend().await;
    let backend = Arc::new(Faulty { inner, fail });
    let transformer = FakeTransformer::succeeding();
    let clock = ManualClock::new();
    FaultyServer {
        processor: Processor::new(backend.clone(), transformer.clone(), clock.clone()),
        reader: HistoryReader::new(backend, clock),
        transformer,
        _dir: dir,
    }
}

async fn assert_nothing_recorded_after(fail: Fail) {
    let s = faulty(fail).await;
    let id = Identity::parse("u4").unwrap();
    s.reader.get_history(&id).await.unwrap();

    let err = s.processor.process(&id, &upload(), "a.png").await.unwrap_err();

    assert!(matches!(err, UnmarkError::Persistence(_)), "got {err:?}");
    // The remote call was paid for.
    assert_eq!(s.transformer.calls(), 1);
    assert!(s.reader.list(&id, 10, 0).await.unwrap().is_empty());
    assert_eq!(s.reader.remaining_today(&id).await.unwrap(), DAILY_LIMIT);
}

#[tokio::test]
async fn failed_object_write_is_a_persistence_error() {
    assert_nothing_recorded_after(Fail::ObjectWrite).await;
}

#[tokio::test]
async fn failed_history_append_is_a_persistence_error() {
    assert_nothing_recorded_after(Fail::HistoryAppend).await;
}

#[tokio::test]
async fn failed_increment_keeps_the_result() {
    let s = faulty(Fail::QuotaIncrement).await;
    let id = Identity::parse("u3").unwrap();
    s.reader.get_history(&id).await.unwrap();

    let processed = s.processor.process(&id, &upload(), "a.png").await.unwrap();
    assert_eq!(processed.remaining_today, DAILY_LIMIT - 1);

    let entries = s.reader.list(&id, 10, 0).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, processed.entry.id);
    // The use went uncounted.
    assert_eq!(s.reader.remaining_today(&id).await.unwrap(), DAILY_LIMIT);
}

/// Runs across midnight; a request from the new day resets the quota
/// while the transformation is in flight.
struct AcrossMidnight {
    clock: Arc<ManualClock>,
    backend: Arc<ServerBackend>,
    identity: Identity,
}

#[async_trait]
impl Transformer for AcrossMidnight {
    async fn transform(&self, _image: &ImageUpload) -> Result<Vec<u8>, TransformError> {
        self.clock.advance(Duration::days(1));
        self.backend
            .read_quota(&self.identity, self.clock.today())
            .await
            .unwrap();
        Ok(WEBP_OUTPUT.to_vec())
    }
}

#[tokio::test]
async fn use_counts_on_the_day_it_finishes() {
    let s = server().await;
    let id = s.registered("u5").await;
    s.processed(&id).await;

    let transformer = Arc::new(AcrossMidnight {
        clock: s.clock.clone(),
        backend: s.backend.clone(),
        identity: id.clone(),
    });
    let processor = Processor::new(s.backend.clone(), transformer, s.clock.clone());

    let processed = processor.process(&id, &upload(), "late.png").await.unwrap();

    assert_eq!(processed.remaining_today, DAILY_LIMIT - 1);
    assert_eq!(s.reader.remaining_today(&id).await.unwrap(), DAILY_LIMIT - 1);
}
