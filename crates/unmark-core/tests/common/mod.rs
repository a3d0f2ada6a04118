//! Fixtures shared by the integration tests: a scripted transformer, a
//! settable clock and ready-made backends of both kinds.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use unmark_core::{TransformError, Transformer};
use unmark_shared::validation::{validate_upload, ImageUpload};
use unmark_shared::Clock;
use unmark_store::{Database, LocalBackend, ObjectStore, ServerBackend};

pub const PNG_INPUT: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRinput";
pub const WEBP_OUTPUT: &[u8] = b"RIFF\x24\0\0\0WEBPVP8 cleaned";

pub fn upload() -> ImageUpload {
    validate_upload(PNG_INPUT.to_vec()).unwrap()
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 6, 15, 10, 0, 0).unwrap()),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// What the fake remote service answers.
#[derive(Clone)]
pub enum Script {
    Succeed(Vec<u8>),
    Fail,
}

pub struct FakeTransformer {
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl FakeTransformer {
    pub fn succeeding() -> Arc<Self> {
        Self::with(Script::Succeed(WEBP_OUTPUT.to_vec()))
    }

    pub fn with(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transformer for FakeTransformer {
    async fn transform(&self, _image: &ImageUpload) -> Result<Vec<u8>, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Succeed(bytes) => Ok(bytes),
            Script::Fail => Err(TransformError::Prediction("failed: model crashed".into())),
        }
    }
}

pub async fn server_backend() -> (Arc<ServerBackend>, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::open_at(&dir.path().join("server.db")).unwrap();
    let objects = ObjectStore::new(dir.path().join("objects"), "http://localhost:8080")
        .await
        .unwrap();
    (Arc::new(ServerBackend::new(db, objects)), dir)
}

pub fn local_backend() -> (Arc<LocalBackend>, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::open_at(&dir.path().join("device.db")).unwrap();
    (Arc::new(LocalBackend::new(db)), dir)
}
