//! In-process fakes for the crawler's collaborators.

use crate::catalog::CatalogStore;
use crate::error::{FetchError, NotifyError, StoreError};
use crate::fetch::PageFetcher;
use crate::models::{CourseId, CourseRecord, NotificationEvent};
use crate::notify::Notifier;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Default)]
struct FakeState {
    pages: HashMap<String, String>,
    scripted: HashMap<String, VecDeque<u16>>,
    hanging: HashSet<String>,
    cancel_on: HashMap<String, CancellationToken>,
    calls: Vec<(String, Instant)>,
}

/// Serves canned pages by exact URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeFetcher {
    state: Mutex<FakeState>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, url: &str, body: &str) {
        self.state.lock().unwrap().pages.insert(url.to_string(), body.to_string());
    }

    /// Answer the next `times` requests for `url` with `status` before serving the page.
    pub fn fail_times(&self, url: &str, times: usize, status: u16) {
        let mut state = self.state.lock().unwrap();
        let queue = state.scripted.entry(url.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(status);
        }
    }

    /// Never answer requests for `url`.
    pub fn hang(&self, url: &str) {
        self.state.lock().unwrap().hanging.insert(url.to_string());
    }

    /// Fire `token` when `url` is requested, then never answer.
    pub fn cancel_on(&self, url: &str, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on.insert(url.to_string(), token);
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|(u, _)| u == url).count()
    }

    /// Request times for URLs starting with `prefix`, in call order.
    pub fn call_times(&self, prefix: &str) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(u, _)| u.starts_with(prefix))
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let key = url.to_string();
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.calls.push((key.clone(), Instant::now()));
            if let Some(token) = state.cancel_on.get(&key) {
                token.cancel();
                None
            } else if state.hanging.contains(&key) {
                None
            } else if let Some(status) =
                state.scripted.get_mut(&key).and_then(|q| q.pop_front())
            {
                Some(Err(FetchError::Status { url: key.clone(), status }))
            } else {
                Some(state.pages.get(&key).cloned().ok_or(FetchError::Status {
                    url: key.clone(),
                    status: 404,
                }))
            }
        };
        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

/// Catalog held in memory, recording every insert.
#[derive(Default)]
pub struct MemoryStore {
    courses: Mutex<BTreeMap<String, String>>,
    inserted: Mutex<Vec<CourseRecord>>,
    reject: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn with(courses: &[(&str, &str)]) -> Self {
        let store = Self::default();
        {
            let mut map = store.courses.lock().unwrap();
            for (id, title) in courses {
                map.insert(id.to_string(), title.to_string());
            }
        }
        store
    }

    /// Make inserts of `id` fail.
    pub fn reject_insert(&self, id: &str) {
        self.reject.lock().unwrap().insert(id.to_string());
    }

    pub fn inserted(&self) -> Vec<CourseRecord> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn course_title(&self, id: &CourseId) -> Result<Option<String>, StoreError> {
        Ok(self.courses.lock().unwrap().get(id.as_str()).cloned())
    }

    async fn insert_course(&self, record: &CourseRecord) -> Result<(), StoreError> {
        if self.reject.lock().unwrap().contains(record.identifier.as_str()) {
            return Err(StoreError::Unavailable("insert rejected".to_string()));
        }
        let mut courses = self.courses.lock().unwrap();
        if courses.contains_key(record.identifier.as_str()) {
            return Err(StoreError::Unavailable(format!("duplicate {}", record.identifier)));
        }
        courses.insert(record.identifier.to_string(), record.title.clone());
        self.inserted.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Every operation fails as if the database were down.
pub struct FailingStore;

#[async_trait]
impl CatalogStore for FailingStore {
    async fn course_title(&self, _id: &CourseId) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn insert_course(&self, _record: &CourseRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Keeps every event it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            events: Mutex::default(),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(NotifyError::Status(500));
        }
        Ok(())
    }
}
