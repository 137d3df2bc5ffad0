#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use intentmem::config::{GenerationConfig, PersistenceConfig};
use intentmem::db;
use intentmem::gateway::{BlobGateway, BlobStore, GatewayError, Pointer};
use intentmem::intent::normalize::NormalizeOptions;
use intentmem::intent::IntentExtractor;
use intentmem::llm::{GenerationError, GenerationRequest, GenerativeBackend};
use intentmem::memory::cache::PointerCache;
use intentmem::memory::types::MemoryAggregate;
use intentmem::memory::MemoryManager;

/// Generative backend that replays scripted replies and records every call.
/// Once the script runs out it keeps answering with `fallback`, if set.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: Option<String>,
    pub models: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            models: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answer every call with `text`.
    pub fn always(text: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(text.to_string()),
            models: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.models.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, model: &str, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.models.lock().unwrap().push(model.to_string());
        self.prompts.lock().unwrap().push(request.prompt.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or(GenerationError::EmptyResponse),
        }
    }
}

pub fn test_extractor(backend: Arc<ScriptedBackend>) -> IntentExtractor {
    IntentExtractor::new(backend, GenerationConfig::default(), NormalizeOptions::default())
}

/// In-memory blob store with call counters and failure injection.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    next_id: AtomicUsize,
    puts: AtomicUsize,
    gets: AtomicUsize,
    failing: AtomicBool,
    put_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    /// Bytes of every successful put, in order.
    committed: Mutex<Vec<Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent put fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent put take `delay` before answering.
    pub fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    /// Highest number of puts observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Put attempts, including failed ones.
    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Store a blob directly, bypassing counters.
    pub fn insert(&self, pointer: &str, payload: impl Into<Bytes>) {
        self.blobs.lock().unwrap().insert(pointer.to_string(), payload.into());
    }

    pub fn committed(&self) -> Vec<MemoryAggregate> {
        self.committed
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
            .collect()
    }

    pub fn last_committed(&self) -> Option<MemoryAggregate> {
        self.committed().pop()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_bytes(&self, payload: Bytes, _epochs: u32) -> Result<Pointer, GatewayError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 503,
                body: "publisher unavailable".into(),
            });
        }
        let pointer = format!("blob-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.blobs.lock().unwrap().insert(pointer.clone(), payload.clone());
        self.committed.lock().unwrap().push(payload);
        Ok(pointer)
    }

    async fn get_bytes(&self, pointer: &str) -> Result<Option<Bytes>, GatewayError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.blobs.lock().unwrap().get(pointer).cloned())
    }
}

pub fn test_gateway(store: Arc<MemoryBlobStore>) -> BlobGateway {
    BlobGateway::new(store, Duration::from_secs(10))
}

/// Pointer cache on a fresh in-memory database.
pub fn test_cache() -> PointerCache {
    let conn = db::open_memory_database().unwrap();
    PointerCache::new(Arc::new(Mutex::new(conn)))
}

pub fn test_manager(store: Arc<MemoryBlobStore>, cache: PointerCache) -> MemoryManager {
    MemoryManager::new(test_gateway(store), cache, &PersistenceConfig::default(), 5)
}

/// Advance paused time, letting spawned workers run.
pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Equality that ignores the commit timestamp and pointer.
pub fn same_content(a: &MemoryAggregate, b: &MemoryAggregate) -> bool {
    let strip = |agg: &MemoryAggregate| {
        let mut agg = agg.clone();
        agg.last_updated = 0;
        agg.pointer = None;
        agg
    };
    strip(a) == strip(b)
}
