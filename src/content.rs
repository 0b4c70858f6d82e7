//! Per-type panel content
//!
//! Creating an object asks for the panel content of its token type. The fetch
//! runs on its own worker thread and never touches tracking state; its result
//! is merged here the next time the library is polled. Each type is fetched
//! at most once per library, whether the earlier request is still in flight
//! or already done. Failed fetches degrade to a fallback payload.

use crate::catalog::TokenType;
use crate::error::TrackingError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Descriptive copy shown in a token's panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenContent {
    pub summary: String,
    pub innovation_point: String,
    pub location_context: String,
}

impl TokenContent {
    /// Generic copy used whenever real content is unavailable
    pub fn fallback() -> Self {
        Self {
            summary: "A cutting-edge futuristic workspace design.".to_string(),
            innovation_point: "Integration of IoT and reactive lighting.".to_string(),
            location_context: "Located in the tech hub of Bangalore.".to_string(),
        }
    }
}

/// Source of panel content. Implementations are called off the frame thread.
pub trait ContentFetcher: Send + Sync {
    fn fetch(&self, token: &TokenType) -> Result<TokenContent, TrackingError>;
}

/// Offline fetcher returning the fallback copy after an optional delay
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    pub delay: Duration,
}

impl MockFetcher {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ContentFetcher for MockFetcher {
    fn fetch(&self, _token: &TokenType) -> Result<TokenContent, TrackingError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(TokenContent::fallback())
    }
}

/// Presentation-side state of one type's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<TokenContent>,
}

pub struct ContentLibrary {
    fetcher: Arc<dyn ContentFetcher>,
    entries: HashMap<String, ContentEntry>,
    tx: Sender<(String, TokenContent)>,
    rx: Receiver<(String, TokenContent)>,
}

impl Default for ContentLibrary {
    fn default() -> Self {
        Self::new(Arc::new(MockFetcher::default()))
    }
}

impl std::fmt::Debug for ContentLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentLibrary")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl ContentLibrary {
    pub fn new(fetcher: Arc<dyn ContentFetcher>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            fetcher,
            entries: HashMap::new(),
            tx,
            rx,
        }
    }

    /// Start a fetch for `token` unless one is cached or in flight.
    /// Returns true when a fetch was launched.
    pub fn request(&mut self, token: &TokenType) -> bool {
        if self.entries.contains_key(&token.type_id) {
            return false;
        }
        self.entries.insert(
            token.type_id.clone(),
            ContentEntry {
                loading: true,
                content: None,
            },
        );

        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        let owned = token.clone();
        let spawned = thread::Builder::new()
            .name(format!("content-{}", token.type_id))
            .spawn(move || {
                // a panicking fetcher must still settle the entry
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| fetcher.fetch(&owned)));
                let content = match outcome {
                    Ok(Ok(content)) => content,
                    Ok(Err(e)) => {
                        warn!(type_id = %owned.type_id, error = %e, "content fetch failed, using fallback");
                        TokenContent::fallback()
                    }
                    Err(_) => {
                        warn!(type_id = %owned.type_id, "content fetcher panicked, using fallback");
                        TokenContent::fallback()
                    }
                };
                // the library may be gone by now
                let _ = tx.send((owned.type_id, content));
            });

        if let Err(e) = spawned {
            warn!(type_id = %token.type_id, error = %e, "could not start content fetch");
            self.finish(token.type_id.clone(), TokenContent::fallback());
        } else {
            debug!(type_id = %token.type_id, "content fetch started");
        }
        true
    }

    /// Merge every finished fetch. Never blocks. Returns the number merged.
    pub fn poll(&mut self) -> usize {
        let mut merged = 0;
        while let Ok((type_id, content)) = self.rx.try_recv() {
            self.finish(type_id, content);
            merged += 1;
        }
        merged
    }

    fn finish(&mut self, type_id: String, content: TokenContent) {
        self.entries.insert(
            type_id,
            ContentEntry {
                loading: false,
                content: Some(content),
            },
        );
    }

    pub fn get(&self, type_id: &str) -> Option<&ContentEntry> {
        self.entries.get(type_id)
    }

    pub fn is_loading(&self, type_id: &str) -> bool {
        self.entries.get(type_id).is_some_and(|e| e.loading)
    }

    /// Number of fetches still in flight
    pub fn pending(&self) -> usize {
        self.entries.values().filter(|e| e.loading).count()
    }

    /// Ordered copy for frame snapshots
    pub fn snapshot(&self) -> BTreeMap<String, ContentEntry> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
