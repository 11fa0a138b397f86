use std::sync::Arc;
use std::time::Duration;

use crate::cache::{DedupCache, KeyBuilder};
use crate::scoring::DivergenceScorer;

#[derive(Clone)]
pub struct HandlerState {
    pub cache: DedupCache,

    pub keys: Arc<KeyBuilder>,

    pub scorer: Arc<dyn DivergenceScorer>,

    /// Per-caller wait limit; the shared computation is not cancelled.
    pub request_timeout: Option<Duration>,
}

impl HandlerState {
    pub fn new(cache: DedupCache, keys: KeyBuilder, scorer: Arc<dyn DivergenceScorer>) -> Self {
        Self {
            cache,
            keys: Arc::new(keys),
            scorer,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}
