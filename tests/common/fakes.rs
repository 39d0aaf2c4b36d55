//! Test doubles for the persistence and responder ports.

use async_trait::async_trait;
use parking_lot::Mutex;
use parleyd::responder::{Responder, ResponderError};
use parleyd::store::{MemoryStore, StateStore, StoreError, StoreFamily, StoreKey};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Default)]
struct FailurePlan {
    /// Only keys of this family fail; `None` fails any key.
    family: Option<StoreFamily>,
    /// Matching saves to let through before failing.
    skip_saves: usize,
    saves: usize,
    removes: usize,
}

/// In-memory store that fails a configured number of writes.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    plan: Mutex<FailurePlan>,
    saves: Mutex<Vec<StoreKey>>,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` saves of keys in `family` (any key if `None`).
    pub fn fail_saves(&self, family: Option<StoreFamily>, count: usize) {
        self.fail_saves_after(family, 0, count);
    }

    /// Let `skip` matching saves succeed, then fail the next `count`.
    pub fn fail_saves_after(&self, family: Option<StoreFamily>, skip: usize, count: usize) {
        let mut plan = self.plan.lock();
        plan.family = family;
        plan.skip_saves = skip;
        plan.saves = count;
    }

    /// Fail the next `count` removes of keys in `family` (any key if `None`).
    pub fn fail_removes(&self, family: Option<StoreFamily>, count: usize) {
        let mut plan = self.plan.lock();
        plan.family = family;
        plan.removes = count;
    }

    /// Keys of every successful save, in order.
    pub fn saved_keys(&self) -> Vec<StoreKey> {
        self.saves.lock().clone()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn should_fail_save(&self, key: &StoreKey) -> bool {
        let mut plan = self.plan.lock();
        if plan.family.is_some_and(|f| f != key.family()) || plan.saves == 0 {
            return false;
        }
        if plan.skip_saves > 0 {
            plan.skip_saves -= 1;
            return false;
        }
        plan.saves -= 1;
        true
    }

    fn should_fail_remove(&self, key: &StoreKey) -> bool {
        let mut plan = self.plan.lock();
        if plan.family.is_some_and(|f| f != key.family()) || plan.removes == 0 {
            return false;
        }
        plan.removes -= 1;
        true
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn load(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.load(key).await
    }

    async fn save(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
        if self.should_fail_save(key) {
            return Err(StoreError::Database(format!("injected save failure for {key}")));
        }
        self.inner.save(key, value).await?;
        self.saves.lock().push(key.clone());
        Ok(())
    }

    async fn remove(&self, key: &StoreKey) -> Result<bool, StoreError> {
        if self.should_fail_remove(key) {
            return Err(StoreError::Database(format!("injected remove failure for {key}")));
        }
        self.inner.remove(key).await
    }

    async fn list(&self, family: StoreFamily) -> Result<Vec<StoreKey>, StoreError> {
        self.inner.list(family).await
    }
}

/// Responder that plays back queued results, then a default reply.
#[derive(Debug, Default)]
pub struct ScriptedResponder {
    script: Mutex<VecDeque<Result<String, ResponderError>>>,
    prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedResponder {
    pub const DEFAULT_REPLY: &'static str = "automated reply";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: &str) {
        self.script.lock().push_back(Ok(reply.to_string()));
    }

    pub fn push_error(&self, error: ResponderError) {
        self.script.lock().push_back(Err(error));
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn complete(&self, prompt: &str) -> Result<String, ResponderError> {
        self.prompts.lock().push(prompt.to_string());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::DEFAULT_REPLY.to_string()))
    }
}

/// Responder that never answers within any reasonable timeout.
#[derive(Debug)]
pub struct SlowResponder {
    pub delay: Duration,
}

#[async_trait]
impl Responder for SlowResponder {
    async fn complete(&self, _prompt: &str) -> Result<String, ResponderError> {
        tokio::time::sleep(self.delay).await;
        Ok("too late".to_string())
    }
}
