//! Rate-limited provider gate.
//!
//! A [`ProviderGate`] hands out [`LlmHandle`]s, each bound to one model and
//! credential, while keeping every credential under its requests-per-minute
//! quota. Callers that get [`GateError::NoneReady`] park in
//! [`ProviderGate::await_next_ready`] and try again.
//!
//! [`RoundRobinGate`] is the production gate: one `governor` limiter per
//! credential, walked round-robin, plus a small reservation queue so a
//! permit won while waiting is not lost to another caller's `check()`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{ProviderConfig, RetryConfig};
use crate::models::ExtractedRecord;
use crate::openai::OpenAiClient;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Failure modes of a single structured-extraction call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing API key: environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed structured output: {0}")]
    Malformed(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// A client bound to one model variant and one credential.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier, stored with every record as provenance.
    fn model_name(&self) -> &str;

    /// Run structured extraction over `text`, retrying malformed output and
    /// transient failures up to `max_retries` times within the call.
    async fn extract(&self, text: &str, max_retries: u32) -> Result<ExtractedRecord, LlmError>;
}

pub type LlmHandle = Arc<dyn LlmClient>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("no provider is ready")]
    NoneReady,
}

/// Source of rate-limited LLM handles, shared by concurrent callers.
#[async_trait]
pub trait ProviderGate: Send + Sync {
    /// A ready handle, without blocking, or [`GateError::NoneReady`].
    fn provide(&self) -> Result<LlmHandle, GateError>;

    /// Suspend until another handle may be used. Once this returns, at least
    /// one following [`provide`](ProviderGate::provide) succeeds.
    async fn await_next_ready(&self);
}

struct Slot {
    client: LlmHandle,
    limiter: DirectLimiter,
}

pub struct RoundRobinGate {
    slots: Vec<Slot>,
    cursor: AtomicUsize,
    reserved: Mutex<VecDeque<usize>>,
    cooldown: Duration,
}

impl RoundRobinGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            slots: Vec::new(),
            cursor: AtomicUsize::new(0),
            reserved: Mutex::new(VecDeque::new()),
            cooldown,
        }
    }

    /// Register a credential with its own requests-per-minute quota.
    pub fn with_client(mut self, client: LlmHandle, requests_per_minute: u32) -> Result<Self> {
        let rpm = NonZeroU32::new(requests_per_minute)
            .ok_or_else(|| anyhow!("{}: requests_per_minute must be > 0", client.model_name()))?;
        self.slots.push(Slot {
            client,
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
        });
        Ok(self)
    }

    /// One OpenAI-compatible client per configured provider.
    pub fn from_config(providers: &[ProviderConfig], retry: &RetryConfig) -> Result<Self> {
        if providers.is_empty() {
            anyhow::bail!("No [[providers]] configured");
        }

        let mut gate = Self::new(retry.cooldown());
        for provider in providers {
            let client = OpenAiClient::from_config(provider)?;
            tracing::info!(
                provider = %provider.name,
                model = %provider.model,
                rpm = provider.requests_per_minute,
                "registered provider"
            );
            gate = gate.with_client(Arc::new(client), provider.requests_per_minute)?;
        }
        Ok(gate)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl ProviderGate for RoundRobinGate {
    fn provide(&self) -> Result<LlmHandle, GateError> {
        if let Some(idx) = self.reserved.lock().unwrap().pop_front() {
            return Ok(self.slots[idx].client.clone());
        }

        let n = self.slots.len();
        if n == 0 {
            return Err(GateError::NoneReady);
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
        for offset in 0..n {
            let slot = &self.slots[(start + offset) % n];
            if slot.limiter.check().is_ok() {
                return Ok(slot.client.clone());
            }
        }
        Err(GateError::NoneReady)
    }

    async fn await_next_ready(&self) {
        tokio::time::sleep(self.cooldown).await;

        if self.slots.is_empty() {
            return;
        }

        // `until_ready` consumes the cell it waits for; keep it for the next provide().
        let waits = self
            .slots
            .iter()
            .map(|slot| Box::pin(slot.limiter.until_ready()));
        let (_, idx, _) = futures::future::select_all(waits).await;
        self.reserved.lock().unwrap().push_back(idx);
    }
}
