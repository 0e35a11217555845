//! Enrichment step: one raw article in, one structured record out.
//!
//! [`ArticleEnricher::extract`] normalizes the markup, then loops over the
//! provider gate until a call succeeds. Every failure (no ready provider,
//! exhausted low-level retries, transport errors) parks the caller in
//! [`ProviderGate::await_next_ready`] before the next attempt.
//!
//! How long the loop keeps going is a [`RetryPolicy`]. The unbounded policy
//! never returns an error; bounded policies surface [`EnrichError`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::models::EnrichmentResult;
use crate::normalize::normalize_content;
use crate::provider::ProviderGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Total attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Wall-clock budget for one document. `None` has no deadline.
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.as_option(),
            deadline: config.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.deadline.is_none()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnrichError {
    #[error("enrichment gave up after {attempts} attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },
    #[error("enrichment deadline of {deadline:?} exceeded after {attempts} attempts")]
    DeadlineExceeded { deadline: Duration, attempts: u32 },
}

pub struct ArticleEnricher {
    gate: Arc<dyn ProviderGate>,
    policy: RetryPolicy,
    llm_max_retries: u32,
}

impl ArticleEnricher {
    pub fn new(gate: Arc<dyn ProviderGate>, policy: RetryPolicy, llm_max_retries: u32) -> Self {
        Self {
            gate,
            policy,
            llm_max_retries,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Enrich one article. With the unbounded policy this only returns `Ok`.
    pub async fn extract(&self, raw: &str) -> Result<EnrichmentResult, EnrichError> {
        let text = normalize_content(raw);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let last_error = match self.gate.provide() {
                Ok(handle) => {
                    let call_started = Instant::now();
                    match handle.extract(&text, self.llm_max_retries).await {
                        Ok(record) => {
                            tracing::info!(
                                "Extracted using {} LLM in {:.1}s",
                                handle.model_name(),
                                call_started.elapsed().as_secs_f64()
                            );
                            return Ok(EnrichmentResult {
                                record,
                                model_name: handle.model_name().to_string(),
                            });
                        }
                        Err(e) => {
                            tracing::warn!(
                                model = %handle.model_name(),
                                attempt = attempts,
                                "Error extracting from LLM: {}",
                                e
                            );
                            e.to_string()
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(attempt = attempts, "{}", e);
                    e.to_string()
                }
            };

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    return Err(EnrichError::AttemptsExhausted {
                        attempts,
                        last_error,
                    });
                }
            }

            self.gate.await_next_ready().await;

            if let Some(deadline) = self.policy.deadline {
                if started.elapsed() >= deadline {
                    return Err(EnrichError::DeadlineExceeded { deadline, attempts });
                }
            }
        }
    }
}
