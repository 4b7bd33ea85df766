//! Process-wide reconciliation state: the startup gate, override context,
//! and last-cycle-result bookkeeping.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome status of a completed reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// The cycle ran to completion without error.
    Success,
    /// The cycle failed; `ReconciliationResult::error` carries details.
    Failed,
}

/// The recorded outcome of the most recent reconciliation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Whether the cycle succeeded or failed.
    pub status: CycleStatus,
    /// Error description, present when `status == Failed`.
    pub error: Option<String>,
    /// Which caller triggered the cycle (`"startup"` or `"periodic"`).
    pub mode: String,
    /// When the cycle completed.
    pub timestamp: DateTime<Utc>,
}

/// Context recorded when an operator forces the startup gate open ahead
/// of a successful cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideContext {
    /// Operator identifier.
    pub user_id: String,
    /// Operator-supplied justification.
    pub reason: String,
    /// When the override was recorded.
    pub timestamp: DateTime<Utc>,
    /// The reconciliation result on file at the time of the override.
    pub last_result: ReconciliationResult,
}

/// Raised when a forced startup bypass is requested without the
/// prerequisites the invariant requires.
#[derive(Debug, Error)]
pub enum InvalidBypassError {
    /// No reconciliation cycle has ever completed, so there is no
    /// `LastResult` to attach to the override.
    #[error("cannot force startup bypass: no reconciliation result on file")]
    NoPriorResult,
    /// The operator identifier was empty.
    #[error("cannot force startup bypass: user_id is required")]
    MissingUserId,
    /// The justification was empty.
    #[error("cannot force startup bypass: reason is required")]
    MissingReason,
}

#[derive(Debug, Default)]
struct Inner {
    startup_started_at: Option<DateTime<Utc>>,
    startup_complete: bool,
    last_result: Option<ReconciliationResult>,
    override_context: Option<OverrideContext>,
    cancelled: bool,
}

/// Process-scoped singleton tracking startup-gate and cycle-result state.
///
/// Every accessor takes `&self`; interior mutability is a single mutex
/// guarding all fields together so a caller never observes a torn update
/// (e.g. `startup_complete` flipped without a matching `last_result`).
#[derive(Debug, Default)]
pub struct ReconciliationState {
    inner: Mutex<Inner>,
}

impl ReconciliationState {
    /// Create a new, un-started state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the startup sequence has begun.
    pub fn mark_startup_started(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().expect("reconciliation state poisoned");
        if inner.startup_started_at.is_none() {
            inner.startup_started_at = Some(now);
        }
    }

    /// True once at least one successful cycle has completed, or a forced
    /// bypass has been recorded.
    #[must_use]
    pub fn is_startup_complete(&self) -> bool {
        self.inner.lock().expect("reconciliation state poisoned").startup_complete
    }

    /// Seconds elapsed since startup began, or `0.0` if it hasn't.
    #[must_use]
    pub fn startup_elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        let inner = self.inner.lock().expect("reconciliation state poisoned");
        inner
            .startup_started_at
            .map_or(0.0, |started| (now - started).num_milliseconds() as f64 / 1000.0)
    }

    /// True once `now - StartupStartedAt` exceeds `timeout_seconds`.
    #[must_use]
    pub fn startup_timed_out(&self, now: DateTime<Utc>, timeout_seconds: f64) -> bool {
        self.startup_elapsed_seconds(now) > timeout_seconds
    }

    /// Open the startup gate. When `forced` is false this simply flips
    /// the flag (called after a successful cycle). When `forced` is true,
    /// a prior `LastResult`, a non-empty `user_id`, and a non-empty
    /// `reason` are all required; on success the override context is
    /// recorded alongside the flag flip.
    pub fn mark_startup_complete(
        &self,
        forced: bool,
        user_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidBypassError> {
        let mut inner = self.inner.lock().expect("reconciliation state poisoned");
        if !forced {
            inner.startup_complete = true;
            return Ok(());
        }
        let last_result = inner
            .last_result
            .clone()
            .ok_or(InvalidBypassError::NoPriorResult)?;
        if user_id.is_empty() {
            return Err(InvalidBypassError::MissingUserId);
        }
        if reason.is_empty() {
            return Err(InvalidBypassError::MissingReason);
        }
        inner.override_context = Some(OverrideContext {
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            timestamp: now,
            last_result,
        });
        inner.startup_complete = true;
        Ok(())
    }

    /// True if the startup gate was opened via a forced bypass rather
    /// than a successful cycle.
    #[must_use]
    pub fn override_active(&self) -> bool {
        self.inner.lock().expect("reconciliation state poisoned").override_context.is_some()
    }

    /// The recorded override context, if any.
    #[must_use]
    pub fn override_context(&self) -> Option<OverrideContext> {
        self.inner.lock().expect("reconciliation state poisoned").override_context.clone()
    }

    /// Memoize a cycle's result for startup-bypass eligibility and
    /// observability.
    pub fn record_reconciliation_result(&self, result: ReconciliationResult) {
        self.inner.lock().expect("reconciliation state poisoned").last_result = Some(result);
    }

    /// The most recently recorded cycle result, if any.
    #[must_use]
    pub fn last_result(&self) -> Option<ReconciliationResult> {
        self.inner.lock().expect("reconciliation state poisoned").last_result.clone()
    }

    /// Idempotently signal cancellation to the periodic loop.
    pub fn stop(&self) {
        self.inner.lock().expect("reconciliation state poisoned").cancelled = true;
    }

    /// True once `stop` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().expect("reconciliation state poisoned").cancelled
    }
}
