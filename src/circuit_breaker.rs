//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for external processing
//! services (Tesseract OCR and the OpenAI API). It prevents cascading failures
//! by temporarily stopping requests when a service fails repeatedly.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::ocr_config::RecoveryConfig;

/// Circuit breaker for external service calls
///
/// Implements the circuit breaker pattern to prevent cascading failures.
/// The breaker protects the bot by temporarily rejecting requests when a
/// downstream service (OCR engine, OpenAI API) fails repeatedly, giving
/// it time to recover.
///
/// ## State Machine
///
/// ```text
/// CLOSED ────failures ≥ threshold────► OPEN
///    ▲                                      │
///    │                                      │
///    └─────────reset timeout───────────────┘
/// ```
///
/// - **CLOSED → OPEN**: when the failure count reaches `circuit_breaker_threshold`
/// - **OPEN → CLOSED**: after `circuit_breaker_reset_secs` elapses since the
///   last failure, counters are reset and the next request tests recovery
///
/// ## Thread Safety
///
/// All state mutations use `Mutex<T>`:
/// - `failure_count`: consecutive failure counter
/// - `last_failure_time`: timestamp of the most recent failure
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_count: Mutex<u32>,
    last_failure_time: Mutex<Option<Instant>>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            failure_count: Mutex::new(0),
            last_failure_time: Mutex::new(None),
            config,
        }
    }

    /// Check if the circuit breaker is open (blocking requests)
    ///
    /// Returns `true` when the failure count has reached the threshold and the
    /// reset timeout has not yet elapsed. Once the timeout elapses the counters
    /// are reset automatically and requests flow again.
    pub fn is_open(&self) -> bool {
        let failure_count = *self
            .failure_count
            .lock()
            .expect("Failed to acquire failure count lock");
        let last_failure = *self
            .last_failure_time
            .lock()
            .expect("Failed to acquire last failure time lock");

        if failure_count >= self.config.circuit_breaker_threshold {
            if let Some(last_time) = last_failure {
                let elapsed = last_time.elapsed();
                if elapsed < Duration::from_secs(self.config.circuit_breaker_reset_secs) {
                    return true; // Circuit is still open
                }
                // Reset circuit breaker
                *self
                    .failure_count
                    .lock()
                    .expect("Failed to acquire failure count lock") = 0;
                *self
                    .last_failure_time
                    .lock()
                    .expect("Failed to acquire last failure time lock") = None;
            }
        }
        false
    }

    /// Record a failure to increment the failure counter
    ///
    /// Should be called whenever a protected operation fails.
    /// Updates failure count and last failure timestamp.
    pub fn record_failure(&self) {
        *self
            .failure_count
            .lock()
            .expect("Failed to acquire failure count lock") += 1;
        *self
            .last_failure_time
            .lock()
            .expect("Failed to acquire last failure time lock") = Some(Instant::now());
    }

    /// Record a success to reset the failure counter
    ///
    /// Should be called whenever a protected operation succeeds.
    /// Resets failure count and clears last failure timestamp.
    pub fn record_success(&self) {
        *self
            .failure_count
            .lock()
            .expect("Failed to acquire failure count lock") = 0;
        *self
            .last_failure_time
            .lock()
            .expect("Failed to acquire last failure time lock") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_reset_config() -> RecoveryConfig {
        RecoveryConfig {
            circuit_breaker_threshold: 2,
            circuit_breaker_reset_secs: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new(quick_reset_config());
        assert!(!breaker.is_open());

        breaker.record_failure();
        assert!(!breaker.is_open());

        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_resets_failures() {
        let breaker = CircuitBreaker::new(quick_reset_config());
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }
}
