use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// Runtime circuit state for one resource group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// When false every breaker lets all calls through and records nothing.
    pub enabled: bool,
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_started_at: Option<Instant>,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_started_at: None,
        }
    }
}

/// Point-in-time view of a breaker for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Milliseconds since the breaker last opened, while open or half open.
    pub open_for_ms: Option<u64>,
}

/// Thread-safe circuit breaker guarding calls for one resource group.
#[derive(Debug)]
pub struct CircuitBreaker {
    group: String,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(group: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            group: group.into(),
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Asks for permission to make one call.
    ///
    /// In `open`, the first call after `reset_timeout` becomes the probe and
    /// moves the breaker to `half_open`. Only one probe may be in flight; a
    /// probe that never reported back is replaced after another `reset_timeout`.
    pub fn allow_request(&self) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let can_probe = inner
                    .opened_at
                    .map(|opened_at| now.duration_since(opened_at) >= self.config.reset_timeout)
                    .unwrap_or(true);

                if can_probe {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_started_at = Some(now);
                    info!(group = %self.group, "circuit half open, allowing probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                let probe_abandoned = inner
                    .probe_started_at
                    .map(|started| now.duration_since(started) >= self.config.reset_timeout)
                    .unwrap_or(true);

                if probe_abandoned {
                    inner.probe_started_at = Some(now);
                }
                probe_abandoned
            }
        }
    }

    pub fn record_success(&self) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(group = %self.group, "circuit closed after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_started_at = None;
    }

    pub fn record_failure(&self) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let should_open = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if should_open {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.probe_started_at = None;
            warn!(
                group = %self.group,
                consecutive_failures = inner.consecutive_failures,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "circuit opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_for_ms: inner
                .opened_at
                .map(|opened_at| opened_at.elapsed().as_millis().min(u128::from(u64::MAX)) as u64),
        }
    }
}

/// One breaker per resource group, created on first use.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    pub fn breaker(&self, group: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(group.to_owned())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(group, self.config)))
            .clone()
    }

    /// Breaker snapshots sorted by group name.
    pub fn snapshot(&self) -> BTreeMap<String, CircuitSnapshot> {
        let breakers = self.breakers.lock();
        breakers
            .iter()
            .map(|(group, breaker)| (group.clone(), breaker.snapshot()))
            .collect()
    }
}
