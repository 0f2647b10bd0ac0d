//! Per-adapter circuit breaker guarding against repeatedly retrying a
//! consistently failing adapter.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub success_threshold: u32,
    pub failure_window: Duration,
}

impl CircuitBreakerConfig {
    /// Trips fast, recovers slowly: for adapters behind flaky external
    /// services.
    pub fn sensitive() -> Self {
        Self {
            failure_threshold: 2,
            open_timeout: Duration::from_secs(30),
            success_threshold: 2,
            failure_window: Duration::from_secs(60),
        }
    }

    /// Tolerates more transient noise before tripping.
    pub fn resilient() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(10),
            success_threshold: 1,
            failure_window: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

struct AdapterCircuit {
    state: CircuitState,
    failures: Vec<Instant>,
    successes_in_half_open: u32,
    opened_at: Option<Instant>,
}

impl AdapterCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: Vec::new(),
            successes_in_half_open: 0,
            opened_at: None,
        }
    }
}

/// Tracks adapter-call outcomes and denies calls while the circuit is open,
/// independent of the FSM's own iteration-budget accounting.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: Mutex<HashMap<String, AdapterCircuit>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call to `adapter_id` may proceed right now.
    pub fn allow_call(&self, adapter_id: &str) -> bool {
        let mut circuits = self.circuits.lock().expect("circuit breaker mutex poisoned");
        let circuit = circuits.entry(adapter_id.to_string()).or_insert_with(AdapterCircuit::new);
        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = circuit.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.open_timeout {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.successes_in_half_open = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, adapter_id: &str) {
        let mut circuits = self.circuits.lock().expect("circuit breaker mutex poisoned");
        let circuit = circuits.entry(adapter_id.to_string()).or_insert_with(AdapterCircuit::new);
        match circuit.state {
            CircuitState::HalfOpen => {
                circuit.successes_in_half_open += 1;
                if circuit.successes_in_half_open >= self.config.success_threshold {
                    circuit.state = CircuitState::Closed;
                    circuit.failures.clear();
                }
            }
            CircuitState::Closed => {
                circuit.failures.clear();
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, adapter_id: &str) {
        let mut circuits = self.circuits.lock().expect("circuit breaker mutex poisoned");
        let circuit = circuits.entry(adapter_id.to_string()).or_insert_with(AdapterCircuit::new);
        let now = Instant::now();
        circuit.failures.retain(|t| now.duration_since(*t) <= self.config.failure_window);
        circuit.failures.push(now);
        if circuit.state == CircuitState::HalfOpen || circuit.failures.len() as u32 >= self.config.failure_threshold {
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(now);
        }
    }

    pub fn state(&self, adapter_id: &str) -> CircuitState {
        let mut circuits = self.circuits.lock().expect("circuit breaker mutex poisoned");
        circuits.entry(adapter_id.to_string()).or_insert_with(AdapterCircuit::new).state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::sensitive());
        breaker.record_failure("a1");
        assert_eq!(breaker.state("a1"), CircuitState::Closed);
        breaker.record_failure("a1");
        assert_eq!(breaker.state("a1"), CircuitState::Open);
        assert!(!breaker.allow_call("a1"));
    }

    #[test]
    fn success_in_closed_state_resets_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::sensitive());
        breaker.record_failure("a2");
        breaker.record_success("a2");
        breaker.record_failure("a2");
        assert_eq!(breaker.state("a2"), CircuitState::Closed);
    }
}
