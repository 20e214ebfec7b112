//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use mock_helpers::ScriptedService;
use probescope::telemetry::LoopbackConnector;
use probescope::{ConsoleConfig, ConsoleEvent, Orchestrator};
use std::sync::Arc;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// A console wired to a scripted probe service and a loopback socket
pub struct TestConsole {
    pub console: Arc<Orchestrator>,
    pub service: Arc<ScriptedService>,
    pub sockets: LoopbackConnector,
}

impl TestConsole {
    pub fn new(service: ScriptedService) -> Self {
        Self::with_config(ConsoleConfig::default(), service)
    }

    pub fn with_config(config: ConsoleConfig, service: ScriptedService) -> Self {
        let service = Arc::new(service);
        let sockets = LoopbackConnector::new();
        let console = Arc::new(Orchestrator::new(
            config,
            service.clone(),
            Arc::new(sockets.clone()),
        ));
        Self {
            console,
            service,
            sockets,
        }
    }
}

/// Whether any queued event matches `predicate`
pub fn saw(events: &[ConsoleEvent], predicate: impl Fn(&ConsoleEvent) -> bool) -> bool {
    events.iter().any(predicate)
}
