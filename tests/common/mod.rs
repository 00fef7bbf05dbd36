//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::Duration;

use session_replay::Actor;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(1000)
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

/// Actor with a color derived from the id
pub fn actor(id: &str) -> Actor {
    let color = match id.len() % 3 {
        0 => "#ff0066",
        1 => "#00aa88",
        _ => "#4f46e5",
    };
    Actor::new(id, format!("User {}", id), color)
}
