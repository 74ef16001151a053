//! Clock abstraction
//!
//! Expiry decisions (correlations, reservations) read time through [`Clock`]
//! so tests can drive it deterministically.

use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Default clock for production wiring
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
