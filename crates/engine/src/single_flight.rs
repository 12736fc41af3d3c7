//! Non-blocking single-flight guard for sync entry points.

use std::sync::atomic::{AtomicBool, Ordering};

/// At most one in-flight execution; concurrent callers are dropped, never
/// queued. Never blocks the scheduling path.
#[derive(Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

/// Held while an operation runs; releases on drop, including on panic or
/// early return.
pub struct SingleFlightPermit<'a> {
    busy: &'a AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to become the in-flight execution. `None` means another caller
    /// holds the guard and this one should no-op.
    pub fn try_acquire(&self) -> Option<SingleFlightPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SingleFlightPermit { busy: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for SingleFlightPermit<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_dropped_until_release() {
        let flight = SingleFlight::new();
        let permit = flight.try_acquire().expect("first acquire");
        assert!(flight.try_acquire().is_none());
        assert!(flight.is_busy());
        drop(permit);
        assert!(flight.try_acquire().is_some());
    }
}
