use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::asset::LedgerTimestamp;

/// Process-wide ledger clock with strictly increasing microsecond output.
pub struct LedgerClock {
    /// Last emitted time in microseconds.
    last_time_us: u64,
}

impl LedgerClock {
    /// Current ledger time in microseconds.
    ///
    /// Never returns the same value twice, even if the system clock stalls or
    /// steps backwards.
    pub fn now_us() -> u64 {
        let mut clock = LEDGER_CLOCK.lock();
        let system_now_us = system_time_us();

        let target = if system_now_us <= clock.last_time_us {
            clock.last_time_us.saturating_add(1)
        } else {
            system_now_us
        };

        clock.last_time_us = target;
        target
    }
}

fn system_time_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

static LEDGER_CLOCK: Lazy<Mutex<LedgerClock>> = Lazy::new(|| {
    Mutex::new(LedgerClock {
        last_time_us: system_time_us(),
    })
});

/// Convenience function to get current ledger time in microseconds
pub fn ledger_time_now() -> u64 {
    LedgerClock::now_us()
}

/// Current ledger time as a commit timestamp.
pub fn ledger_timestamp_now() -> LedgerTimestamp {
    LedgerTimestamp::from_micros(ledger_time_now())
}
