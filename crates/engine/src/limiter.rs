//! Token-bucket admission control.
//!
//! Gates how often a caller may issue engine commands. The bucket refills
//! lazily from elapsed wall time and [`TokenBucket::take`] never blocks —
//! a `false` is surfaced to the caller, who decides whether to retry after
//! a delay. Engine internals (flush, compaction) are not gated.

use std::time::Instant;

/// Lazily refilled token bucket.
pub struct TokenBucket {
    capacity: u64,
    /// Tokens added per second.
    rate: u64,
    tokens: u64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    #[must_use]
    pub fn new(capacity: u64, rate: u64) -> Self {
        Self {
            capacity,
            rate,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Consumes one token if available. Never blocks.
    pub fn take(&mut self) -> bool {
        self.refill();
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed();
        let earned = elapsed.as_secs() * self.rate;
        if earned > 0 {
            self.tokens = (self.tokens + earned).min(self.capacity);
            // Advance by the whole seconds actually credited, keeping the
            // fractional remainder earning toward the next token.
            self.last_refill += std::time::Duration::from_secs(elapsed.as_secs());
        }
    }
}
