//! API call quotas and payload ceilings
//!
//! Every metered call draws from two token buckets: a 15 minute and a 24 hour
//! window, chosen by category (read or write) and by whether the caller is in
//! the foreground. Buckets refill linearly and are capped at their maximum.
//!
//! ```text
//! available = min(max, remaining + elapsed_ms * max / window_ms)
//! ```
//!
//! A call is admitted only if both buckets can pay for it, and then both are
//! charged under the caller's lock.

mod clock;
mod error;
mod limiter;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{
    CallerId, Quota, QuotaBucket, QuotaCategory, RateLimiter, RateLimiterState,
    DEFAULT_API_CALL_COST,
};
