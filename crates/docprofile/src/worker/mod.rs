pub mod inflight;
pub mod limiter;

pub use inflight::{ExecutionClaim, InFlightRegistry};
pub use limiter::{ConcurrencyLimiter, PoolSlot};
