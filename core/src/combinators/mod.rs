//! Concurrency/control combinators: each is itself a `Handler` that
//! schedules one or more sub-handlers.

mod util;

pub mod branch;
pub mod chain;
pub mod fallback;
pub mod parallel;
pub mod rate_limit;
pub mod retry;
pub mod timeout;
pub mod transform;

pub use branch::Branch;
pub use chain::Chain;
pub use fallback::Fallback;
pub use parallel::Parallel;
pub use rate_limit::RateLimit;
pub use retry::{Backoff, Retry};
pub use timeout::Timeout;
pub use transform::Transform;
