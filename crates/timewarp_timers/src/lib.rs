//! Timewarp Timers
//!
//! Rate-scaled one-shot and repeating timers.
//!
//! # Features
//!
//! - **Scaled delays**: requested delays are divided by the current rate
//! - **Live re-arming**: pending timers are re-armed on every rate change
//! - **Stable ids**: callers may cancel by the id they were given or by the
//!   underlying handle currently armed
//! - **Drop-in**: the interceptor implements [`timewarp_core::TimerHost`]

mod interceptor;
mod pending;

pub use interceptor::TimerInterceptor;
pub use pending::{PendingInfo, TimerKind};
