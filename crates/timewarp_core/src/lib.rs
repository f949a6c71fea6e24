//! Timewarp Core
//!
//! Foundational pieces shared by the timer and clock interceptors:
//!
//! - **Rate State**: the single playback-rate multiplier and its listeners
//! - **Host Primitives**: traits for the environment's timers and clock
//! - **Configuration**: step sizes, default rate, keep-in-time, shortcuts
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use timewarp_core::{RateChange, RateHolder};
//!
//! let holder = RateHolder::new();
//! holder.subscribe(Rc::new(|change: RateChange| {
//!     println!("{} -> {}", change.previous, change.current);
//! }));
//!
//! assert!(holder.set_rate(2.0));
//! assert!(!holder.set_rate(-1.0));
//! assert_eq!(holder.rate(), 2.0);
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod rate;
pub mod scale;

pub use config::{ConfigProvider, ShortcutConfig, TimewarpConfig};
pub use error::{Result, TimewarpError};
pub use host::{ClockHost, Environment, TimerCallback, TimerHandle, TimerHost};
pub use rate::{is_valid_rate, ListenerId, RateChange, RateHolder, RateListener, DEFAULT_RATE};
pub use scale::{delay_at_rate, scale_duration};
