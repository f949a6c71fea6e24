//! Timewarp Runtime
//!
//! Everything around the interceptors:
//!
//! - **Event Loop**: a single-threaded host on a real or manual clock
//! - **Globals**: replaceable timer and clock slots application code reads from
//! - **Install**: wires the rate holder and interceptors and installs them
//! - **Triggers**: rate commands, keyboard shortcuts, cross-frame messages
//! - **Keep-in-time**: periodic re-application of the current rate
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use timewarp_runtime::{EventLoop, Globals, Timewarp};
//!
//! let event_loop = EventLoop::manual();
//! let globals = Globals::for_loop(&event_loop);
//! let warp = Timewarp::install(&globals).unwrap();
//!
//! warp.set_rate(4.0);
//! globals
//!     .set_timeout(|| println!("fired"), Duration::from_millis(1000))
//!     .unwrap();
//!
//! // A 1000ms timer at 4x takes 250ms of real time
//! assert_eq!(event_loop.advance(Duration::from_millis(250)), 1);
//! ```

pub mod control;
pub mod event_loop;
pub mod frames;
pub mod globals;
pub mod install;
pub mod keep_in_time;
pub mod shortcuts;

pub use control::{RateCommand, RateController, RatePrompt};
pub use event_loop::{EventLoop, MonotonicClock, DEFAULT_MIN_DELAY};
pub use frames::{FrameBridge, FramePort, Mailbox, RateMessage, RATE_MESSAGE_TYPE};
pub use globals::Globals;
pub use install::{HookState, InstallStatus, Timewarp, TimewarpBuilder};
pub use keep_in_time::KeepInTime;
pub use shortcuts::{KeyChord, KeyPress, Modifiers, ShortcutMap};
