//! Installation
//!
//! Wires the rate holder, both interceptors and the optional keep-in-time
//! loop together once at startup, then swaps the interceptors into an
//! environment's slots. A slot that is missing or refuses replacement keeps
//! its original primitive; the failure is logged and reported in
//! [`InstallStatus`], never returned as an error.
//!
//! Timers are only intercepted when the environment also has a clock, since
//! re-arming measures elapsed time on the same time base the timers run on.

use crate::control::{RateController, RatePrompt};
use crate::frames::FrameBridge;
use crate::keep_in_time::KeepInTime;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use timewarp_clock::ScaledClock;
use timewarp_core::{
    ClockHost, Environment, RateHolder, Result, TimerHost, TimewarpConfig, TimewarpError,
};
use timewarp_timers::TimerInterceptor;
use tracing::{info, warn};

/// Outcome of installing one interceptor
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookState {
    /// Interceptor is installed and receiving rate changes
    Active,
    /// Original primitive left in place
    Fallback(String),
}

impl HookState {
    pub fn is_active(&self) -> bool {
        matches!(self, HookState::Active)
    }

    fn from_error(err: &TimewarpError) -> Self {
        HookState::Fallback(err.to_string())
    }
}

impl fmt::Display for HookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookState::Active => write!(f, "active"),
            HookState::Fallback(reason) => write!(f, "fallback ({})", reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallStatus {
    pub timers: HookState,
    pub clock: HookState,
}

/// Builder for [`Timewarp`]
#[derive(Default)]
pub struct TimewarpBuilder {
    config: TimewarpConfig,
    prompt: Option<RatePrompt>,
    frames: bool,
}

impl TimewarpBuilder {
    pub fn config(mut self, config: TimewarpConfig) -> Self {
        self.config = config;
        self
    }

    /// Prompt asked by the custom-rate command
    pub fn prompt(mut self, prompt: RatePrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Create a [`FrameBridge`] that forwards rate changes to child frames
    pub fn frames(mut self) -> Self {
        self.frames = true;
        self
    }

    /// Wire everything and install into `env`.
    ///
    /// Fails only on invalid configuration.
    pub fn install(self, env: &dyn Environment) -> Result<Timewarp> {
        let config = self.config;
        config.validate()?;

        let holder = Rc::new(RateHolder::new());
        let real_clock = env.clock();
        let original_timers = env.timers();

        let (clock, clock_state) = install_clock(env, &holder, real_clock.clone());
        let (timers, timers_state) =
            install_timers(env, &holder, original_timers.clone(), real_clock);

        let keep_in_time = match (&original_timers, config.kept_in_time) {
            (Some(originals), true) => Some(KeepInTime::start(
                &holder,
                originals.clone(),
                Duration::from_millis(config.kept_interval_ms),
            )),
            _ => None,
        };

        let controller = Rc::new(RateController::new(holder.clone(), &config));
        if let Some(prompt) = self.prompt {
            controller.set_prompt(prompt);
        }

        let frames = self.frames.then(|| {
            let bridge = Rc::new(FrameBridge::new(controller.clone()));
            holder.subscribe(bridge.clone());
            bridge
        });

        controller.set_speed(config.default_rate);

        let status = InstallStatus {
            timers: timers_state,
            clock: clock_state,
        };
        info!(
            "Timewarp installed at rate {} (timers: {}, clock: {})",
            holder.rate(),
            status.timers,
            status.clock
        );

        Ok(Timewarp {
            config,
            holder,
            controller,
            clock,
            timers,
            original_timers,
            keep_in_time,
            frames,
            status,
        })
    }
}

fn install_clock(
    env: &dyn Environment,
    holder: &RateHolder,
    real_clock: Option<Rc<dyn ClockHost>>,
) -> (Option<Rc<ScaledClock>>, HookState) {
    let Some(real_clock) = real_clock else {
        let err = TimewarpError::PrimitiveMissing("clock");
        warn!("Clock not intercepted: {}", err);
        return (None, HookState::from_error(&err));
    };

    let clock = Rc::new(ScaledClock::new(real_clock, holder.rate()));
    match env.install_clock(clock.clone()) {
        Ok(()) => {
            holder.subscribe(clock.clone());
            (Some(clock), HookState::Active)
        }
        Err(err) => {
            warn!("Clock not intercepted, keeping original: {}", err);
            (None, HookState::from_error(&err))
        }
    }
}

fn install_timers(
    env: &dyn Environment,
    holder: &RateHolder,
    original_timers: Option<Rc<dyn TimerHost>>,
    real_clock: Option<Rc<dyn ClockHost>>,
) -> (Option<Rc<TimerInterceptor>>, HookState) {
    let Some(originals) = original_timers else {
        let err = TimewarpError::PrimitiveMissing("timers");
        warn!("Timers not intercepted: {}", err);
        return (None, HookState::from_error(&err));
    };
    let Some(real_clock) = real_clock else {
        let err = TimewarpError::PrimitiveMissing("clock");
        warn!("Timers not intercepted, no clock to measure elapsed time: {}", err);
        return (None, HookState::from_error(&err));
    };

    let timers = TimerInterceptor::new(originals, real_clock, holder.rate());
    match env.install_timers(timers.clone()) {
        Ok(()) => {
            holder.subscribe(timers.clone());
            (Some(timers), HookState::Active)
        }
        Err(err) => {
            warn!("Timers not intercepted, keeping originals: {}", err);
            (None, HookState::from_error(&err))
        }
    }
}

/// An installed rate-scaling layer
pub struct Timewarp {
    config: TimewarpConfig,
    holder: Rc<RateHolder>,
    controller: Rc<RateController>,
    clock: Option<Rc<ScaledClock>>,
    timers: Option<Rc<TimerInterceptor>>,
    original_timers: Option<Rc<dyn TimerHost>>,
    keep_in_time: Option<KeepInTime>,
    frames: Option<Rc<FrameBridge>>,
    status: InstallStatus,
}

impl Timewarp {
    pub fn builder() -> TimewarpBuilder {
        TimewarpBuilder::default()
    }

    /// Install with the default configuration
    pub fn install(env: &dyn Environment) -> Result<Self> {
        Self::builder().install(env)
    }

    pub fn rate(&self) -> f64 {
        self.holder.rate()
    }

    /// Change the rate; invalid values are ignored
    pub fn set_rate(&self, rate: f64) -> bool {
        self.holder.set_rate(rate)
    }

    pub fn holder(&self) -> &Rc<RateHolder> {
        &self.holder
    }

    pub fn controller(&self) -> &Rc<RateController> {
        &self.controller
    }

    pub fn clock(&self) -> Option<&Rc<ScaledClock>> {
        self.clock.as_ref()
    }

    pub fn timers(&self) -> Option<&Rc<TimerInterceptor>> {
        self.timers.as_ref()
    }

    /// The primitives that were in place before installation
    pub fn original_timers(&self) -> Option<&Rc<dyn TimerHost>> {
        self.original_timers.as_ref()
    }

    pub fn keep_in_time(&self) -> Option<&KeepInTime> {
        self.keep_in_time.as_ref()
    }

    /// Bridge to child frames, if enabled on the builder
    pub fn frames(&self) -> Option<&Rc<FrameBridge>> {
        self.frames.as_ref()
    }

    /// Handle a message from the parent frame. Returns whether the rate changed.
    pub fn receive_frame_message(&self, raw: &str) -> bool {
        match &self.frames {
            Some(bridge) => bridge.receive(raw),
            None => false,
        }
    }

    pub fn status(&self) -> &InstallStatus {
        &self.status
    }

    pub fn config(&self) -> &TimewarpConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use crate::globals::Globals;

    #[test]
    fn test_install_into_loop_globals() {
        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);

        let warp = Timewarp::install(&globals).unwrap();

        assert!(warp.status().timers.is_active());
        assert!(warp.status().clock.is_active());
        assert_eq!(warp.rate(), 1.0);
        assert_eq!(warp.holder().listener_count(), 2);
        assert!(warp.keep_in_time().is_none());
    }

    #[test]
    fn test_default_rate_applied() {
        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);
        let config = TimewarpConfig {
            default_rate: 2.0,
            ..Default::default()
        };

        let warp = Timewarp::builder().config(config).install(&globals).unwrap();

        assert_eq!(warp.rate(), 2.0);
        assert_eq!(warp.timers().unwrap().rate(), 2.0);
        assert_eq!(warp.clock().unwrap().rate(), 2.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);
        let config = TimewarpConfig {
            default_rate: -1.0,
            ..Default::default()
        };

        assert!(Timewarp::builder().config(config).install(&globals).is_err());
    }

    #[test]
    fn test_locked_timer_slot_falls_back() {
        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);
        globals.lock_timers();

        let warp = Timewarp::install(&globals).unwrap();

        assert!(matches!(warp.status().timers, HookState::Fallback(_)));
        assert!(warp.status().clock.is_active());
        assert!(warp.timers().is_none());
        assert_eq!(warp.holder().listener_count(), 1);
    }

    #[test]
    fn test_missing_primitives_fall_back() {
        let globals = Globals::new(None, None);
        let warp = Timewarp::install(&globals).unwrap();

        assert!(!warp.status().timers.is_active());
        assert!(!warp.status().clock.is_active());
        assert!(warp.set_rate(3.0));
        assert_eq!(warp.rate(), 3.0);
    }

    #[test]
    fn test_keep_in_time_enabled() {
        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);
        let config = TimewarpConfig {
            kept_in_time: true,
            kept_interval_ms: 500,
            ..Default::default()
        };

        let warp = Timewarp::builder().config(config).install(&globals).unwrap();
        let keeper = warp.keep_in_time().unwrap();

        assert!(keeper.is_running());
        assert_eq!(keeper.interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_timers_without_clock_not_intercepted() {
        let lp = EventLoop::manual();
        let globals = Globals::new(Some(lp.timer_host()), None);

        let warp = Timewarp::install(&globals).unwrap();

        assert!(matches!(warp.status().timers, HookState::Fallback(_)));
        assert!(warp.timers().is_none());
        assert_eq!(warp.holder().listener_count(), 0);

        // The slot still holds the original, unscaled loop timers
        warp.set_rate(4.0);
        let fired = Rc::new(std::cell::Cell::new(false));
        let probe = fired.clone();
        globals
            .set_timeout(move || probe.set(true), Duration::from_millis(100))
            .unwrap();
        lp.advance(Duration::from_millis(50));
        assert!(!fired.get());
        lp.advance(Duration::from_millis(50));
        assert!(fired.get());
    }

    #[test]
    fn test_builder_prompt_reaches_controller() {
        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);

        let warp = Timewarp::builder()
            .prompt(Box::new(|_| Some("6".to_string())))
            .install(&globals)
            .unwrap();

        assert!(warp.controller().has_prompt());
        assert!(warp.controller().custom());
        assert_eq!(warp.rate(), 6.0);
    }

    #[test]
    fn test_frames_wired_when_enabled() {
        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);

        let plain = Timewarp::install(&globals).unwrap();
        assert!(plain.frames().is_none());
        assert!(!plain.receive_frame_message(r#"{"type":"hook_timer__change_rate","rate":2}"#));

        let lp = EventLoop::manual();
        let globals = Globals::for_loop(&lp);
        let warp = Timewarp::builder().frames().install(&globals).unwrap();
        assert!(warp.frames().is_some());
        assert!(warp.receive_frame_message(r#"{"type":"hook_timer__change_rate","rate":2}"#));
        assert_eq!(warp.rate(), 2.0);
    }
}

