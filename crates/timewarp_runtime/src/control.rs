//! Rate controller
//!
//! Turns trigger commands (toolbar buttons, shortcuts, prompts) into calls to
//! [`RateHolder::set_rate`]. Step sizes come from the configuration.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use timewarp_core::{RateHolder, TimewarpConfig};
use tracing::debug;

/// Something a trigger asks the controller to do
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateCommand {
    /// Adopt this rate; `0.0` means the default rate
    Set(f64),
    /// Back to the default rate
    Reset,
    /// Add a step (configured increment if `None`)
    SpeedUp(Option<f64>),
    /// Subtract a step (configured decrement if `None`)
    SpeedDown(Option<f64>),
    /// Multiply by a factor (configured factor if `None`)
    Multiply(Option<f64>),
    /// Divide by a factor (configured factor if `None`)
    Divide(Option<f64>),
    /// Ask the prompt for a rate
    Custom,
}

impl fmt::Display for RateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateCommand::Set(rate) => write!(f, "set {}", rate),
            RateCommand::Reset => write!(f, "reset"),
            RateCommand::SpeedUp(_) => write!(f, "+"),
            RateCommand::SpeedDown(_) => write!(f, "-"),
            RateCommand::Multiply(_) => write!(f, "*"),
            RateCommand::Divide(_) => write!(f, "/"),
            RateCommand::Custom => write!(f, "custom"),
        }
    }
}

/// Asks the user for a rate, given the current one. `None` means cancelled.
pub type RatePrompt = Box<dyn Fn(f64) -> Option<String>>;

#[derive(Clone, Copy, Debug)]
struct Steps {
    increment: f64,
    decrement: f64,
    multiply: f64,
    divide: f64,
    default_rate: f64,
}

/// Applies [`RateCommand`]s to a rate holder
pub struct RateController {
    holder: Rc<RateHolder>,
    steps: Steps,
    prompt: RefCell<Option<RatePrompt>>,
}

impl RateController {
    pub fn new(holder: Rc<RateHolder>, config: &TimewarpConfig) -> Self {
        Self {
            holder,
            steps: Steps {
                increment: config.increment_rate,
                decrement: config.decrement_rate,
                multiply: config.multiply_rate,
                divide: config.divide_rate,
                default_rate: config.default_rate,
            },
            prompt: RefCell::new(None),
        }
    }

    /// Use `prompt` for [`RateCommand::Custom`]
    pub fn with_prompt(self, prompt: RatePrompt) -> Self {
        self.set_prompt(prompt);
        self
    }

    /// Replace the prompt on a shared controller
    pub fn set_prompt(&self, prompt: RatePrompt) {
        *self.prompt.borrow_mut() = Some(prompt);
    }

    pub fn has_prompt(&self) -> bool {
        self.prompt.borrow().is_some()
    }

    pub fn rate(&self) -> f64 {
        self.holder.rate()
    }

    pub fn default_rate(&self) -> f64 {
        self.steps.default_rate
    }

    /// Apply a command. Returns whether the rate changed.
    pub fn apply(&self, command: RateCommand) -> bool {
        debug!("Rate command: {}", command);
        match command {
            RateCommand::Set(rate) => self.set_speed(rate),
            RateCommand::Reset => self.reset(),
            RateCommand::SpeedUp(step) => self.speed_up(step),
            RateCommand::SpeedDown(step) => self.speed_down(step),
            RateCommand::Multiply(factor) => self.speed_multiply(factor),
            RateCommand::Divide(factor) => self.speed_divide(factor),
            RateCommand::Custom => self.custom(),
        }
    }

    /// Adopt `rate`; zero selects the default rate
    pub fn set_speed(&self, rate: f64) -> bool {
        let rate = if rate == 0.0 {
            self.steps.default_rate
        } else {
            rate
        };
        self.holder.set_rate(rate)
    }

    pub fn reset(&self) -> bool {
        self.holder.set_rate(self.steps.default_rate)
    }

    pub fn speed_up(&self, step: Option<f64>) -> bool {
        let step = step.unwrap_or(self.steps.increment);
        self.set_speed(self.rate() + step)
    }

    pub fn speed_down(&self, step: Option<f64>) -> bool {
        let step = step.unwrap_or(self.steps.decrement);
        self.set_speed(self.rate() - step)
    }

    pub fn speed_multiply(&self, factor: Option<f64>) -> bool {
        let factor = non_zero(factor.unwrap_or(self.steps.multiply));
        self.set_speed(self.rate() * factor)
    }

    pub fn speed_divide(&self, factor: Option<f64>) -> bool {
        let factor = non_zero(factor.unwrap_or(self.steps.divide));
        self.set_speed(self.rate() / factor)
    }

    /// Ask the prompt for a rate and adopt it
    pub fn custom(&self) -> bool {
        // Released before the rate changes so listeners may replace the prompt
        let answer = {
            let prompt = self.prompt.borrow();
            let Some(prompt) = prompt.as_ref() else {
                debug!("No rate prompt configured");
                return false;
            };
            prompt(self.rate())
        };
        let Some(answer) = answer else {
            return false;
        };

        match answer.trim().parse::<f64>() {
            Ok(rate) => self.set_speed(rate),
            Err(err) => {
                debug!("Ignoring prompt answer {:?}: {}", answer, err);
                false
            }
        }
    }
}

/// A zero factor leaves the rate alone
fn non_zero(factor: f64) -> f64 {
    if factor == 0.0 {
        1.0
    } else {
        factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(config: TimewarpConfig) -> RateController {
        RateController::new(Rc::new(RateHolder::new()), &config)
    }

    #[test]
    fn test_default_steps() {
        let c = controller(TimewarpConfig::default());

        assert!(c.apply(RateCommand::SpeedUp(None)));
        assert_eq!(c.rate(), 3.0);
        assert!(c.apply(RateCommand::Multiply(None)));
        assert_eq!(c.rate(), 6.0);
        assert!(c.apply(RateCommand::Divide(None)));
        assert_eq!(c.rate(), 3.0);
        assert!(c.apply(RateCommand::SpeedDown(None)));
        assert_eq!(c.rate(), 1.0);
    }

    #[test]
    fn test_speed_down_below_zero_rejected() {
        let c = controller(TimewarpConfig::default());
        assert!(!c.apply(RateCommand::SpeedDown(None)));
        assert_eq!(c.rate(), 1.0);
    }

    #[test]
    fn test_set_zero_means_default() {
        let config = TimewarpConfig {
            default_rate: 1.5,
            ..Default::default()
        };
        let c = controller(config);

        c.apply(RateCommand::Set(4.0));
        assert!(c.apply(RateCommand::Set(0.0)));
        assert_eq!(c.rate(), 1.5);

        c.apply(RateCommand::Set(4.0));
        assert!(c.apply(RateCommand::Reset));
        assert_eq!(c.rate(), 1.5);
    }

    #[test]
    fn test_explicit_steps_and_zero_factor() {
        let c = controller(TimewarpConfig::default());

        c.apply(RateCommand::SpeedUp(Some(0.5)));
        assert_eq!(c.rate(), 1.5);
        assert!(!c.apply(RateCommand::Multiply(Some(0.0))));
        assert_eq!(c.rate(), 1.5);
        c.apply(RateCommand::Divide(Some(3.0)));
        assert_eq!(c.rate(), 0.5);
    }

    #[test]
    fn test_custom_prompt() {
        let c = controller(TimewarpConfig::default())
            .with_prompt(Box::new(|current| Some(format!("{}", current * 8.0))));
        assert!(c.apply(RateCommand::Custom));
        assert_eq!(c.rate(), 8.0);

        let c = controller(TimewarpConfig::default()).with_prompt(Box::new(|_| Some("fast".into())));
        assert!(!c.apply(RateCommand::Custom));

        let c = controller(TimewarpConfig::default()).with_prompt(Box::new(|_| None));
        assert!(!c.apply(RateCommand::Custom));

        let c = controller(TimewarpConfig::default());
        assert!(!c.apply(RateCommand::Custom));
        assert_eq!(c.rate(), 1.0);
    }

    #[test]
    fn test_prompt_set_on_shared_controller() {
        let c = Rc::new(controller(TimewarpConfig::default()));
        assert!(!c.has_prompt());

        c.set_prompt(Box::new(|_| Some("3".into())));
        assert!(c.has_prompt());
        assert!(c.apply(RateCommand::Custom));
        assert_eq!(c.rate(), 3.0);
    }
}
