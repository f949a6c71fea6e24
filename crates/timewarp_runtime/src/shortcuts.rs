//! Keyboard shortcut mapping
//!
//! Shortcut expressions look like `"ctrl + Equal"`: any number of modifier
//! names followed by a key code, joined with `+`. A key press matches when the
//! code is equal and every named modifier is held. A press runs every binding
//! it matches, in binding order.

use crate::control::{RateCommand, RateController};
use smallvec::SmallVec;
use std::fmt;
use std::ops::BitOr;
use timewarp_core::{Result, ShortcutConfig, TimewarpError, DEFAULT_RATE};
use tracing::debug;

/// Set of held modifier keys
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const SHIFT: Modifiers = Modifiers(1);
    pub const CTRL: Modifiers = Modifiers(1 << 1);
    pub const ALT: Modifiers = Modifiers(1 << 2);
    pub const META: Modifiers = Modifiers(1 << 3);

    /// Display order and expression names
    const NAMED: [(Modifiers, &'static str); 4] = [
        (Modifiers::CTRL, "ctrl"),
        (Modifiers::META, "meta"),
        (Modifiers::ALT, "alt"),
        (Modifiers::SHIFT, "shift"),
    ];

    /// Every key in `required` is also held here
    pub const fn contains(self, required: Modifiers) -> bool {
        self.0 & required.0 == required.0
    }

    fn from_name(name: &str) -> Option<Modifiers> {
        match name.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifiers::CTRL),
            "meta" | "cmd" => Some(Modifiers::META),
            "alt" | "option" => Some(Modifiers::ALT),
            "shift" => Some(Modifiers::SHIFT),
            _ => None,
        }
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

/// A key press as reported by the environment (`code` as in `"Digit0"`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPress {
    pub code: String,
    pub modifiers: Modifiers,
}

impl KeyPress {
    pub fn new(code: impl Into<String>, modifiers: Modifiers) -> Self {
        Self {
            code: code.into(),
            modifiers,
        }
    }
}

/// A parsed shortcut expression
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyChord {
    code: String,
    modifiers: Modifiers,
}

impl KeyChord {
    /// Parse `"ctrl + Equal"`-style expressions
    pub fn parse(expression: &str) -> Result<Self> {
        let mut parts: Vec<&str> = expression
            .split('+')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        let code = parts.pop().ok_or_else(|| {
            TimewarpError::Config(format!("empty shortcut expression {:?}", expression))
        })?;

        let mut modifiers = Modifiers::NONE;
        for name in parts {
            let flag = Modifiers::from_name(name).ok_or_else(|| {
                TimewarpError::Config(format!(
                    "unknown modifier {:?} in shortcut {:?}",
                    name, expression
                ))
            })?;
            modifiers = modifiers | flag;
        }

        Ok(Self {
            code: code.to_string(),
            modifiers,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn matches(&self, press: &KeyPress) -> bool {
        press.code == self.code && press.modifiers.contains(self.modifiers)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in Modifiers::NAMED {
            if self.modifiers.contains(flag) {
                write!(f, "{} + ", name)?;
            }
        }
        write!(f, "{}", self.code)
    }
}

/// Chords bound to one command
#[derive(Clone, Debug)]
pub struct Binding {
    pub command: RateCommand,
    pub chords: SmallVec<[KeyChord; 4]>,
}

impl Binding {
    fn matches(&self, press: &KeyPress) -> bool {
        self.chords.iter().any(|chord| chord.matches(press))
    }
}

/// Ordered shortcut bindings
#[derive(Clone, Debug, Default)]
pub struct ShortcutMap {
    bindings: Vec<Binding>,
}

impl ShortcutMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings from configured expressions.
    ///
    /// The reset shortcut returns to real time, not the configured default.
    pub fn from_config(config: &ShortcutConfig) -> Result<Self> {
        let mut map = Self::new();
        map.bind_all(RateCommand::SpeedUp(None), &config.speed_up)?;
        map.bind_all(RateCommand::SpeedDown(None), &config.speed_down)?;
        map.bind_all(RateCommand::Multiply(None), &config.multiply)?;
        map.bind_all(RateCommand::Divide(None), &config.divide)?;
        map.bind_all(RateCommand::Set(DEFAULT_RATE), &config.reset)?;
        map.bind_all(RateCommand::Custom, &config.custom)?;
        Ok(map)
    }

    /// Bind every expression in `expressions` to `command`
    pub fn bind_all(&mut self, command: RateCommand, expressions: &[String]) -> Result<()> {
        let chords = expressions
            .iter()
            .map(|expression| KeyChord::parse(expression))
            .collect::<Result<SmallVec<[KeyChord; 4]>>>()?;
        self.bindings.push(Binding { command, chords });
        Ok(())
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Commands bound to `press`, in binding order
    pub fn lookup(&self, press: &KeyPress) -> SmallVec<[RateCommand; 2]> {
        self.bindings
            .iter()
            .filter(|binding| binding.matches(press))
            .map(|binding| binding.command)
            .collect()
    }

    /// Run every bound command. Returns true if the press was consumed.
    pub fn handle(&self, press: &KeyPress, controller: &RateController) -> bool {
        let commands = self.lookup(press);
        for command in &commands {
            debug!("Shortcut {} -> {}", press.code, command);
            controller.apply(*command);
        }
        !commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use timewarp_core::{RateHolder, TimewarpConfig};

    fn first(map: &ShortcutMap, code: &str, modifiers: Modifiers) -> Option<RateCommand> {
        map.lookup(&KeyPress::new(code, modifiers)).first().copied()
    }

    #[test]
    fn test_parse_chord() {
        let chord = KeyChord::parse("ctrl + Equal").unwrap();
        assert_eq!(chord.code(), "Equal");
        assert!(chord.modifiers().contains(Modifiers::CTRL));
        assert!(!chord.modifiers().contains(Modifiers::ALT));

        let chord = KeyChord::parse("  Shift+ALT +KeyR ").unwrap();
        assert_eq!(chord.code(), "KeyR");
        assert_eq!(chord.modifiers(), Modifiers::SHIFT | Modifiers::ALT);
        assert_eq!(chord.to_string(), "alt + shift + KeyR");
    }

    #[test]
    fn test_parse_errors() {
        assert!(KeyChord::parse("").is_err());
        assert!(KeyChord::parse(" + ").is_err());
        assert!(KeyChord::parse("hyper + K").is_err());
    }

    #[test]
    fn test_match_requires_named_modifiers() {
        let chord = KeyChord::parse("ctrl + Digit0").unwrap();

        assert!(chord.matches(&KeyPress::new("Digit0", Modifiers::CTRL)));
        // Extra modifiers are fine
        assert!(chord.matches(&KeyPress::new("Digit0", Modifiers::CTRL | Modifiers::SHIFT)));
        assert!(!chord.matches(&KeyPress::new("Digit0", Modifiers::NONE)));
        assert!(!chord.matches(&KeyPress::new("Digit1", Modifiers::CTRL)));
    }

    #[test]
    fn test_default_bindings() {
        let map = ShortcutMap::from_config(&ShortcutConfig::default()).unwrap();

        assert_eq!(
            first(&map, "Equal", Modifiers::CTRL),
            Some(RateCommand::SpeedUp(None))
        );
        assert_eq!(
            first(&map, "Comma", Modifiers::META),
            Some(RateCommand::SpeedDown(None))
        );
        assert_eq!(
            first(&map, "Period", Modifiers::ALT),
            Some(RateCommand::Multiply(None))
        );
        assert_eq!(
            first(&map, "Minus", Modifiers::ALT),
            Some(RateCommand::Divide(None))
        );
        assert_eq!(
            first(&map, "Digit0", Modifiers::ALT),
            Some(RateCommand::Set(DEFAULT_RATE))
        );
        assert_eq!(
            first(&map, "Digit9", Modifiers::CTRL),
            Some(RateCommand::Custom)
        );
        assert!(map.lookup(&KeyPress::new("Equal", Modifiers::NONE)).is_empty());
    }

    #[test]
    fn test_press_runs_every_matching_binding() {
        let map = ShortcutMap::from_config(&ShortcutConfig::default()).unwrap();
        let controller = RateController::new(Rc::new(RateHolder::new()), &TimewarpConfig::default());

        // ctrl + alt + Equal is both "+" and "*": (1 + 2) * 2
        let press = KeyPress::new("Equal", Modifiers::CTRL | Modifiers::ALT);
        assert_eq!(
            map.lookup(&press).as_slice(),
            &[RateCommand::SpeedUp(None), RateCommand::Multiply(None)]
        );
        assert!(map.handle(&press, &controller));
        assert_eq!(controller.rate(), 6.0);
    }

    #[test]
    fn test_reset_shortcut_returns_to_real_time() {
        let map = ShortcutMap::from_config(&ShortcutConfig::default()).unwrap();
        let config = TimewarpConfig {
            default_rate: 2.0,
            ..Default::default()
        };
        let controller = RateController::new(Rc::new(RateHolder::new()), &config);

        controller.set_speed(5.0);
        assert!(map.handle(&KeyPress::new("Digit0", Modifiers::CTRL), &controller));
        assert_eq!(controller.rate(), 1.0);
    }

    #[test]
    fn test_bad_config_expression() {
        let config = ShortcutConfig {
            reset: vec!["super + Digit0".to_string()],
            ..Default::default()
        };
        assert!(ShortcutMap::from_config(&config).is_err());
    }
}
