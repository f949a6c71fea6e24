//! Cross-frame rate propagation
//!
//! A frame forwards every rate change to its child frames as a JSON message,
//! and adopts rates received from its parent. Messages of other types share
//! the same channel and are ignored.

use crate::control::RateController;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use timewarp_core::{RateChange, RateListener};
use tracing::{debug, warn};

/// Message type tag for rate changes
pub const RATE_MESSAGE_TYPE: &str = "hook_timer__change_rate";

/// Wire form: `{"type":"hook_timer__change_rate","rate":2.0}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

impl RateMessage {
    pub fn new(rate: f64) -> Self {
        Self {
            kind: RATE_MESSAGE_TYPE.to_string(),
            rate: Some(rate),
        }
    }
}

/// Somewhere a frame can post messages to
pub trait FramePort {
    fn post_message(&self, message: &str);
}

/// In-process port that queues messages until they are taken
#[derive(Clone, Default)]
pub struct Mailbox {
    queue: Rc<RefCell<VecDeque<String>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_messages(&self) -> Vec<String> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

impl FramePort for Mailbox {
    fn post_message(&self, message: &str) {
        self.queue.borrow_mut().push_back(message.to_string());
    }
}

/// Connects one frame's rate to its parent and children
pub struct FrameBridge {
    controller: Rc<RateController>,
    children: RefCell<Vec<Rc<dyn FramePort>>>,
}

impl FrameBridge {
    pub fn new(controller: Rc<RateController>) -> Self {
        Self {
            controller,
            children: RefCell::new(Vec::new()),
        }
    }

    /// Forward future rate changes to `port`
    pub fn add_child(&self, port: Rc<dyn FramePort>) {
        self.children.borrow_mut().push(port);
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    /// Handle a message from the parent frame.
    ///
    /// A missing or zero rate selects the default rate. Returns whether the
    /// rate changed.
    pub fn receive(&self, raw: &str) -> bool {
        let message: RateMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(err) => {
                debug!("Ignoring unparseable frame message: {}", err);
                return false;
            }
        };

        if message.kind != RATE_MESSAGE_TYPE {
            return false;
        }
        self.controller.set_speed(message.rate.unwrap_or(0.0))
    }

    /// Send `rate` to every child frame
    pub fn broadcast(&self, rate: f64) {
        let message = match serde_json::to_string(&RateMessage::new(rate)) {
            Ok(message) => message,
            Err(err) => {
                warn!("Failed to encode rate message: {}", err);
                return;
            }
        };

        let children: Vec<Rc<dyn FramePort>> = self.children.borrow().clone();
        for child in children {
            child.post_message(&message);
        }
    }
}

impl RateListener for FrameBridge {
    fn on_rate_change(&self, change: RateChange) {
        self.broadcast(change.current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timewarp_core::{RateHolder, TimewarpConfig};

    fn bridge() -> (Rc<RateHolder>, Rc<FrameBridge>) {
        let holder = Rc::new(RateHolder::new());
        let controller = Rc::new(RateController::new(
            holder.clone(),
            &TimewarpConfig::default(),
        ));
        let bridge = Rc::new(FrameBridge::new(controller));
        holder.subscribe(bridge.clone());
        (holder, bridge)
    }

    #[test]
    fn test_message_format() {
        let json = serde_json::to_string(&RateMessage::new(2.5)).unwrap();
        assert_eq!(json, r#"{"type":"hook_timer__change_rate","rate":2.5}"#);
    }

    #[test]
    fn test_broadcast_to_children() {
        let (holder, bridge) = bridge();
        let a = Mailbox::new();
        let b = Mailbox::new();
        bridge.add_child(Rc::new(a.clone()));
        bridge.add_child(Rc::new(b.clone()));

        holder.set_rate(4.0);

        let messages = a.take_messages();
        assert_eq!(messages.len(), 1);
        let message: RateMessage = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(message, RateMessage::new(4.0));
        assert_eq!(b.len(), 1);
        assert!(a.is_empty());
    }

    #[test]
    fn test_receive_sets_rate() {
        let (holder, bridge) = bridge();

        assert!(bridge.receive(r#"{"type":"hook_timer__change_rate","rate":3}"#));
        assert_eq!(holder.rate(), 3.0);

        // Missing rate means default
        assert!(bridge.receive(r#"{"type":"hook_timer__change_rate"}"#));
        assert_eq!(holder.rate(), 1.0);
    }

    #[test]
    fn test_receive_ignores_other_messages() {
        let (holder, bridge) = bridge();

        assert!(!bridge.receive(r#"{"type":"something_else","rate":3}"#));
        assert!(!bridge.receive(r#"{"rate":3}"#));
        assert!(!bridge.receive("not json"));
        assert!(!bridge.receive(r#"{"type":"hook_timer__change_rate","rate":-2}"#));
        assert_eq!(holder.rate(), 1.0);
    }

    #[test]
    fn test_parent_to_child_chain() {
        let (parent, parent_bridge) = bridge();
        let (child, child_bridge) = bridge();
        let port = Mailbox::new();
        parent_bridge.add_child(Rc::new(port.clone()));

        parent.set_rate(0.5);
        for message in port.take_messages() {
            child_bridge.receive(&message);
        }

        assert_eq!(child.rate(), 0.5);
    }
}
