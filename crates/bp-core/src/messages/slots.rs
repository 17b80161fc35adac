//! Cached incoming messages of one variable.
//!
//! Each slot moves `Unset → Computing → Ready → Invalidated → Unset`.
//! A failed fetch returns the slot to `Unset`.

use bp_common::{Error, Result};
use serde::Serialize;

use crate::distribution::Distribution;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SlotState {
    Unset,
    Computing,
    Ready(Distribution),
    Invalidated,
}

impl SlotState {
    pub fn name(&self) -> &'static str {
        match self {
            SlotState::Unset => "unset",
            SlotState::Computing => "computing",
            SlotState::Ready(_) => "ready",
            SlotState::Invalidated => "invalidated",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageSlot {
    label: String,
    state: SlotState,
}

impl MessageSlot {
    pub fn new(label: impl Into<String>) -> Self {
        MessageSlot {
            label: label.into(),
            state: SlotState::Unset,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    /// The cached message, if ready.
    pub fn value(&self) -> Option<&Distribution> {
        match &self.state {
            SlotState::Ready(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SlotState::Ready(_))
    }

    /// Marks a fetch in progress. Only an unset slot can start one.
    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            SlotState::Unset => {
                self.state = SlotState::Computing;
                Ok(())
            }
            _ => Err(self.refuse("begin")),
        }
    }

    pub fn complete(&mut self, message: Distribution) -> Result<()> {
        match self.state {
            SlotState::Computing => {
                self.state = SlotState::Ready(message);
                Ok(())
            }
            _ => Err(self.refuse("complete")),
        }
    }

    /// Drops an in-progress fetch after a failure.
    pub fn abandon(&mut self) {
        if matches!(self.state, SlotState::Computing) {
            self.state = SlotState::Unset;
        }
    }

    /// Returns `true` when a message that may have been handed on was
    /// dropped, so downstream holders need to hear about it.
    pub fn invalidate(&mut self) -> bool {
        match self.state {
            SlotState::Ready(_) | SlotState::Computing => {
                self.state = SlotState::Invalidated;
                true
            }
            SlotState::Unset | SlotState::Invalidated => false,
        }
    }

    pub fn reset(&mut self) {
        self.state = SlotState::Unset;
    }

    /// Installs a message supplied from outside, skipping the fetch.
    pub fn preset(&mut self, message: Distribution) {
        self.state = SlotState::Ready(message);
    }

    fn refuse(&self, action: &'static str) -> Error {
        Error::SlotState {
            slot: self.label.clone(),
            action,
            state: self.state.name(),
        }
    }
}

/// Pi slots indexed by parent, lambda slots indexed by child.
#[derive(Debug, Clone, Serialize)]
pub struct MessageSet {
    pi: Vec<MessageSlot>,
    lambda: Vec<MessageSlot>,
}

impl MessageSet {
    pub fn new(parents: usize, children: usize) -> Self {
        MessageSet {
            pi: (0..parents)
                .map(|i| MessageSlot::new(format!("pi[{i}]")))
                .collect(),
            lambda: (0..children)
                .map(|i| MessageSlot::new(format!("lambda[{i}]")))
                .collect(),
        }
    }

    pub fn parents(&self) -> usize {
        self.pi.len()
    }

    pub fn children(&self) -> usize {
        self.lambda.len()
    }

    pub fn pi(&self, parent: usize) -> Result<&MessageSlot> {
        self.pi.get(parent).ok_or_else(|| out_of_range("parent", parent, self.pi.len()))
    }

    pub fn lambda(&self, child: usize) -> Result<&MessageSlot> {
        self.lambda
            .get(child)
            .ok_or_else(|| out_of_range("child", child, self.lambda.len()))
    }

    pub fn pi_mut(&mut self, parent: usize) -> Result<&mut MessageSlot> {
        let len = self.pi.len();
        self.pi
            .get_mut(parent)
            .ok_or_else(|| out_of_range("parent", parent, len))
    }

    pub fn lambda_mut(&mut self, child: usize) -> Result<&mut MessageSlot> {
        let len = self.lambda.len();
        self.lambda
            .get_mut(child)
            .ok_or_else(|| out_of_range("child", child, len))
    }

    pub fn pi_slots(&self) -> &[MessageSlot] {
        &self.pi
    }

    pub fn lambda_slots(&self) -> &[MessageSlot] {
        &self.lambda
    }

    pub fn reset_all(&mut self) {
        self.pi.iter_mut().chain(self.lambda.iter_mut()).for_each(MessageSlot::reset);
    }
}

fn out_of_range(what: &str, index: usize, len: usize) -> Error {
    Error::invalid(format!("{what} {index} out of range for {len} slots"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let mut slot = MessageSlot::new("pi[0]");
        assert_eq!(slot.state().name(), "unset");
        slot.begin().unwrap();
        assert_eq!(slot.state().name(), "computing");
        slot.complete(Distribution::Noninformative).unwrap();
        assert_eq!(slot.value(), Some(&Distribution::Noninformative));
        assert!(slot.invalidate());
        assert_eq!(slot.state().name(), "invalidated");
        assert!(!slot.invalidate());
        slot.reset();
        assert_eq!(slot.state(), &SlotState::Unset);
    }

    #[test]
    fn illegal_transitions_are_reported() {
        let mut slot = MessageSlot::new("lambda[2]");
        let err = slot.complete(Distribution::Noninformative).unwrap_err();
        assert!(matches!(
            err,
            Error::SlotState { ref slot, action: "complete", state: "unset" } if slot == "lambda[2]"
        ));

        slot.begin().unwrap();
        assert!(slot.begin().is_err());

        slot.invalidate();
        assert!(matches!(
            slot.begin(),
            Err(Error::SlotState { state: "invalidated", .. })
        ));
    }

    #[test]
    fn abandon_only_affects_pending_fetches() {
        let mut slot = MessageSlot::new("pi[1]");
        slot.preset(Distribution::Noninformative);
        slot.abandon();
        assert!(slot.is_ready());

        slot.reset();
        slot.begin().unwrap();
        slot.abandon();
        assert_eq!(slot.state(), &SlotState::Unset);
    }

    #[test]
    fn set_indexes_parents_and_children() {
        let mut set = MessageSet::new(2, 1);
        assert_eq!(set.parents(), 2);
        assert_eq!(set.children(), 1);
        assert_eq!(set.pi(1).unwrap().label(), "pi[1]");
        assert!(set.lambda(1).is_err());

        set.pi_mut(0).unwrap().preset(Distribution::Noninformative);
        set.reset_all();
        assert!(set.pi_slots().iter().all(|s| !s.is_ready()));
    }
}
