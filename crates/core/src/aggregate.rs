//! Document state machines.
//!
//! Reservations, adjustments, transfers and the journal ledger are all
//! aggregates: a command is checked against current state and turned into
//! events, and the events alone move the state forward. Stock and cost side
//! effects of a decision belong to the service holding the transaction.

use crate::error::DomainError;

pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far; equal to the length of the document's
    /// audit stream once saved.
    fn version(&self) -> u64;
}

/// Stream version a writer expects to find when it commits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    /// The version `doc` had before its last `pending` events were applied.
    pub fn before<A: AggregateRoot>(doc: &A, pending: usize) -> Self {
        Self::Exact(doc.version().saturating_sub(pending as u64))
    }

    pub fn matches(self, actual: u64) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(v) => v == actual,
        }
    }
}

pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug + From<DomainError>;

    /// Must bump `version()` by one.
    fn apply(&mut self, event: &Self::Event);

    /// Pure decision; never mutates.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// `handle` then `apply` each resulting event.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Counter {
        version: u64,
        total: u32,
    }

    impl AggregateRoot for Counter {
        type Id = ();

        fn id(&self) -> &() {
            &()
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    impl Aggregate for Counter {
        type Command = u32;
        type Event = u32;
        type Error = DomainError;

        fn apply(&mut self, event: &u32) {
            self.total += event;
            self.version += 1;
        }

        fn handle(&self, command: &u32) -> Result<Vec<u32>, DomainError> {
            if *command == 0 {
                return Err(DomainError::validation("nothing to count"));
            }
            Ok(vec![*command, *command])
        }
    }

    #[test]
    fn execute_applies_every_decided_event() {
        let mut c = Counter::default();
        let events = c.execute(&3).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!((c.total, c.version()), (6, 2));
        assert_eq!(ExpectedVersion::before(&c, events.len()), ExpectedVersion::Exact(0));
    }

    #[test]
    fn rejected_command_leaves_state_alone() {
        let mut c = Counter::default();
        assert!(c.execute(&0).is_err());
        assert_eq!(c.version(), 0);
        assert!(ExpectedVersion::Any.matches(7));
        assert!(!ExpectedVersion::Exact(1).matches(2));
    }
}
