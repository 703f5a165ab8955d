//! Resource lifecycle state and dependency counters

use serde::Serialize;
use std::fmt;

/// Lifecycle state of a resource
///
/// Legal transitions: EMPTY→READY, EMPTY→FAILURE, READY→EMPTY, FAILURE→EMPTY.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ResourceState {
    /// Not loaded, or waiting on its own data or a dependency
    Empty = 0,
    /// Data and every dependency are loaded
    Ready = 1,
    /// The resource or one of its dependencies failed
    Failure = 2,
}

impl ResourceState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ready,
            2 => Self::Failure,
            _ => Self::Empty,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Ready => "ready",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed change to a resource's dependency counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Delta {
    pub(crate) empty: i32,
    pub(crate) failed: i32,
}

impl Delta {
    const fn new(empty: i32, failed: i32) -> Self {
        Self { empty, failed }
    }

    /// A dependency (or the resource's own data) finished loading
    pub(crate) const RESOLVED: Delta = Delta::new(-1, 0);
    /// A dependency (or the resource's own data) failed to load
    pub(crate) const FAILED: Delta = Delta::new(-1, 1);

    /// Contribution of a freshly attached dependency in `state`
    pub(crate) fn attach(state: ResourceState) -> Self {
        match state {
            ResourceState::Empty => Delta::new(1, 0),
            ResourceState::Ready => Delta::default(),
            ResourceState::Failure => Delta::new(0, 1),
        }
    }

    /// Change seen by a parent when a dependency moves from `old` to `new`
    pub(crate) fn transition(old: ResourceState, new: ResourceState) -> Self {
        Self::attach(new).minus(Self::attach(old))
    }

    fn minus(self, other: Self) -> Self {
        Delta {
            empty: self.empty - other.empty,
            failed: self.failed - other.failed,
        }
    }

    pub(crate) fn is_zero(&self) -> bool {
        self.empty == 0 && self.failed == 0
    }
}

/// Outstanding empty and failed dependencies of a resource
///
/// The resource's own pending read counts as one empty dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DependencyCounters {
    pub(crate) empty: u16,
    pub(crate) failed: u16,
}

impl DependencyCounters {
    /// Counters of a resource whose own data is not loaded yet
    pub(crate) const PENDING: Self = Self {
        empty: 1,
        failed: 0,
    };

    pub(crate) fn apply(&mut self, delta: Delta) {
        self.empty = adjust(self.empty, delta.empty, "empty");
        self.failed = adjust(self.failed, delta.failed, "failed");
    }

    /// State the counters call for, given the current state and whether the
    /// resource is referenced
    pub(crate) fn target(&self, current: ResourceState, referenced: bool) -> ResourceState {
        if self.failed > 0 {
            ResourceState::Failure
        } else if self.empty > 0 {
            ResourceState::Empty
        } else if referenced {
            ResourceState::Ready
        } else {
            current
        }
    }
}

fn adjust(value: u16, delta: i32, name: &str) -> u16 {
    let next = i32::from(value) + delta;
    assert!(
        (0..=i32::from(u16::MAX)).contains(&next),
        "{name} dependency count out of range: {value} + {delta}"
    );
    next as u16
}

/// Transitions taking `from` to `to`, routed through EMPTY when the direct
/// edge is not legal
pub(crate) fn transitions(
    from: ResourceState,
    to: ResourceState,
) -> Vec<(ResourceState, ResourceState)> {
    match (from, to) {
        _ if from == to => Vec::new(),
        (ResourceState::Ready, ResourceState::Failure)
        | (ResourceState::Failure, ResourceState::Ready) => {
            vec![(from, ResourceState::Empty), (ResourceState::Empty, to)]
        }
        _ => vec![(from, to)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceState::*;

    #[test]
    fn test_transition_deltas() {
        assert_eq!(Delta::transition(Empty, Ready), Delta::RESOLVED);
        assert_eq!(Delta::transition(Empty, Failure), Delta::FAILED);
        assert_eq!(Delta::transition(Ready, Empty), Delta::new(1, 0));
        assert_eq!(Delta::transition(Failure, Empty), Delta::new(1, -1));
    }

    #[test]
    fn test_target_state() {
        let mut counters = DependencyCounters::PENDING;
        assert_eq!(counters.target(Empty, true), Empty);

        counters.apply(Delta::RESOLVED);
        assert_eq!(counters.target(Empty, true), Ready);
        // Unreferenced resources never become ready
        assert_eq!(counters.target(Empty, false), Empty);

        counters.apply(Delta::new(0, 1));
        assert_eq!(counters.target(Ready, true), Failure);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_counter_underflow_panics() {
        let mut counters = DependencyCounters {
            empty: 0,
            failed: 0,
        };
        counters.apply(Delta::RESOLVED);
    }

    #[test]
    fn test_ready_to_failure_goes_through_empty() {
        assert_eq!(transitions(Ready, Failure), vec![(Ready, Empty), (Empty, Failure)]);
        assert_eq!(transitions(Empty, Ready), vec![(Empty, Ready)]);
        assert!(transitions(Ready, Ready).is_empty());
    }

    #[test]
    fn test_state_roundtrip_u8() {
        for state in [Empty, Ready, Failure] {
            assert_eq!(ResourceState::from_u8(state as u8), state);
        }
        assert_eq!(Failure.to_string(), "failure");
    }
}
