//! Round-robin event-set multiplexing
//!
//! The PMU only has four programmable counters, so the sampler time-shares
//! them across several event sets. [`EventSetRotator`] decides which set is
//! programmed for the next interval.

use super::mode::EventSetMode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rotation policy needs at least one event-set mode")]
pub struct EmptyPolicyError;

/// Ordered list of modes visited in turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    modes: Vec<EventSetMode>,
}

impl RotationPolicy {
    /// # Errors
    /// Returns [`EmptyPolicyError`] when `modes` is empty
    pub fn new(modes: Vec<EventSetMode>) -> Result<Self, EmptyPolicyError> {
        if modes.is_empty() {
            return Err(EmptyPolicyError);
        }
        Ok(Self { modes })
    }

    /// A policy that never rotates
    #[must_use]
    pub fn single(mode: EventSetMode) -> Self {
        Self { modes: vec![mode] }
    }

    #[must_use]
    pub fn modes(&self) -> &[EventSetMode] {
        &self.modes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// Pure transition: `(i + 1) mod N`
    #[must_use]
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.modes.len()
    }
}

impl Default for RotationPolicy {
    /// Cache events, then TLB events
    fn default() -> Self {
        Self { modes: vec![EventSetMode::Default, EventSetMode::Tlb] }
    }
}

/// Tracks the active mode within a [`RotationPolicy`]
#[derive(Debug, Clone)]
pub struct EventSetRotator {
    policy: RotationPolicy,
    index: usize,
}

impl EventSetRotator {
    /// Starts at the first mode of the policy
    #[must_use]
    pub fn new(policy: RotationPolicy) -> Self {
        Self { policy, index: 0 }
    }

    /// The mode active for the current interval
    #[must_use]
    pub fn current(&self) -> &EventSetMode {
        &self.policy.modes[self.index]
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Move to the next mode. Returns true when the counters must be reprogrammed.
    pub fn advance(&mut self) -> bool {
        if self.policy.len() < 2 {
            return false;
        }
        let previous = self.index;
        self.index = self.policy.next_index(self.index);
        self.policy.modes[previous] != self.policy.modes[self.index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::EventDescriptor;

    #[test]
    fn test_default_policy_alternates() {
        let mut rotator = EventSetRotator::new(RotationPolicy::default());
        assert_eq!(rotator.current(), &EventSetMode::Default);

        assert!(rotator.advance());
        assert_eq!(rotator.current(), &EventSetMode::Tlb);

        assert!(rotator.advance());
        assert_eq!(rotator.current(), &EventSetMode::Default);
    }

    #[test]
    fn test_rotation_period_is_policy_length() {
        let custom = EventSetMode::Custom(vec![EventDescriptor { event: 0x2e, umask: 0x41 }]);
        let policy =
            RotationPolicy::new(vec![EventSetMode::Default, EventSetMode::Tlb, custom.clone()]).unwrap();
        let mut rotator = EventSetRotator::new(policy);

        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(rotator.current().clone());
            rotator.advance();
        }
        assert_eq!(seen[0], seen[3]);
        assert_eq!(seen[3], seen[6]);
        assert_eq!(seen[2], custom);
        assert_eq!(seen[5], custom);
    }

    #[test]
    fn test_single_mode_never_reprograms() {
        let mut rotator = EventSetRotator::new(RotationPolicy::single(EventSetMode::Tlb));
        for _ in 0..3 {
            assert!(!rotator.advance());
            assert_eq!(rotator.current(), &EventSetMode::Tlb);
        }
    }

    #[test]
    fn test_empty_policy_rejected() {
        assert_eq!(RotationPolicy::new(Vec::new()), Err(EmptyPolicyError));
        assert_eq!(RotationPolicy::default().next_index(1), 0);
    }
}
