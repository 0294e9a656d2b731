//! Automatic garbage collection policies.

use crate::stats::StoreStat;

/// Decides whether the store should queue a garbage collection on its own.
///
/// The store consults the policy after every successful write, update and
/// clear. A collection is only queued when none is pending.
pub trait GcPolicy: Send {
    /// Returns `true` to queue a collection.
    fn should_collect(&mut self, stat: &StoreStat) -> bool;

    /// Whether the policy ever collects. Disabled policies are never
    /// consulted, which saves the page walk behind the snapshot.
    fn is_enabled(&self) -> bool {
        true
    }
}

impl<P: FnMut(&StoreStat) -> bool + Send> GcPolicy for P {
    fn should_collect(&mut self, stat: &StoreStat) -> bool {
        self(stat)
    }
}

/// Never collects automatically. Call [`crate::FlashStore::gc`] instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualGc;

impl GcPolicy for ManualGc {
    fn should_collect(&mut self, _stat: &StoreStat) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Collects once reclaimable space reaches a threshold.
#[derive(Debug, Clone, Copy)]
pub struct DirtyThresholdGc {
    threshold_words: u32,
}

impl DirtyThresholdGc {
    /// Collects once at least `threshold_words` words are freeable.
    #[must_use]
    pub const fn new(threshold_words: u32) -> Self {
        Self { threshold_words }
    }

    /// The configured threshold.
    #[must_use]
    pub const fn threshold_words(&self) -> u32 {
        self.threshold_words
    }
}

impl GcPolicy for DirtyThresholdGc {
    fn should_collect(&mut self, stat: &StoreStat) -> bool {
        stat.freeable_words >= self.threshold_words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(freeable_words: u32) -> StoreStat {
        StoreStat {
            freeable_words,
            ..StoreStat::default()
        }
    }

    #[test]
    fn manual_never_collects() {
        let mut policy = ManualGc;
        assert!(!policy.is_enabled());
        assert!(!policy.should_collect(&stat(u32::MAX)));
    }

    #[test]
    fn threshold() {
        let mut policy = DirtyThresholdGc::new(10);
        assert!(policy.is_enabled());
        assert!(!policy.should_collect(&stat(9)));
        assert!(policy.should_collect(&stat(10)));
    }

    #[test]
    fn closures_are_policies() {
        let mut calls = 0;
        let mut policy = |s: &StoreStat| {
            calls += 1;
            s.dirty_records > 2
        };
        assert!(!GcPolicy::should_collect(&mut policy, &stat(0)));
        drop(policy);
        assert_eq!(calls, 1);
    }
}
