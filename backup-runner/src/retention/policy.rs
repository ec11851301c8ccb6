//! How many archives to keep per granularity.

use super::granularity::Granularity;
use serde::{Deserialize, Serialize};

/// Maximum number of archives retained per granularity. `0` disables the
/// granularity: nothing new is created and existing archives are evicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub minutely: usize,
    pub hourly: usize,
    pub daily: usize,
    pub weekly: usize,
    pub monthly: usize,
    pub yearly: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            minutely: 0,
            hourly: 24,
            daily: 7,
            weekly: 4,
            monthly: 12,
            yearly: 5,
        }
    }
}

impl RetentionPolicy {
    /// A policy with every granularity disabled.
    pub fn disabled() -> Self {
        Self {
            minutely: 0,
            hourly: 0,
            daily: 0,
            weekly: 0,
            monthly: 0,
            yearly: 0,
        }
    }

    /// Builder-style override of a single cap.
    pub fn with(mut self, granularity: Granularity, max_count: usize) -> Self {
        *self.slot(granularity) = max_count;
        self
    }

    pub fn max_count(&self, granularity: Granularity) -> usize {
        match granularity {
            Granularity::Minutely => self.minutely,
            Granularity::Hourly => self.hourly,
            Granularity::Daily => self.daily,
            Granularity::Weekly => self.weekly,
            Granularity::Monthly => self.monthly,
            Granularity::Yearly => self.yearly,
        }
    }

    pub fn is_enabled(&self, granularity: Granularity) -> bool {
        self.max_count(granularity) > 0
    }

    fn slot(&mut self, granularity: Granularity) -> &mut usize {
        match granularity {
            Granularity::Minutely => &mut self.minutely,
            Granularity::Hourly => &mut self.hourly,
            Granularity::Daily => &mut self.daily,
            Granularity::Weekly => &mut self.weekly,
            Granularity::Monthly => &mut self.monthly,
            Granularity::Yearly => &mut self.yearly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_keeps_defaults() {
        let policy: RetentionPolicy = toml::from_str("daily = 2\nyearly = 0").unwrap();
        assert_eq!(policy.max_count(Granularity::Daily), 2);
        assert_eq!(policy.max_count(Granularity::Yearly), 0);
        assert_eq!(policy.max_count(Granularity::Hourly), 24);
        assert!(!policy.is_enabled(Granularity::Minutely));
    }

    #[test]
    fn test_with_override() {
        let policy = RetentionPolicy::disabled().with(Granularity::Weekly, 3);
        assert_eq!(policy.max_count(Granularity::Weekly), 3);
        assert!(Granularity::ALL
            .into_iter()
            .filter(|g| *g != Granularity::Weekly)
            .all(|g| !policy.is_enabled(g)));
    }
}
