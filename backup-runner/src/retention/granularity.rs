//! Retention classes and their calendar buckets.

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;

/// A retention class. Each one maps a timestamp to the calendar period it
/// falls in; two timestamps share a bucket key iff they are in the same
/// period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Granularity {
    /// Every granularity, finest first. Pending sets and archive names follow
    /// this order.
    pub const ALL: [Granularity; 6] = [
        Granularity::Minutely,
        Granularity::Hourly,
        Granularity::Daily,
        Granularity::Weekly,
        Granularity::Monthly,
        Granularity::Yearly,
    ];

    /// Tag used in archive filenames and configuration keys.
    pub fn tag(self) -> &'static str {
        match self {
            Granularity::Minutely => "minutely",
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Yearly => "yearly",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.tag() == tag)
    }

    /// Key of the period containing `at`. Weeks are ISO weeks, keyed by ISO
    /// week-numbering year so the turn of the year does not split them.
    pub fn bucket_key(self, at: &NaiveDateTime) -> String {
        match self {
            Granularity::Minutely => format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}",
                at.year(),
                at.month(),
                at.day(),
                at.hour(),
                at.minute()
            ),
            Granularity::Hourly => format!(
                "{:04}-{:02}-{:02}T{:02}",
                at.year(),
                at.month(),
                at.day(),
                at.hour()
            ),
            Granularity::Daily => format!("{:04}-{:02}-{:02}", at.year(), at.month(), at.day()),
            Granularity::Weekly => {
                let week = at.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
            Granularity::Monthly => format!("{:04}-{:02}", at.year(), at.month()),
            Granularity::Yearly => format!("{:04}", at.year()),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| format!("unknown granularity: {}", s))
    }
}
