//! Sort policies for posts and top-level comments.
//!
//! Every policy is a plain comparator over vote counts and creation time.
//! Sorting is always stable, so ties keep insertion order.

use crate::error::ForumError;
use crate::utils::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Anything that can be ranked.
pub trait Scored {
    fn upvotes(&self) -> i64;
    fn downvotes(&self) -> i64;
    fn created_at(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingSettings {
    pub hot_exponent: f64,
    pub rising_window_hours: f64,
    pub rising_min_upvotes: i64,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            hot_exponent: 1.5,
            rising_window_hours: 24.0,
            rising_min_upvotes: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortPolicy {
    #[default]
    Hot,
    New,
    #[serde(alias = "best")]
    Top,
    Rising,
    Controversial,
    Old,
}

impl SortPolicy {
    pub const ALL: [SortPolicy; 6] = [
        SortPolicy::Hot,
        SortPolicy::New,
        SortPolicy::Top,
        SortPolicy::Rising,
        SortPolicy::Controversial,
        SortPolicy::Old,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortPolicy::Hot => "hot",
            SortPolicy::New => "new",
            SortPolicy::Top => "top",
            SortPolicy::Rising => "rising",
            SortPolicy::Controversial => "controversial",
            SortPolicy::Old => "old",
        }
    }

    /// Parses an optional query value, falling back to `default` when absent.
    pub fn parse_or(raw: Option<&str>, default: SortPolicy) -> Result<SortPolicy, ForumError> {
        match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => raw.parse(),
            None => Ok(default),
        }
    }

    pub fn comparator(self, now: DateTime<Utc>, settings: RankingSettings) -> Comparator {
        Comparator {
            policy: self,
            now,
            settings,
        }
    }
}

impl FromStr for SortPolicy {
    type Err = ForumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(SortPolicy::Hot),
            "new" => Ok(SortPolicy::New),
            "top" | "best" => Ok(SortPolicy::Top),
            "rising" => Ok(SortPolicy::Rising),
            "controversial" => Ok(SortPolicy::Controversial),
            "old" => Ok(SortPolicy::Old),
            other => Err(ForumError::validation(format!(
                "unknown sort policy {other:?}"
            ))),
        }
    }
}

impl fmt::Display for SortPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy bound to a reference time.
#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    policy: SortPolicy,
    now: DateTime<Utc>,
    settings: RankingSettings,
}

impl Comparator {
    pub fn compare<T: Scored + ?Sized>(&self, a: &T, b: &T) -> Ordering {
        match self.policy {
            SortPolicy::New => parse_timestamp(b.created_at()).cmp(&parse_timestamp(a.created_at())),
            SortPolicy::Old => parse_timestamp(a.created_at()).cmp(&parse_timestamp(b.created_at())),
            SortPolicy::Top => net(b).cmp(&net(a)),
            SortPolicy::Hot => self.hot(b).total_cmp(&self.hot(a)),
            SortPolicy::Controversial => controversy(b).total_cmp(&controversy(a)),
            SortPolicy::Rising => {
                let (a_rising, b_rising) = (self.is_rising(a), self.is_rising(b));
                b_rising
                    .cmp(&a_rising)
                    .then_with(|| self.rate(b).total_cmp(&self.rate(a)))
            }
        }
    }

    /// Stable in-place sort.
    pub fn sort<T: Scored>(&self, items: &mut [T]) {
        items.sort_by(|a, b| self.compare(a, b));
    }

    fn age_hours<T: Scored + ?Sized>(&self, item: &T) -> f64 {
        let created = parse_timestamp(item.created_at());
        let millis = (self.now - created).num_milliseconds() as f64;
        (millis / 3_600_000.0).max(0.0)
    }

    fn hot<T: Scored + ?Sized>(&self, item: &T) -> f64 {
        let hours = self.age_hours(item);
        item.upvotes() as f64 / (hours + 2.0).powf(self.settings.hot_exponent)
    }

    fn is_rising<T: Scored + ?Sized>(&self, item: &T) -> bool {
        self.age_hours(item) <= self.settings.rising_window_hours
            && item.upvotes() >= self.settings.rising_min_upvotes
    }

    fn rate<T: Scored + ?Sized>(&self, item: &T) -> f64 {
        item.upvotes() as f64 / self.age_hours(item).max(0.5)
    }
}

fn net<T: Scored + ?Sized>(item: &T) -> i64 {
    item.upvotes() - item.downvotes()
}

fn controversy<T: Scored + ?Sized>(item: &T) -> f64 {
    let total = item.upvotes() + item.downvotes();
    if total <= 0 {
        return 0.0;
    }
    item.downvotes() as f64 / total as f64
}

/// Sorts `items` by `policy` as of `now`.
pub fn sort_by_policy<T: Scored>(
    items: &mut [T],
    policy: SortPolicy,
    now: DateTime<Utc>,
    settings: RankingSettings,
) {
    policy.comparator(now, settings).sort(items);
}
