//! Subjective Units of Distress ratings collected around a session.
//!
//! Collection is a small typestate: [`SudCollector`] holds the pre rating and
//! any mid-session check-ins, [`SudCollector::finish`] freezes the session
//! figures into a [`PendingSummary`], and only [`PendingSummary::record_post`]
//! yields a [`SessionSummary`] that may be written to history.

use crate::error::SudError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A rating on the 0..=10 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct SudValue(u8);

impl SudValue {
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> Result<Self, SudError> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SudError::OutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for SudValue {
    type Error = SudError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SudValue> for u8 {
    fn from(v: SudValue) -> Self {
        v.0
    }
}

impl fmt::Display for SudValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
pub enum SudKind {
    Pre,
    Mid,
    Post,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SudRating {
    pub value: SudValue,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: SudKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(rename = "preSUD")]
    pub pre_sud: SudRating,
    #[serde(rename = "postSUD")]
    pub post_sud: SudRating,
    #[serde(rename = "midSUDs", default)]
    pub mid_suds: Vec<SudRating>,
    /// Seconds
    pub total_duration: u64,
    pub total_sets: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

impl SessionSummary {
    /// Drop in distress from before to after; negative when it rose
    pub fn improvement(&self) -> i32 {
        self.pre_sud.value.get() as i32 - self.post_sud.value.get() as i32
    }

    pub fn improved(&self) -> bool {
        self.improvement() > 0
    }
}

/// Hands out timestamps that never go backwards, even if the wall clock does.
/// Stamps are whole milliseconds, the precision history stores.
#[derive(Debug, Clone, Copy)]
struct Stamper {
    last: DateTime<Utc>,
}

impl Stamper {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            last: now.trunc_subsecs(3),
        }
    }

    fn stamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.last = self.last.max(now.trunc_subsecs(3));
        self.last
    }
}

#[derive(Debug, Clone)]
pub struct SudCollector {
    pre: SudRating,
    mids: Vec<SudRating>,
    goal: Option<String>,
    stamper: Stamper,
}

impl SudCollector {
    pub fn record_pre(value: SudValue, goal: Option<String>) -> Self {
        Self::record_pre_at(value, goal, Utc::now())
    }

    pub fn record_pre_at(value: SudValue, goal: Option<String>, now: DateTime<Utc>) -> Self {
        let goal = goal.map(|g| g.trim().to_string()).filter(|g| !g.is_empty());
        let stamper = Stamper::new(now);
        Self {
            pre: SudRating {
                value,
                timestamp: stamper.last,
                kind: SudKind::Pre,
            },
            mids: Vec::new(),
            goal,
            stamper,
        }
    }

    pub fn record_mid(&mut self, value: SudValue) -> &SudRating {
        self.record_mid_at(value, Utc::now())
    }

    pub fn record_mid_at(&mut self, value: SudValue, now: DateTime<Utc>) -> &SudRating {
        let timestamp = self.stamper.stamp(now);
        self.mids.push(SudRating {
            value,
            timestamp,
            kind: SudKind::Mid,
        });
        &self.mids[self.mids.len() - 1]
    }

    pub fn pre(&self) -> &SudRating {
        &self.pre
    }

    pub fn mids(&self) -> &[SudRating] {
        &self.mids
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    /// Freezes duration and set count when the active session ends
    pub fn finish(self, total_duration: Duration, total_sets: u32) -> PendingSummary {
        self.finish_at(total_duration, total_sets, Utc::now())
    }

    pub fn finish_at(
        mut self,
        total_duration: Duration,
        total_sets: u32,
        now: DateTime<Utc>,
    ) -> PendingSummary {
        let completed_at = self.stamper.stamp(now);
        PendingSummary {
            pre_sud: self.pre,
            mid_suds: self.mids,
            total_duration: total_duration.as_secs(),
            total_sets,
            completed_at,
            goal: self.goal,
            stamper: self.stamper,
        }
    }
}

/// A finished session still waiting for its post rating
#[derive(Debug, Clone)]
pub struct PendingSummary {
    pub pre_sud: SudRating,
    pub mid_suds: Vec<SudRating>,
    pub total_duration: u64,
    pub total_sets: u32,
    pub completed_at: DateTime<Utc>,
    pub goal: Option<String>,
    stamper: Stamper,
}

impl PendingSummary {
    pub fn record_post(self, value: SudValue) -> SessionSummary {
        self.record_post_at(value, Utc::now())
    }

    pub fn record_post_at(mut self, value: SudValue, now: DateTime<Utc>) -> SessionSummary {
        let timestamp = self.stamper.stamp(now);
        SessionSummary {
            pre_sud: self.pre_sud,
            post_sud: SudRating {
                value,
                timestamp,
                kind: SudKind::Post,
            },
            mid_suds: self.mid_suds,
            total_duration: self.total_duration,
            total_sets: self.total_sets,
            completed_at: self.completed_at,
            goal: self.goal,
        }
    }
}
