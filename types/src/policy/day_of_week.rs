// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{UpgradeError, UpgradeResult},
    policy::{PolicyContext, UpgradePredicate},
};
use chrono::{offset::LocalResult, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

const MS_IN_WEEK: u64 = 7 * 24 * 60 * 60 * 1000;

/// Days of the week, numbered from Monday = 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Weekday> {
        Self::ALL.get(index as usize).copied()
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for Weekday {
    type Err = UpgradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<u8>() {
            return Weekday::from_index(index).ok_or_else(|| {
                UpgradeError::InvalidPolicyConfig(format!("weekday {} is not in 0..=6", index))
            });
        }
        Self::ALL
            .iter()
            .find(|day| day.to_string().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UpgradeError::InvalidPolicyConfig(format!("unknown weekday '{}'", s)))
    }
}

/// Weekday of a chain timestamp, in UTC.
pub fn week_day(timestamp_ms: u64) -> Weekday {
    // Whole weeks never change the weekday, and the remainder is always in chrono's range.
    let within_week = (timestamp_ms % MS_IN_WEEK) as i64;
    let weekday = match Utc.timestamp_millis_opt(within_week) {
        LocalResult::Single(time) => time.weekday(),
        _ => chrono::Weekday::Thu,
    };
    Weekday::ALL[weekday.num_days_from_monday() as usize]
}

/// Permits upgrades only on one day of the week.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOfWeek {
    day: u8,
}

impl DayOfWeek {
    /// Takes the raw day as it arrives in a call argument; it is checked by
    /// [`UpgradePredicate::check_config`] when the policy is created.
    pub fn new(day: u8) -> Self {
        Self { day }
    }

    pub fn day(&self) -> u8 {
        self.day
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        Self::new(day.index())
    }
}

impl UpgradePredicate for DayOfWeek {
    fn name(&self) -> &'static str {
        "day_of_week"
    }

    fn check_config(&self) -> UpgradeResult<()> {
        if Weekday::from_index(self.day).is_none() {
            return Err(UpgradeError::InvalidPolicyConfig(format!(
                "weekday {} is not in 0..=6",
                self.day
            )));
        }
        Ok(())
    }

    fn validate(&self, context: &PolicyContext) -> bool {
        week_day(context.timestamp_ms).index() == self.day
    }
}
