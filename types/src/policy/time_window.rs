// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{UpgradeError, UpgradeResult},
    policy::{PolicyContext, UpgradePredicate},
};
use serde::{Deserialize, Serialize};

/// Permits upgrades while the chain clock is in `[start_ms, end_ms)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start_ms: u64,
    end_ms: u64,
}

impl TimeWindow {
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.end_ms
    }
}

impl UpgradePredicate for TimeWindow {
    fn name(&self) -> &'static str {
        "time_window"
    }

    fn check_config(&self) -> UpgradeResult<()> {
        if self.start_ms >= self.end_ms {
            return Err(UpgradeError::InvalidPolicyConfig(format!(
                "time window [{}, {}) is empty",
                self.start_ms, self.end_ms
            )));
        }
        Ok(())
    }

    fn validate(&self, context: &PolicyContext) -> bool {
        (self.start_ms..self.end_ms).contains(&context.timestamp_ms)
    }
}
