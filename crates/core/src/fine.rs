//! Tiered fine schedule.
//!
//! The amount depends only on how far the detected speed exceeds the limit.
//! Each tier covers excess values up to and including its `max_excess`;
//! anything above the last tier pays `above_max`.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::{RadarId, Timestamp};

/// One row of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FineTier {
    /// Inclusive upper bound of the excess, in km/h.
    pub max_excess: i32,
    pub amount: Decimal,
}

impl FineTier {
    pub fn new(max_excess: i32, amount: i64) -> Self {
        Self {
            max_excess,
            amount: Decimal::from(amount),
        }
    }
}

/// Result of assessing a reading against its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assessment {
    /// Speed minus limit; always positive.
    pub violation_amount: i32,
    pub fine_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FineSchedule {
    tiers: Vec<FineTier>,
    above_max: Decimal,
}

impl Default for FineSchedule {
    /// 1–10 → 50, 11–20 → 100, 21–30 → 200, 31–40 → 300, above → 500.
    fn default() -> Self {
        Self {
            tiers: vec![
                FineTier::new(10, 50),
                FineTier::new(20, 100),
                FineTier::new(30, 200),
                FineTier::new(40, 300),
            ],
            above_max: Decimal::from(500),
        }
    }
}

impl FineSchedule {
    /// Build a schedule, rejecting tables that would break monotonicity.
    ///
    /// Tiers must have strictly increasing positive upper bounds and
    /// non-decreasing, non-negative amounts, and `above_max` must not be
    /// lower than the last tier.
    pub fn new(tiers: Vec<FineTier>, above_max: Decimal) -> Result<Self, CoreError> {
        let mut prev_bound = 0;
        let mut prev_amount = Decimal::ZERO;
        for tier in &tiers {
            if tier.max_excess <= prev_bound {
                return Err(CoreError::Validation(format!(
                    "fine tier bound {} must exceed {prev_bound}",
                    tier.max_excess
                )));
            }
            if tier.amount < prev_amount {
                return Err(CoreError::Validation(format!(
                    "fine tier amount {} is lower than the previous tier ({prev_amount})",
                    tier.amount
                )));
            }
            prev_bound = tier.max_excess;
            prev_amount = tier.amount;
        }
        if above_max < prev_amount {
            return Err(CoreError::Validation(format!(
                "amount above the last tier ({above_max}) is lower than {prev_amount}"
            )));
        }
        Ok(Self { tiers, above_max })
    }

    pub fn tiers(&self) -> &[FineTier] {
        &self.tiers
    }

    pub fn above_max(&self) -> Decimal {
        self.above_max
    }

    /// Fine for `excess` km/h over the limit. Zero when `excess <= 0`.
    pub fn calculate(&self, excess: i32) -> Decimal {
        if excess <= 0 {
            return Decimal::ZERO;
        }
        self.tiers
            .iter()
            .find(|tier| excess <= tier.max_excess)
            .map_or(self.above_max, |tier| tier.amount)
    }

    /// `None` for compliant readings (`speed <= limit`).
    pub fn assess(&self, speed: i32, limit: i32) -> Option<Assessment> {
        let excess = speed.saturating_sub(limit);
        (excess > 0).then(|| Assessment {
            violation_amount: excess,
            fine_amount: self.calculate(excess),
        })
    }
}

/// A fine ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFine {
    pub radar_id: RadarId,
    pub vehicle_plate: Option<String>,
    pub speed_detected: i32,
    pub speed_limit: i32,
    pub violation_amount: i32,
    pub fine_amount: Decimal,
    /// Detection time truncated to the second; part of the uniqueness key.
    pub violation_at: Timestamp,
    pub image_ref: Option<String>,
    pub notes: String,
}
