//! Fee engine: pure computation of the total cost of settling a deposit.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

#[derive(Error, Debug)]
pub enum FeeError {
    #[error("fee schedule has no ranges")]
    EmptySchedule,
}

impl From<FeeError> for AppError {
    fn from(e: FeeError) -> Self {
        AppError::ExternalService(e.to_string())
    }
}

/// Network withdrawal fee as published by the exchange: either a flat
/// scalar or a set of amount ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeeSchedule {
    Flat(BigDecimal),
    Ranges(Vec<FeeRange>),
}

/// One tier of a ranged schedule. Bounds are inclusive on both ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRange {
    pub min: BigDecimal,
    pub max: BigDecimal,
    pub value: BigDecimal,
}

/// Computed per settlement attempt; never persisted or cached.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeQuote {
    pub network_fee: BigDecimal,
    pub platform_fee: BigDecimal,
    pub margin_fee: BigDecimal,
    pub total_fees: BigDecimal,
    pub net_amount: BigDecimal,
}

impl FeeQuote {
    /// A deposit too small to cover its own fees is a defined terminal
    /// outcome of the saga, not an error.
    pub fn is_insufficient(&self) -> bool {
        self.net_amount <= BigDecimal::from(0)
    }
}

/// Network fee for `amount` under `schedule`. Amounts beyond every range
/// fall back to the last range's value (clamp, not extrapolation).
fn network_fee(schedule: &FeeSchedule, amount: &BigDecimal) -> Result<BigDecimal, FeeError> {
    match schedule {
        FeeSchedule::Flat(value) => Ok(value.clone()),
        FeeSchedule::Ranges(ranges) => {
            let last = ranges.last().ok_or(FeeError::EmptySchedule)?;
            let matched = ranges
                .iter()
                .find(|r| &r.min <= amount && amount <= &r.max)
                .unwrap_or(last);
            Ok(matched.value.clone())
        }
    }
}

/// Total settlement cost of a deposit. `margin_rate` is a fraction
/// (0.10 for 10%); `net_amount = amount - (network + platform + margin)`.
pub fn compute_fees(
    schedule: &FeeSchedule,
    platform_fee: &BigDecimal,
    margin_rate: &BigDecimal,
    amount: &BigDecimal,
) -> Result<FeeQuote, FeeError> {
    let network_fee = network_fee(schedule, amount)?;
    let margin_fee = (&network_fee + platform_fee) * margin_rate;
    let total_fees = &network_fee + platform_fee + &margin_fee;
    let net_amount = amount - &total_fees;

    Ok(FeeQuote {
        network_fee,
        platform_fee: platform_fee.clone(),
        margin_fee,
        total_fees,
        net_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn tiered() -> FeeSchedule {
        FeeSchedule::Ranges(vec![
            FeeRange {
                min: dec("0"),
                max: dec("1"),
                value: dec("0.0001"),
            },
            FeeRange {
                min: dec("1"),
                max: dec("10"),
                value: dec("0.0005"),
            },
            FeeRange {
                min: dec("10"),
                max: dec("100"),
                value: dec("0.001"),
            },
        ])
    }

    #[test]
    fn test_flat_fee_scenario_a() {
        // 1.0 deposited, network 0.00005, platform 0.00005, margin 10%.
        let quote = compute_fees(
            &FeeSchedule::Flat(dec("0.00005")),
            &dec("0.00005"),
            &dec("0.10"),
            &dec("1.0"),
        )
        .unwrap();

        assert_eq!(quote.network_fee, dec("0.00005"));
        assert_eq!(quote.platform_fee, dec("0.00005"));
        assert_eq!(quote.margin_fee, dec("0.00001"));
        assert_eq!(quote.total_fees, dec("0.00011"));
        assert_eq!(quote.net_amount, dec("0.99989"));
        assert!(!quote.is_insufficient());
    }

    #[test]
    fn test_net_amount_is_exact() {
        let quote = compute_fees(&tiered(), &dec("0.00005"), &dec("0.10"), &dec("5")).unwrap();
        assert_eq!(quote.net_amount, dec("5") - &quote.total_fees);
    }

    #[test]
    fn test_is_deterministic() {
        let a = compute_fees(&tiered(), &dec("0.00005"), &dec("0.10"), &dec("2.5")).unwrap();
        let b = compute_fees(&tiered(), &dec("0.00005"), &dec("0.10"), &dec("2.5")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let quote = compute_fees(&tiered(), &dec("0"), &dec("0"), &dec("1")).unwrap();
        // 1 sits on the boundary of the first two ranges; the first match wins.
        assert_eq!(quote.network_fee, dec("0.0001"));

        let quote = compute_fees(&tiered(), &dec("0"), &dec("0"), &dec("10")).unwrap();
        assert_eq!(quote.network_fee, dec("0.0005"));
    }

    #[test]
    fn test_amount_above_all_ranges_clamps_to_last() {
        let quote = compute_fees(&tiered(), &dec("0"), &dec("0"), &dec("5000")).unwrap();
        assert_eq!(quote.network_fee, dec("0.001"));
    }

    #[test]
    fn test_amount_outside_any_range_falls_back_to_last() {
        let gappy = FeeSchedule::Ranges(vec![
            FeeRange {
                min: dec("1"),
                max: dec("2"),
                value: dec("0.1"),
            },
            FeeRange {
                min: dec("5"),
                max: dec("6"),
                value: dec("0.2"),
            },
        ]);
        let below = compute_fees(&gappy, &dec("0"), &dec("0"), &dec("0.5")).unwrap();
        assert_eq!(below.network_fee, dec("0.2"));
        let between = compute_fees(&gappy, &dec("0"), &dec("0"), &dec("3")).unwrap();
        assert_eq!(between.network_fee, dec("0.2"));
    }

    #[test]
    fn test_insufficient_deposit_scenario_b() {
        let quote = compute_fees(
            &FeeSchedule::Flat(dec("0.00005")),
            &dec("0.00005"),
            &dec("0.10"),
            &dec("0.0001"),
        )
        .unwrap();
        assert!(quote.net_amount <= BigDecimal::from(0));
        assert!(quote.is_insufficient());
    }

    #[test]
    fn test_empty_ranges_is_an_error() {
        let result = compute_fees(
            &FeeSchedule::Ranges(vec![]),
            &dec("0"),
            &dec("0.1"),
            &dec("1"),
        );
        assert!(matches!(result, Err(FeeError::EmptySchedule)));
    }

    #[test]
    fn test_schedule_deserializes_both_shapes() {
        let flat: FeeSchedule = serde_json::from_str("\"0.00005\"").unwrap();
        assert!(matches!(flat, FeeSchedule::Flat(_)));

        let ranges: FeeSchedule =
            serde_json::from_str(r#"[{"min":"0","max":"1","value":"0.0001"}]"#).unwrap();
        assert!(matches!(ranges, FeeSchedule::Ranges(r) if r.len() == 1));
    }
}
