//! Status state machines for the two settlement legs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of the crypto leg. Terminal once SETTLED or FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Settled,
    Failed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::Settled => "SETTLED",
            SettlementStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementStatus::Settled | SettlementStatus::Failed)
    }
}

impl FromStr for SettlementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SettlementStatus::Pending),
            "SETTLED" => Ok(SettlementStatus::Settled),
            "FAILED" => Ok(SettlementStatus::Failed),
            other => Err(format!("unknown settlement status '{}'", other)),
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the fiat-side ledger record. Linear
/// initiated -> pending -> processing -> completed, with failed and
/// cancelled reachable from any non-terminal state. Immutable once
/// completed, failed, or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Initiated,
    Pending,
    Processing,
    Completed,
    Cancelled,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Initiated => "initiated",
            LedgerStatus::Pending => "pending",
            LedgerStatus::Processing => "processing",
            LedgerStatus::Completed => "completed",
            LedgerStatus::Cancelled => "cancelled",
            LedgerStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LedgerStatus::Completed | LedgerStatus::Cancelled | LedgerStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: LedgerStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            LedgerStatus::Failed | LedgerStatus::Cancelled => true,
            LedgerStatus::Initiated => false,
            LedgerStatus::Pending => *self == LedgerStatus::Initiated,
            LedgerStatus::Processing => *self == LedgerStatus::Pending,
            LedgerStatus::Completed => {
                matches!(self, LedgerStatus::Pending | LedgerStatus::Processing)
            }
        }
    }
}

impl FromStr for LedgerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(LedgerStatus::Initiated),
            "pending" => Ok(LedgerStatus::Pending),
            "processing" => Ok(LedgerStatus::Processing),
            "completed" => Ok(LedgerStatus::Completed),
            "cancelled" => Ok(LedgerStatus::Cancelled),
            "failed" => Ok(LedgerStatus::Failed),
            other => Err(format!("unknown ledger status '{}'", other)),
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_status_terminality() {
        assert!(!SettlementStatus::Pending.is_terminal());
        assert!(SettlementStatus::Settled.is_terminal());
        assert!(SettlementStatus::Failed.is_terminal());
    }

    #[test]
    fn test_ledger_linear_path() {
        assert!(LedgerStatus::Initiated.can_transition_to(LedgerStatus::Pending));
        assert!(LedgerStatus::Pending.can_transition_to(LedgerStatus::Processing));
        assert!(LedgerStatus::Processing.can_transition_to(LedgerStatus::Completed));
        // The worker completes straight from pending when no processing
        // checkpoint was recorded.
        assert!(LedgerStatus::Pending.can_transition_to(LedgerStatus::Completed));
    }

    #[test]
    fn test_ledger_exceptions_reachable_from_non_terminal() {
        for from in [
            LedgerStatus::Initiated,
            LedgerStatus::Pending,
            LedgerStatus::Processing,
        ] {
            assert!(from.can_transition_to(LedgerStatus::Failed));
            assert!(from.can_transition_to(LedgerStatus::Cancelled));
        }
    }

    #[test]
    fn test_ledger_terminal_states_are_immutable() {
        for from in [
            LedgerStatus::Completed,
            LedgerStatus::Cancelled,
            LedgerStatus::Failed,
        ] {
            for to in [
                LedgerStatus::Pending,
                LedgerStatus::Processing,
                LedgerStatus::Completed,
                LedgerStatus::Failed,
            ] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_no_backwards_transitions() {
        assert!(!LedgerStatus::Processing.can_transition_to(LedgerStatus::Pending));
        assert!(!LedgerStatus::Pending.can_transition_to(LedgerStatus::Initiated));
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        assert_eq!(
            "SETTLED".parse::<SettlementStatus>().unwrap(),
            SettlementStatus::Settled
        );
        assert_eq!(
            "processing".parse::<LedgerStatus>().unwrap(),
            LedgerStatus::Processing
        );
        assert!("bogus".parse::<LedgerStatus>().is_err());
    }
}
