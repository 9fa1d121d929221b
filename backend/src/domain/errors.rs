//! Validation outcomes produced by the allocators.
//!
//! Hard failures are [`AllocationError`]s. Advisories that the caller must
//! confirm (the old confirm-dialog cases) travel as [`AllocationWarning`]s
//! inside a successful [`Proposal`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use super::gatekeeper::GatekeeperError;

/// Domain validation failures. Constraint variants carry the computed bound
/// so the UI can render an actionable message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocationError {
    #[error("Missing required field: {field}")]
    MissingRequiredField { field: &'static str },

    #[error("Phase duration of {duration_days} days is below the minimum of {min_days} days")]
    DurationTooShort { duration_days: u32, min_days: u32 },

    #[error("Start date {start_date} is too early; the earliest allowed start is {min_allowed_start}")]
    StartDateTooEarly {
        start_date: NaiveDate,
        min_allowed_start: NaiveDate,
    },

    #[error("Phase would end on {end_date}, too close to phase {next_phase_number}; it must end by {latest_allowed_end}")]
    ConflictsWithNextPhase {
        end_date: NaiveDate,
        next_phase_number: u32,
        latest_allowed_end: NaiveDate,
    },

    #[error("Shifting {date} by {days} days falls outside the supported calendar")]
    DateOutOfRange { date: NaiveDate, days: u32 },

    #[error("Phase funding total {new_total} exceeds the project target {target}; at most {max_allowed} can be allocated to this phase")]
    ExceedsProjectTarget {
        new_total: Decimal,
        target: Decimal,
        max_allowed: Decimal,
    },

    #[error("Milestone total {new_total} exceeds the phase goal {phase_goal}; at most {max_allowed} can be allocated to this milestone")]
    ExceedsPhaseGoal {
        new_total: Decimal,
        phase_goal: Decimal,
        max_allowed: Decimal,
    },

    #[error("Milestone price {price} exceeds the per-milestone cap of {max_allowed}")]
    ExceedsPerMilestoneCap {
        price: Decimal,
        max_allowed: Decimal,
        max_percentage: Decimal,
    },

    #[error("Item '{name}' must have a quantity of at least 1")]
    InvalidItemQuantity { name: String },

    #[error("Phase not found: {0}")]
    PhaseNotFound(String),

    #[error("Milestone not found: {0}")]
    MilestoneNotFound(String),

    #[error(transparent)]
    NotEditable(#[from] GatekeeperError),

    #[error("Target amount is unavailable for project {project_id}")]
    TargetAmountUnavailable { project_id: String },

    #[error("Engine fault: {0}")]
    Fault(#[from] EngineFault),
}

impl AllocationError {
    /// Programming errors (bad snapshots, negative inputs) as opposed to
    /// ordinary validation failures
    pub fn is_fault(&self) -> bool {
        matches!(self, AllocationError::Fault(_))
    }
}

/// Inputs that no well-behaved caller should ever produce
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineFault {
    #[error("{what} has a negative amount ({amount})")]
    NegativeAmount { what: String, amount: Decimal },

    #[error("{what} has a negative duration or inconsistent dates")]
    InconsistentDates { what: String },
}

/// Non-fatal advisories. The caller decides whether to proceed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationWarning {
    /// The allocation is valid but leaves part of the parent budget unassigned
    PartialAllocation {
        allocated: Decimal,
        target: Decimal,
        remaining: Decimal,
    },
    /// Removing a phase leaves the project below its funding target
    RemovalUnderfundsProject {
        remaining_total: Decimal,
        target: Decimal,
        shortfall: Decimal,
    },
}

impl fmt::Display for AllocationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationWarning::PartialAllocation { allocated, target, remaining } => write!(
                f,
                "Only {} of {} is allocated; {} remains unassigned",
                allocated, target, remaining
            ),
            AllocationWarning::RemovalUnderfundsProject { remaining_total, target, shortfall } => write!(
                f,
                "After removal the phases total {} against a target of {} ({} short)",
                remaining_total, target, shortfall
            ),
        }
    }
}

/// An approved mutation together with any warnings the caller should confirm
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal<T> {
    pub value: T,
    pub warnings: Vec<AllocationWarning>,
}

impl<T> Proposal<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: AllocationWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Swap the approved value while keeping the warnings
    pub fn map_value<U>(self, f: impl FnOnce(T) -> U) -> Proposal<U> {
        Proposal {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

/// Reject negative amounts before any arithmetic runs
pub(crate) fn ensure_non_negative(what: impl Into<String>, amount: Decimal) -> Result<(), AllocationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(EngineFault::NegativeAmount {
            what: what.into(),
            amount,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_amount_is_fault() {
        let err = ensure_non_negative("candidate phase", Decimal::from(-5)).unwrap_err();
        assert!(err.is_fault());
        assert!(err.to_string().contains("candidate phase"));
    }

    #[test]
    fn test_zero_and_negative_zero_are_accepted() {
        assert!(ensure_non_negative("price", Decimal::ZERO).is_ok());
        assert!(ensure_non_negative("price", -Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_proposal_warnings() {
        let proposal = Proposal::new(1).with_warning(AllocationWarning::PartialAllocation {
            allocated: Decimal::from(5),
            target: Decimal::from(10),
            remaining: Decimal::from(5),
        });
        assert!(proposal.has_warnings());
        assert_eq!(proposal.into_value(), 1);
    }

    #[test]
    fn test_constraint_errors_mention_bound() {
        let err = AllocationError::ExceedsPerMilestoneCap {
            price: Decimal::from(201),
            max_allowed: Decimal::from(200),
            max_percentage: Decimal::new(20, 2),
        };
        assert!(err.to_string().contains("200"));
        assert!(!err.is_fault());
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = AllocationWarning::RemovalUnderfundsProject {
            remaining_total: Decimal::from(5000),
            target: Decimal::from(10000),
            shortfall: Decimal::from(5000),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "REMOVAL_UNDERFUNDS_PROJECT");
    }
}
