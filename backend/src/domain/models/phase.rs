use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::{PhaseData, PhaseStatus};

/// A phase the user wants to add
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseCandidate {
    pub funding_goal: Decimal,
    pub start_date: NaiveDate,
    pub duration_days: u32,
}

/// Partial update of an existing phase; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseChanges {
    pub funding_goal: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub duration_days: Option<u32>,
}

/// An approved phase with derived fields filled in
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPhase {
    /// Set when the proposal updates an existing phase
    pub id: Option<String>,
    pub phase_number: u32,
    pub funding_goal: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: u32,
    pub status: PhaseStatus,
}

impl NormalizedPhase {
    pub fn to_phase_data(&self) -> PhaseData {
        PhaseData {
            phase_number: self.phase_number,
            funding_goal: self.funding_goal,
            start_date: self.start_date,
            end_date: self.end_date,
            duration_days: self.duration_days,
            status: self.status,
        }
    }
}

/// New sequence number for a phase that shifts after a removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRenumbering {
    pub phase_id: String,
    pub from: u32,
    pub to: u32,
}

/// What the project looks like once a phase is removed
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseRemovalPlan {
    pub phase_id: String,
    pub remaining_total: Decimal,
    pub remaining_count: usize,
    pub renumbered: Vec<PhaseRenumbering>,
}
