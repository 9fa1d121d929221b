use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A crowdfunding project as seen by the planning layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Project ID in format: "project::<id>"
    pub id: String,
    pub title: String,
    /// Total funding target. `None` when the caller has not loaded it yet.
    pub total_target_amount: Option<Decimal>,
    pub status: ProjectStatus,
}

/// Project lifecycle status. Owned by the backend; the engine only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Draft,
    PendingApproval,
    Approved,
    Fundraising,
    Suspended,
    Cancelled,
    Completed,
}

impl ProjectStatus {
    /// Suspended and cancelled projects freeze every phase and milestone beneath them
    pub fn is_locked(&self) -> bool {
        matches!(self, ProjectStatus::Suspended | ProjectStatus::Cancelled)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectStatus::Draft => "DRAFT",
            ProjectStatus::PendingApproval => "PENDING_APPROVAL",
            ProjectStatus::Approved => "APPROVED",
            ProjectStatus::Fundraising => "FUNDRAISING",
            ProjectStatus::Suspended => "SUSPENDED",
            ProjectStatus::Cancelled => "CANCELLED",
            ProjectStatus::Completed => "COMPLETED",
        };
        write!(f, "{}", s)
    }
}

/// A time-boxed funding window within a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Phase ID in format: "phase::<id>"
    pub id: String,
    pub project_id: String,
    /// 1-based position in the project's phase sequence
    pub phase_number: u32,
    pub funding_goal: Decimal,
    pub start_date: NaiveDate,
    /// Always `start_date + duration_days`
    pub end_date: NaiveDate,
    pub duration_days: u32,
    pub status: PhaseStatus,
}

/// Phase lifecycle: PLAN -> PROCESS -> COMPLETED, never backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Plan,
    Process,
    Completed,
}

impl PhaseStatus {
    /// Whether moving from `self` to `next` respects the monotonic lifecycle.
    /// Staying in the same status is allowed.
    pub fn can_transition_to(&self, next: PhaseStatus) -> bool {
        next >= *self
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseStatus::Plan => "PLAN",
            PhaseStatus::Process => "PROCESS",
            PhaseStatus::Completed => "COMPLETED",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAN" => Ok(PhaseStatus::Plan),
            "PROCESS" => Ok(PhaseStatus::Process),
            "COMPLETED" => Ok(PhaseStatus::Completed),
            other => Err(format!("Invalid phase status: {}", other)),
        }
    }
}

/// A budgeted sub-deliverable within a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// Milestone ID in format: "milestone::<id>"
    pub id: String,
    pub phase_id: String,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub items: Vec<MilestoneItem>,
}

/// Leaf entity attached to a milestone; carries no allocation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneItem {
    pub name: String,
    pub quantity: u32,
    pub image_url: Option<String>,
}

/// Payload sent to the phase store on create/update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseData {
    pub phase_number: u32,
    pub funding_goal: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: u32,
    pub status: PhaseStatus,
}

/// Payload sent to the milestone store on create/update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneData {
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub items: Vec<MilestoneItem>,
}

/// Keys understood by the settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingType {
    MilestoneValuePercentage,
}

impl SettingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingType::MilestoneValuePercentage => "MILESTONE_VALUE_PERCENTAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePhaseRequest {
    pub project_id: String,
    pub funding_goal: Decimal,
    pub start_date: NaiveDate,
    pub duration_days: u32,
    /// Proceed even when the proposal carries warnings
    #[serde(default)]
    pub confirm_warnings: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePhaseRequest {
    pub project_id: String,
    pub phase_id: String,
    pub funding_goal: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub duration_days: Option<u32>,
    #[serde(default)]
    pub confirm_warnings: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePhaseRequest {
    pub project_id: String,
    pub phase_id: String,
    #[serde(default)]
    pub confirm_warnings: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMilestoneRequest {
    pub project_id: String,
    /// Selected phase; `None` when the form has no phase picked yet
    pub phase_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub items: Vec<MilestoneItem>,
    #[serde(default)]
    pub confirm_warnings: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMilestoneRequest {
    pub project_id: String,
    pub phase_id: String,
    pub milestone_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub items: Option<Vec<MilestoneItem>>,
    #[serde(default)]
    pub confirm_warnings: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMilestoneRequest {
    pub project_id: String,
    pub phase_id: String,
    pub milestone_id: String,
}

/// Funding picture of a project's phases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOverview {
    pub project_id: String,
    pub target_amount: Decimal,
    pub allocated_amount: Decimal,
    pub remaining_amount: Decimal,
    pub required_phase_count: u32,
    pub phases: Vec<Phase>,
}

/// One row of the phase-count policy: projects with a target up to
/// `max_target` (inclusive) need at least `min_phases` phases.
/// The last tier usually has no upper bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseCountTier {
    pub max_target: Option<Decimal>,
    pub min_phases: u32,
}

/// Tunables for the allocation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Used when the settings store cannot provide MILESTONE_VALUE_PERCENTAGE
    pub fallback_milestone_percentage: Decimal,
    pub min_phase_duration_days: u32,
    pub min_phase_gap_days: u32,
    /// Slack allowed when comparing sums for equality
    pub tolerance: Decimal,
    pub phase_count_tiers: Vec<PhaseCountTier>,
    /// Re-fetch-and-retry attempts after the store reports a stale snapshot
    pub max_conflict_retries: u32,
    pub currency_symbol: String,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            fallback_milestone_percentage: Decimal::new(20, 2),
            min_phase_duration_days: 14,
            min_phase_gap_days: 7,
            tolerance: Decimal::new(1, 2),
            phase_count_tiers: vec![
                PhaseCountTier {
                    max_target: Some(Decimal::from(10_000)),
                    min_phases: 1,
                },
                PhaseCountTier {
                    max_target: Some(Decimal::from(100_000)),
                    min_phases: 2,
                },
                PhaseCountTier {
                    max_target: None,
                    min_phases: 3,
                },
            ],
            max_conflict_retries: 2,
            currency_symbol: "$".to_string(),
        }
    }
}
