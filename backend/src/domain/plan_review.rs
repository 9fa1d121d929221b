//! Submission readiness check.
//!
//! The allocators only guard individual mutations and deliberately let a plan
//! sit under-allocated while it is being filled in. Before a project goes up
//! for approval the whole plan is reviewed at once: phase count for the
//! project's size, phase goals summing to the target, sequencing and spacing
//! of every phase, and milestones summing to each phase goal under the cap.

use chrono::NaiveDate;
use log::info;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{AllocationConfig, Milestone, Phase, Project};

use super::errors::AllocationError;
use super::milestone_allocator::{compute_remaining_budget, MilestoneAllocator};
use super::phase_allocator::{resolve_target, PhaseAllocator};
use super::{money, schedule};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanIssue {
    NoPhases,
    TooFewPhases {
        actual: usize,
        required: u32,
    },
    ProjectAllocationMismatch {
        allocated: Decimal,
        target: Decimal,
    },
    DurationTooShort {
        phase_number: u32,
        duration_days: u32,
        min_days: u32,
    },
    EndDateMismatch {
        phase_number: u32,
        expected: NaiveDate,
        actual: NaiveDate,
    },
    /// Dates of this phase cannot be placed on the calendar
    ScheduleOutOfRange {
        phase_number: u32,
    },
    InsufficientGap {
        phase_number: u32,
        start_date: NaiveDate,
        min_start: NaiveDate,
    },
    PhaseAllocationMismatch {
        phase_number: u32,
        allocated: Decimal,
        goal: Decimal,
    },
    MilestoneOverCap {
        phase_number: u32,
        milestone_id: String,
        price: Decimal,
        max_allowed: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReview {
    pub target_amount: Decimal,
    pub allocated_amount: Decimal,
    pub required_phase_count: u32,
    pub issues: Vec<PlanIssue>,
}

impl PlanReview {
    pub fn is_ready(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PlanReviewer {
    config: AllocationConfig,
    phase_allocator: PhaseAllocator,
    milestone_allocator: MilestoneAllocator,
}

impl PlanReviewer {
    pub fn new(config: AllocationConfig) -> Self {
        Self {
            phase_allocator: PhaseAllocator::with_config(config.clone()),
            milestone_allocator: MilestoneAllocator::with_config(config.clone()),
            config,
        }
    }

    pub fn review(
        &self,
        project: &Project,
        phases: &[Phase],
        milestones: &[Milestone],
        max_percentage: Option<Decimal>,
    ) -> Result<PlanReview, AllocationError> {
        let target_amount = resolve_target(project)?;
        let required_phase_count = self.phase_allocator.required_phase_count(target_amount);
        let tolerance = self.config.tolerance;
        let mut issues = Vec::new();

        if phases.is_empty() {
            issues.push(PlanIssue::NoPhases);
        } else if (phases.len() as u32) < required_phase_count {
            issues.push(PlanIssue::TooFewPhases {
                actual: phases.len(),
                required: required_phase_count,
            });
        }

        let allocated_amount = money::sum_amounts(phases.iter().map(|phase| phase.funding_goal));
        if !money::amounts_match(allocated_amount, target_amount, tolerance) {
            issues.push(PlanIssue::ProjectAllocationMismatch {
                allocated: allocated_amount,
                target: target_amount,
            });
        }

        let ordered = schedule::in_sequence(phases);
        let mut previous: Option<&Phase> = None;
        for phase in ordered {
            self.review_phase_dates(phase, previous, &mut issues);
            self.review_milestones(phase, milestones, max_percentage, &mut issues);
            previous = Some(phase);
        }

        info!(
            "Reviewed plan for project {}: {} phases, {} issues",
            project.id,
            phases.len(),
            issues.len()
        );

        Ok(PlanReview {
            target_amount,
            allocated_amount,
            required_phase_count,
            issues,
        })
    }

    fn review_phase_dates(&self, phase: &Phase, previous: Option<&Phase>, issues: &mut Vec<PlanIssue>) {
        if phase.duration_days < self.config.min_phase_duration_days {
            issues.push(PlanIssue::DurationTooShort {
                phase_number: phase.phase_number,
                duration_days: phase.duration_days,
                min_days: self.config.min_phase_duration_days,
            });
        }

        match schedule::end_date(phase.start_date, phase.duration_days) {
            Some(expected) if phase.end_date != expected => issues.push(PlanIssue::EndDateMismatch {
                phase_number: phase.phase_number,
                expected,
                actual: phase.end_date,
            }),
            Some(_) => {}
            None => issues.push(PlanIssue::ScheduleOutOfRange {
                phase_number: phase.phase_number,
            }),
        }

        if let Some(previous) = previous {
            match schedule::after_gap(previous.end_date, self.config.min_phase_gap_days) {
                Some(min_start) if phase.start_date < min_start => issues.push(PlanIssue::InsufficientGap {
                    phase_number: phase.phase_number,
                    start_date: phase.start_date,
                    min_start,
                }),
                Some(_) => {}
                None => issues.push(PlanIssue::ScheduleOutOfRange {
                    phase_number: phase.phase_number,
                }),
            }
        }
    }

    fn review_milestones(
        &self,
        phase: &Phase,
        milestones: &[Milestone],
        max_percentage: Option<Decimal>,
        issues: &mut Vec<PlanIssue>,
    ) {
        let max_allowed = self.milestone_allocator.max_milestone_price(phase, max_percentage);
        for milestone in milestones.iter().filter(|milestone| milestone.phase_id == phase.id) {
            if money::round_currency(milestone.price) > max_allowed {
                issues.push(PlanIssue::MilestoneOverCap {
                    phase_number: phase.phase_number,
                    milestone_id: milestone.id.clone(),
                    price: milestone.price,
                    max_allowed,
                });
            }
        }

        let remaining = compute_remaining_budget(phase, milestones, None);
        if !money::amounts_match(remaining, Decimal::ZERO, self.config.tolerance) {
            issues.push(PlanIssue::PhaseAllocationMismatch {
                phase_number: phase.phase_number,
                allocated: money::round_currency(phase.funding_goal - remaining),
                goal: phase.funding_goal,
            });
        }
    }
}
