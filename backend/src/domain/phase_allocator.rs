//! Phase allocation.
//!
//! Partitions a project's funding target across an ordered sequence of
//! time-boxed phases. Every proposal is validated against the snapshot the
//! caller passes in; nothing here performs I/O or mutates the snapshot.
//!
//! ## Rules
//!
//! - A phase runs at least `min_phase_duration_days` (14) days
//! - Consecutive phases are separated by at least `min_phase_gap_days` (7);
//!   the first phase cannot start earlier than today plus that gap
//! - The sum of all phase goals never exceeds the project target, and equals
//!   it (within tolerance) once planning is complete
//! - Only `PLAN` phases of an unlocked project can change

use chrono::{Local, NaiveDate};
use log::{debug, info};
use rust_decimal::Decimal;
use shared::{AllocationConfig, Phase, PhaseStatus, Project};

use super::errors::{ensure_non_negative, AllocationError, AllocationWarning, EngineFault, Proposal};
use super::gatekeeper::{MutationGatekeeper, MutationKind, MutationRequest, MutationTarget};
use super::models::{NormalizedPhase, PhaseCandidate, PhaseChanges, PhaseRemovalPlan, PhaseRenumbering};
use super::{money, schedule};

#[derive(Debug, Clone)]
pub struct PhaseAllocator {
    config: AllocationConfig,
    gatekeeper: MutationGatekeeper,
    today: Option<NaiveDate>,
}

impl Default for PhaseAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseAllocator {
    pub fn new() -> Self {
        Self::with_config(AllocationConfig::default())
    }

    pub fn with_config(config: AllocationConfig) -> Self {
        Self {
            config,
            gatekeeper: MutationGatekeeper::new(),
            today: None,
        }
    }

    /// Pin "today" instead of reading the local clock
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Earliest start date for the next phase appended to `existing_phases`
    ///
    /// That is the gap after the latest existing end date, or the gap after
    /// today when there are no phases yet.
    pub fn min_allowed_start(&self, existing_phases: &[Phase]) -> Result<NaiveDate, AllocationError> {
        let anchor = existing_phases
            .iter()
            .map(|phase| phase.end_date)
            .max()
            .unwrap_or_else(|| self.today());
        shift_forward(anchor, self.config.min_phase_gap_days)
    }

    /// Minimum number of phases a project of this size must be split into
    pub fn required_phase_count(&self, total_target: Decimal) -> u32 {
        self.config
            .phase_count_tiers
            .iter()
            .find(|tier| tier.max_target.map_or(true, |max| total_target <= max))
            .map(|tier| tier.min_phases)
            .unwrap_or(1)
    }

    /// Validate a new phase appended to the end of the sequence
    pub fn propose_add_phase(
        &self,
        project: &Project,
        existing_phases: &[Phase],
        candidate: &PhaseCandidate,
    ) -> Result<Proposal<NormalizedPhase>, AllocationError> {
        info!("Proposing new phase for project {}: {:?}", project.id, candidate);

        check_snapshot(existing_phases)?;
        ensure_non_negative("Candidate phase", candidate.funding_goal)?;

        self.gatekeeper.authorize(&MutationRequest {
            kind: MutationKind::Create,
            project: Some(project),
            target: MutationTarget::Project,
        })?;

        let funding_goal = money::round_currency(candidate.funding_goal);
        if funding_goal.is_zero() {
            return Err(AllocationError::MissingRequiredField { field: "funding_goal" });
        }
        self.check_duration(candidate.duration_days)?;

        let min_allowed_start = self.min_allowed_start(existing_phases)?;
        if candidate.start_date < min_allowed_start {
            return Err(AllocationError::StartDateTooEarly {
                start_date: candidate.start_date,
                min_allowed_start,
            });
        }
        let end_date = phase_end(candidate.start_date, candidate.duration_days)?;

        let target = resolve_target(project)?;
        let existing_total = money::sum_amounts(existing_phases.iter().map(|phase| phase.funding_goal));
        let new_total = money::round_currency(existing_total + funding_goal);
        if new_total > target {
            return Err(AllocationError::ExceedsProjectTarget {
                new_total,
                target,
                max_allowed: money::headroom(target, existing_total),
            });
        }

        let normalized = NormalizedPhase {
            id: None,
            phase_number: next_phase_number(existing_phases),
            funding_goal,
            start_date: candidate.start_date,
            end_date,
            duration_days: candidate.duration_days,
            status: PhaseStatus::Plan,
        };

        let mut proposal = Proposal::new(normalized);
        // An under-funded plan is only tolerated (with confirmation) for the very first phase
        if existing_phases.is_empty() && new_total < target {
            proposal = proposal.with_warning(partial_allocation(new_total, target));
        }

        debug!(
            "Phase {} approved: {} of {} allocated",
            proposal.value.phase_number, new_total, target
        );
        Ok(proposal)
    }

    /// Validate changes to an existing phase. The phase's old goal is left out
    /// of the project total and the new one substituted.
    pub fn propose_update_phase(
        &self,
        project: &Project,
        existing_phases: &[Phase],
        phase_id: &str,
        changes: &PhaseChanges,
    ) -> Result<Proposal<NormalizedPhase>, AllocationError> {
        info!("Proposing update of phase {}: {:?}", phase_id, changes);

        let current = find_phase(existing_phases, phase_id)?;
        check_snapshot(existing_phases)?;
        if let Some(goal) = changes.funding_goal {
            ensure_non_negative("Phase update", goal)?;
        }

        self.gatekeeper.authorize(&MutationRequest {
            kind: MutationKind::Update,
            project: Some(project),
            target: MutationTarget::Phase(current),
        })?;

        let funding_goal = money::round_currency(changes.funding_goal.unwrap_or(current.funding_goal));
        if funding_goal.is_zero() {
            return Err(AllocationError::MissingRequiredField { field: "funding_goal" });
        }
        let duration_days = changes.duration_days.unwrap_or(current.duration_days);
        self.check_duration(duration_days)?;

        let start_date = changes.start_date.unwrap_or(current.start_date);
        let end_date = phase_end(start_date, duration_days)?;
        let gap = self.config.min_phase_gap_days;

        let others: Vec<&Phase> = existing_phases
            .iter()
            .filter(|phase| phase.id != current.id)
            .collect();
        let predecessor = others
            .iter()
            .filter(|phase| phase.phase_number < current.phase_number)
            .max_by_key(|phase| phase.phase_number);
        let successor = others
            .iter()
            .filter(|phase| phase.phase_number > current.phase_number)
            .min_by_key(|phase| phase.phase_number);

        let min_allowed_start = match predecessor {
            Some(previous) => Some(shift_forward(previous.end_date, gap)?),
            // The first phase only re-checks "today + gap" when its start moves
            None if changes.start_date.is_some() => Some(shift_forward(self.today(), gap)?),
            None => None,
        };
        if let Some(min_allowed_start) = min_allowed_start {
            if start_date < min_allowed_start {
                return Err(AllocationError::StartDateTooEarly {
                    start_date,
                    min_allowed_start,
                });
            }
        }

        if let Some(next) = successor {
            let latest_allowed_end = schedule::latest_allowed_end(next.start_date, gap).ok_or(
                AllocationError::DateOutOfRange {
                    date: next.start_date,
                    days: gap,
                },
            )?;
            if end_date > latest_allowed_end {
                return Err(AllocationError::ConflictsWithNextPhase {
                    end_date,
                    next_phase_number: next.phase_number,
                    latest_allowed_end,
                });
            }
        }

        let target = resolve_target(project)?;
        let others_total = money::sum_amounts(others.iter().map(|phase| phase.funding_goal));
        let new_total = money::round_currency(others_total + funding_goal);
        if new_total > target {
            return Err(AllocationError::ExceedsProjectTarget {
                new_total,
                target,
                max_allowed: money::headroom(target, others_total),
            });
        }

        let normalized = NormalizedPhase {
            id: Some(current.id.clone()),
            phase_number: current.phase_number,
            funding_goal,
            start_date,
            end_date,
            duration_days,
            status: current.status,
        };

        let mut proposal = Proposal::new(normalized);
        if others.is_empty() && new_total < target {
            proposal = proposal.with_warning(partial_allocation(new_total, target));
        }
        Ok(proposal)
    }

    /// Check whether a phase may be removed and describe the resulting plan
    pub fn propose_remove_phase(
        &self,
        project: &Project,
        existing_phases: &[Phase],
        phase_id: &str,
    ) -> Result<Proposal<PhaseRemovalPlan>, AllocationError> {
        info!("Proposing removal of phase {} from project {}", phase_id, project.id);

        let removed = find_phase(existing_phases, phase_id)?;
        check_snapshot(existing_phases)?;

        self.gatekeeper.authorize(&MutationRequest {
            kind: MutationKind::Delete,
            project: Some(project),
            target: MutationTarget::Phase(removed),
        })?;

        let target = resolve_target(project)?;
        let remaining: Vec<&Phase> = schedule::in_sequence(existing_phases)
            .into_iter()
            .filter(|phase| phase.id != removed.id)
            .collect();
        let remaining_total = money::sum_amounts(remaining.iter().map(|phase| phase.funding_goal));

        let renumbered = plan_renumbering(remaining.iter().copied());

        let mut proposal = Proposal::new(PhaseRemovalPlan {
            phase_id: removed.id.clone(),
            remaining_total,
            remaining_count: remaining.len(),
            renumbered,
        });

        if !remaining.is_empty() && remaining_total < target {
            proposal = proposal.with_warning(AllocationWarning::RemovalUnderfundsProject {
                remaining_total,
                target,
                shortfall: money::headroom(target, remaining_total),
            });
        }
        Ok(proposal)
    }

    fn check_duration(&self, duration_days: u32) -> Result<(), AllocationError> {
        if duration_days < self.config.min_phase_duration_days {
            return Err(AllocationError::DurationTooShort {
                duration_days,
                min_days: self.config.min_phase_duration_days,
            });
        }
        Ok(())
    }
}

/// Moves that make phase numbers contiguous from 1, given phases already
/// in sequence
pub fn plan_renumbering<'a>(ordered: impl IntoIterator<Item = &'a Phase>) -> Vec<PhaseRenumbering> {
    ordered
        .into_iter()
        .enumerate()
        .filter_map(|(index, phase)| {
            let to = index as u32 + 1;
            (phase.phase_number != to).then(|| PhaseRenumbering {
                phase_id: phase.id.clone(),
                from: phase.phase_number,
                to,
            })
        })
        .collect()
}

/// The project's target, rounded; absent targets cannot be validated against
pub(crate) fn resolve_target(project: &Project) -> Result<Decimal, AllocationError> {
    let target = project
        .total_target_amount
        .ok_or_else(|| AllocationError::TargetAmountUnavailable {
            project_id: project.id.clone(),
        })?;
    ensure_non_negative(format!("Project {}", project.id), target)?;
    Ok(money::round_currency(target))
}

fn phase_end(start_date: NaiveDate, duration_days: u32) -> Result<NaiveDate, AllocationError> {
    schedule::end_date(start_date, duration_days).ok_or(AllocationError::DateOutOfRange {
        date: start_date,
        days: duration_days,
    })
}

fn shift_forward(date: NaiveDate, gap_days: u32) -> Result<NaiveDate, AllocationError> {
    schedule::after_gap(date, gap_days).ok_or(AllocationError::DateOutOfRange { date, days: gap_days })
}

/// Numbers keep growing past gaps left by an interrupted renumbering, so a
/// new phase never collides with an existing one
fn next_phase_number(phases: &[Phase]) -> u32 {
    phases
        .iter()
        .map(|phase| phase.phase_number)
        .max()
        .unwrap_or(0)
        + 1
}

fn find_phase<'a>(phases: &'a [Phase], phase_id: &str) -> Result<&'a Phase, AllocationError> {
    phases
        .iter()
        .find(|phase| phase.id == phase_id)
        .ok_or_else(|| AllocationError::PhaseNotFound(phase_id.to_string()))
}

/// Reject snapshots that no store should ever return
fn check_snapshot(phases: &[Phase]) -> Result<(), AllocationError> {
    for phase in phases {
        ensure_non_negative(format!("Phase {}", phase.id), phase.funding_goal)?;
        if phase.end_date < phase.start_date {
            return Err(EngineFault::InconsistentDates {
                what: format!("Phase {}", phase.id),
            }
            .into());
        }
    }
    Ok(())
}

fn partial_allocation(allocated: Decimal, target: Decimal) -> AllocationWarning {
    AllocationWarning::PartialAllocation {
        allocated,
        target,
        remaining: money::headroom(target, allocated),
    }
}
