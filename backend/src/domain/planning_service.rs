//! Planning service.
//!
//! Ties the allocators to the remote store. Every mutation follows the same
//! sequence:
//!
//! 1. Fetch the authoritative snapshot (project, phases, milestones)
//! 2. Run the matching allocator against it
//! 3. Stop with `NeedsConfirmation` if the proposal carries warnings the
//!    caller has not confirmed
//! 4. Persist the approved mutation
//! 5. Re-fetch and hand back the fresh snapshot
//!
//! When the store rejects a write as stale (`StorageError::Conflict`) the
//! whole sequence is replayed, up to `max_conflict_retries` times. Phase
//! removal is split in two retryable steps (delete, then renumber the rest)
//! so an interrupted renumbering never replays the delete.

use anyhow::Result;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use shared::{
    AllocationConfig, CreateMilestoneRequest, CreatePhaseRequest, DeleteMilestoneRequest,
    DeletePhaseRequest, Milestone, Phase, PhaseData, PhaseOverview, Project, UpdateMilestoneRequest,
    UpdatePhaseRequest,
};
use std::future::Future;
use std::sync::Arc;

use super::errors::{AllocationError, AllocationWarning, Proposal};
use super::milestone_allocator::{compute_remaining_budget, MilestoneAllocator};
use super::models::{MilestoneCandidate, MilestoneChanges, PhaseCandidate, PhaseChanges};
use super::{money, schedule};
use super::phase_allocator::{plan_renumbering, resolve_target, PhaseAllocator};
use super::plan_review::{PlanReview, PlanReviewer};
use super::settings_service::SettingsService;
use crate::storage::{MilestoneStorage, PhaseStorage, ProjectStorage, SettingsStorage, StorageError};

/// Result of a mutation request
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    Applied(AppliedMutation<T>),
    /// Nothing was written; resend with `confirm_warnings` to proceed
    NeedsConfirmation { warnings: Vec<AllocationWarning> },
}

impl<T> MutationOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<AppliedMutation<T>> {
        match self {
            MutationOutcome::Applied(applied) => Some(applied),
            MutationOutcome::NeedsConfirmation { .. } => None,
        }
    }

    pub fn warnings(&self) -> &[AllocationWarning] {
        match self {
            MutationOutcome::Applied(applied) => &applied.warnings,
            MutationOutcome::NeedsConfirmation { warnings } => warnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMutation<T> {
    pub result: T,
    /// Warnings the caller confirmed
    pub warnings: Vec<AllocationWarning>,
    pub success_message: String,
}

/// Phase written (if any) plus the project's refreshed phase list
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMutation {
    pub phase: Option<Phase>,
    pub phases: Vec<Phase>,
}

/// Milestone written (if any) plus the phase's refreshed milestone list
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneMutation {
    pub milestone: Option<Milestone>,
    pub milestones: Vec<Milestone>,
}

#[derive(Clone)]
pub struct PlanningService {
    projects: Arc<dyn ProjectStorage>,
    phases: Arc<dyn PhaseStorage>,
    milestones: Arc<dyn MilestoneStorage>,
    settings_service: SettingsService,
    phase_allocator: PhaseAllocator,
    milestone_allocator: MilestoneAllocator,
    plan_reviewer: PlanReviewer,
    config: AllocationConfig,
}

impl PlanningService {
    pub fn new(
        config: AllocationConfig,
        projects: Arc<dyn ProjectStorage>,
        phases: Arc<dyn PhaseStorage>,
        milestones: Arc<dyn MilestoneStorage>,
        settings: Arc<dyn SettingsStorage>,
    ) -> Self {
        Self {
            projects,
            phases,
            milestones,
            settings_service: SettingsService::new(settings, config.clone()),
            phase_allocator: PhaseAllocator::with_config(config.clone()),
            milestone_allocator: MilestoneAllocator::with_config(config.clone()),
            plan_reviewer: PlanReviewer::new(config.clone()),
            config,
        }
    }

    /// Pin the date phase scheduling treats as today
    pub fn with_today(mut self, today: chrono::NaiveDate) -> Self {
        self.phase_allocator = self.phase_allocator.with_today(today);
        self
    }

    pub async fn add_phase(&self, request: CreatePhaseRequest) -> Result<MutationOutcome<PhaseMutation>> {
        info!("Adding phase: {:?}", request);
        self.with_conflict_retry("Add phase", || self.try_add_phase(&request))
            .await
    }

    pub async fn update_phase(&self, request: UpdatePhaseRequest) -> Result<MutationOutcome<PhaseMutation>> {
        info!("Updating phase: {:?}", request);
        self.with_conflict_retry("Update phase", || self.try_update_phase(&request))
            .await
    }

    pub async fn remove_phase(&self, request: DeletePhaseRequest) -> Result<MutationOutcome<PhaseMutation>> {
        info!("Removing phase: {:?}", request);
        let warnings = match self
            .with_conflict_retry("Remove phase", || self.try_remove_phase(&request))
            .await?
        {
            MutationOutcome::Applied(applied) => applied.warnings,
            MutationOutcome::NeedsConfirmation { warnings } => {
                return Ok(MutationOutcome::NeedsConfirmation { warnings })
            }
        };

        // The delete is done; renumbering retries against its own fresh
        // snapshot so a stale write never replays the delete
        let renumbered = self
            .with_conflict_retry("Renumber phases", || self.renumber_phases(&request.project_id))
            .await?;
        info!(
            "Removed phase {} from project {}; {} phases renumbered",
            request.phase_id, request.project_id, renumbered
        );

        let phases = self.phases.get_phases_by_project(&request.project_id).await?;
        Ok(applied(
            PhaseMutation { phase: None, phases },
            warnings,
            "Phase removed successfully".to_string(),
        ))
    }

    pub async fn add_milestone(
        &self,
        request: CreateMilestoneRequest,
    ) -> Result<MutationOutcome<MilestoneMutation>> {
        info!("Adding milestone: {:?}", request);
        self.with_conflict_retry("Add milestone", || self.try_add_milestone(&request))
            .await
    }

    pub async fn update_milestone(
        &self,
        request: UpdateMilestoneRequest,
    ) -> Result<MutationOutcome<MilestoneMutation>> {
        info!("Updating milestone: {:?}", request);
        self.with_conflict_retry("Update milestone", || self.try_update_milestone(&request))
            .await
    }

    pub async fn remove_milestone(
        &self,
        request: DeleteMilestoneRequest,
    ) -> Result<MutationOutcome<MilestoneMutation>> {
        info!("Removing milestone: {:?}", request);
        self.with_conflict_retry("Remove milestone", || self.try_remove_milestone(&request))
            .await
    }

    /// Phases of a project with the allocated and unallocated share of its target
    pub async fn phase_overview(&self, project_id: &str) -> Result<PhaseOverview> {
        let project = self.load_project(project_id).await?;
        let target_amount = resolve_target(&project)?;
        let phases = self.phases.get_phases_by_project(&project.id).await?;
        let allocated_amount = money::sum_amounts(phases.iter().map(|phase| phase.funding_goal));

        Ok(PhaseOverview {
            project_id: project.id,
            target_amount,
            allocated_amount,
            remaining_amount: money::headroom(target_amount, allocated_amount),
            required_phase_count: self.phase_allocator.required_phase_count(target_amount),
            phases,
        })
    }

    /// Budget of a phase not yet assigned to milestones, optionally ignoring
    /// the milestone being edited
    pub async fn remaining_budget(
        &self,
        project_id: &str,
        phase_id: &str,
        excluding_milestone_id: Option<&str>,
    ) -> Result<Decimal> {
        let phases = self.phases.get_phases_by_project(project_id).await?;
        let phase = find_phase(&phases, phase_id)?;
        let milestones = self.milestones.get_milestones_by_phase(&phase.id).await?;
        Ok(compute_remaining_budget(phase, &milestones, excluding_milestone_id))
    }

    /// Full-plan readiness check before submission
    pub async fn review_plan(&self, project_id: &str) -> Result<PlanReview> {
        let project = self.load_project(project_id).await?;
        let phases = self.phases.get_phases_by_project(&project.id).await?;
        let mut milestones = Vec::new();
        for phase in &phases {
            milestones.extend(self.milestones.get_milestones_by_phase(&phase.id).await?);
        }
        let max_percentage = self.settings_service.max_milestone_percentage().await;

        Ok(self
            .plan_reviewer
            .review(&project, &phases, &milestones, Some(max_percentage))?)
    }

    async fn try_add_phase(&self, request: &CreatePhaseRequest) -> Result<MutationOutcome<PhaseMutation>> {
        let project = self.load_project(&request.project_id).await?;
        let phases = self.phases.get_phases_by_project(&project.id).await?;

        let candidate = PhaseCandidate {
            funding_goal: request.funding_goal,
            start_date: request.start_date,
            duration_days: request.duration_days,
        };
        let proposal = self
            .phase_allocator
            .propose_add_phase(&project, &phases, &candidate)?;
        if let Some(outcome) = needs_confirmation(&proposal, request.confirm_warnings) {
            return Ok(outcome);
        }

        let created = self
            .phases
            .create_phase(&project.id, &proposal.value.to_phase_data())
            .await?;
        info!("Created phase {} for project {}", created.id, project.id);

        let success_message = format!(
            "Phase {} created with a funding goal of {}",
            created.phase_number,
            self.format_amount(created.funding_goal)
        );
        let phases = self.phases.get_phases_by_project(&project.id).await?;
        Ok(applied(
            PhaseMutation {
                phase: Some(created),
                phases,
            },
            proposal.warnings,
            success_message,
        ))
    }

    async fn try_update_phase(&self, request: &UpdatePhaseRequest) -> Result<MutationOutcome<PhaseMutation>> {
        let project = self.load_project(&request.project_id).await?;
        let phases = self.phases.get_phases_by_project(&project.id).await?;

        let changes = PhaseChanges {
            funding_goal: request.funding_goal,
            start_date: request.start_date,
            duration_days: request.duration_days,
        };
        let proposal = self
            .phase_allocator
            .propose_update_phase(&project, &phases, &request.phase_id, &changes)?;
        if let Some(outcome) = needs_confirmation(&proposal, request.confirm_warnings) {
            return Ok(outcome);
        }

        let updated = self
            .phases
            .update_phase(&request.phase_id, &proposal.value.to_phase_data())
            .await?;
        info!("Updated phase {}", updated.id);

        let success_message = format!(
            "Phase {} updated; funding goal is now {}",
            updated.phase_number,
            self.format_amount(updated.funding_goal)
        );
        let phases = self.phases.get_phases_by_project(&project.id).await?;
        Ok(applied(
            PhaseMutation {
                phase: Some(updated),
                phases,
            },
            proposal.warnings,
            success_message,
        ))
    }

    async fn try_remove_phase(&self, request: &DeletePhaseRequest) -> Result<MutationOutcome<()>> {
        let project = self.load_project(&request.project_id).await?;
        let phases = self.phases.get_phases_by_project(&project.id).await?;

        let proposal = self
            .phase_allocator
            .propose_remove_phase(&project, &phases, &request.phase_id)?;
        if let Some(outcome) = needs_confirmation(&proposal, request.confirm_warnings) {
            return Ok(outcome);
        }

        self.phases.delete_phase(&request.phase_id).await?;
        debug!(
            "Deleted phase {}; {} phases to renumber",
            request.phase_id,
            proposal.value.renumbered.len()
        );
        Ok(applied((), proposal.warnings, String::new()))
    }

    /// Close gaps in the project's phase numbering, lowest number first so
    /// no two phases ever share a number. Returns how many phases moved.
    async fn renumber_phases(&self, project_id: &str) -> Result<usize> {
        let phases = self.phases.get_phases_by_project(project_id).await?;
        let renumbering = plan_renumbering(schedule::in_sequence(&phases));
        for step in &renumbering {
            let phase = find_phase(&phases, &step.phase_id)?;
            let data = PhaseData {
                phase_number: step.to,
                funding_goal: phase.funding_goal,
                start_date: phase.start_date,
                end_date: phase.end_date,
                duration_days: phase.duration_days,
                status: phase.status,
            };
            self.phases.update_phase(&phase.id, &data).await?;
        }
        Ok(renumbering.len())
    }

    async fn try_add_milestone(
        &self,
        request: &CreateMilestoneRequest,
    ) -> Result<MutationOutcome<MilestoneMutation>> {
        let project = self.load_project(&request.project_id).await?;
        let phases = self.phases.get_phases_by_project(&project.id).await?;
        let phase = match &request.phase_id {
            Some(phase_id) => Some(find_phase(&phases, phase_id)?),
            None => None,
        };
        let existing = match phase {
            Some(phase) => self.milestones.get_milestones_by_phase(&phase.id).await?,
            None => Vec::new(),
        };
        let max_percentage = self.settings_service.max_milestone_percentage().await;

        let candidate = MilestoneCandidate {
            title: request.title.clone(),
            description: request.description.clone(),
            price: request.price,
            items: request.items.clone(),
        };
        let proposal = self.milestone_allocator.propose_add_milestone(
            &project,
            phase,
            &existing,
            &candidate,
            Some(max_percentage),
        )?;
        if let Some(outcome) = needs_confirmation(&proposal, request.confirm_warnings) {
            return Ok(outcome);
        }

        let phase_id = proposal.value.phase_id.clone();
        let created = self
            .milestones
            .create_milestone(&phase_id, &proposal.value.to_milestone_data())
            .await?;
        info!("Created milestone {} in phase {}", created.id, phase_id);

        let success_message = format!(
            "Milestone '{}' created; {} left to allocate in this phase",
            created.title,
            self.format_amount(proposal.value.remaining_budget)
        );
        let milestones = self.milestones.get_milestones_by_phase(&phase_id).await?;
        Ok(applied(
            MilestoneMutation {
                milestone: Some(created),
                milestones,
            },
            proposal.warnings,
            success_message,
        ))
    }

    async fn try_update_milestone(
        &self,
        request: &UpdateMilestoneRequest,
    ) -> Result<MutationOutcome<MilestoneMutation>> {
        let project = self.load_project(&request.project_id).await?;
        let phases = self.phases.get_phases_by_project(&project.id).await?;
        let phase = find_phase(&phases, &request.phase_id)?;
        let existing = self.milestones.get_milestones_by_phase(&phase.id).await?;
        let max_percentage = self.settings_service.max_milestone_percentage().await;

        let changes = MilestoneChanges {
            title: request.title.clone(),
            description: request.description.clone(),
            price: request.price,
            items: request.items.clone(),
        };
        let proposal = self.milestone_allocator.propose_update_milestone(
            &project,
            phase,
            &existing,
            &request.milestone_id,
            &changes,
            Some(max_percentage),
        )?;
        if let Some(outcome) = needs_confirmation(&proposal, request.confirm_warnings) {
            return Ok(outcome);
        }

        let updated = self
            .milestones
            .update_milestone(&request.milestone_id, &proposal.value.to_milestone_data())
            .await?;
        info!("Updated milestone {}", updated.id);

        let success_message = format!(
            "Milestone '{}' updated; {} left to allocate in this phase",
            updated.title,
            self.format_amount(proposal.value.remaining_budget)
        );
        let milestones = self.milestones.get_milestones_by_phase(&phase.id).await?;
        Ok(applied(
            MilestoneMutation {
                milestone: Some(updated),
                milestones,
            },
            proposal.warnings,
            success_message,
        ))
    }

    async fn try_remove_milestone(
        &self,
        request: &DeleteMilestoneRequest,
    ) -> Result<MutationOutcome<MilestoneMutation>> {
        let project = self.load_project(&request.project_id).await?;
        let phases = self.phases.get_phases_by_project(&project.id).await?;
        let phase = find_phase(&phases, &request.phase_id)?;
        let existing = self.milestones.get_milestones_by_phase(&phase.id).await?;

        let proposal = self.milestone_allocator.propose_remove_milestone(
            &project,
            phase,
            &existing,
            &request.milestone_id,
        )?;

        self.milestones.delete_milestone(&request.milestone_id).await?;
        info!(
            "Removed milestone {}; {} left to allocate in phase {}",
            request.milestone_id, proposal.value.remaining_budget, phase.id
        );

        let milestones = self.milestones.get_milestones_by_phase(&phase.id).await?;
        Ok(applied(
            MilestoneMutation {
                milestone: None,
                milestones,
            },
            proposal.warnings,
            format!(
                "Milestone removed; {} left to allocate in this phase",
                self.format_amount(proposal.value.remaining_budget)
            ),
        ))
    }

    fn format_amount(&self, amount: Decimal) -> String {
        money::format_amount(&self.config.currency_symbol, amount)
    }

    /// Fetch the project; a failed fetch leaves the target amount unknown
    async fn load_project(&self, project_id: &str) -> Result<Project> {
        match self.projects.get_project_by_id(project_id).await {
            Ok(Some(project)) => Ok(project),
            Ok(None) => Err(StorageError::NotFound {
                entity: "Project",
                id: project_id.to_string(),
            }
            .into()),
            Err(e) => {
                error!("Failed to fetch project {}: {}", project_id, e);
                Err(AllocationError::TargetAmountUnavailable {
                    project_id: project_id.to_string(),
                }
                .into())
            }
        }
    }

    async fn with_conflict_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if StorageError::is_conflict(&e) && retries < self.config.max_conflict_retries => {
                    retries += 1;
                    warn!(
                        "{} hit a stale snapshot ({}); re-fetching, retry {}/{}",
                        operation, e, retries, self.config.max_conflict_retries
                    );
                }
                result => return result,
            }
        }
    }
}

fn find_phase<'a>(phases: &'a [Phase], phase_id: &str) -> Result<&'a Phase, AllocationError> {
    phases
        .iter()
        .find(|phase| phase.id == phase_id)
        .ok_or_else(|| AllocationError::PhaseNotFound(phase_id.to_string()))
}

fn needs_confirmation<T, U>(proposal: &Proposal<T>, confirmed: bool) -> Option<MutationOutcome<U>> {
    if proposal.has_warnings() && !confirmed {
        info!("Proposal needs confirmation: {} warnings", proposal.warnings.len());
        return Some(MutationOutcome::NeedsConfirmation {
            warnings: proposal.warnings.clone(),
        });
    }
    None
}

fn applied<T>(result: T, warnings: Vec<AllocationWarning>, success_message: String) -> MutationOutcome<T> {
    MutationOutcome::Applied(AppliedMutation {
        result,
        warnings,
        success_message,
    })
}
