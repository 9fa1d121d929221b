//! Mutation gatekeeper.
//!
//! Single choke point consulted by both allocators before they approve a
//! create, update or delete. Editability is derived purely from the snapshot:
//!
//! - a phase (and its milestones and funding figures) is editable only while
//!   its status is `PLAN`
//! - a `SUSPENDED` or `CANCELLED` project freezes everything beneath it,
//!   whatever the phase's own status is
//!
//! The gatekeeper never changes statuses; transitions are driven by the
//! backend.

use log::debug;
use shared::{Milestone, Phase, PhaseStatus, Project, ProjectStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatekeeperError {
    #[error("Phase {phase_number} is {status} and can no longer be edited")]
    PhaseNotEditable {
        phase_id: String,
        phase_number: u32,
        status: PhaseStatus,
    },

    #[error("Project {project_id} is {status}; its phases and milestones are locked")]
    ProjectLocked {
        project_id: String,
        status: ProjectStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// What a mutation touches
#[derive(Debug, Clone, Copy)]
pub enum MutationTarget<'a> {
    /// Adding a phase to the project
    Project,
    Phase(&'a Phase),
    /// `milestone` is `None` when a new milestone is being created
    Milestone {
        milestone: Option<&'a Milestone>,
        phase: &'a Phase,
    },
}

/// A mutation submitted for authorization
#[derive(Debug, Clone, Copy)]
pub struct MutationRequest<'a> {
    pub kind: MutationKind,
    pub project: Option<&'a Project>,
    pub target: MutationTarget<'a>,
}

/// Stateless editability policy
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationGatekeeper;

impl MutationGatekeeper {
    pub fn new() -> Self {
        Self
    }

    pub fn is_phase_editable(&self, phase: &Phase) -> bool {
        phase.status == PhaseStatus::Plan
    }

    pub fn is_milestone_editable(&self, _milestone: &Milestone, owning_phase: &Phase) -> bool {
        self.is_phase_editable(owning_phase)
    }

    /// Whether anything under `project` may change at all
    pub fn is_project_open(&self, project: &Project) -> bool {
        !project.status.is_locked()
    }

    pub fn authorize(&self, request: &MutationRequest<'_>) -> Result<(), GatekeeperError> {
        if let Some(project) = request.project {
            if !self.is_project_open(project) {
                debug!(
                    "Rejecting {:?} on locked project {} ({})",
                    request.kind, project.id, project.status
                );
                return Err(GatekeeperError::ProjectLocked {
                    project_id: project.id.clone(),
                    status: project.status,
                });
            }
        }

        let phase = match request.target {
            MutationTarget::Project => return Ok(()),
            MutationTarget::Phase(phase) => phase,
            MutationTarget::Milestone { phase, .. } => phase,
        };

        if !self.is_phase_editable(phase) {
            debug!(
                "Rejecting {:?} on phase {} with status {}",
                request.kind, phase.id, phase.status
            );
            return Err(GatekeeperError::PhaseNotEditable {
                phase_id: phase.id.clone(),
                phase_number: phase.phase_number,
                status: phase.status,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn project(status: ProjectStatus) -> Project {
        Project {
            id: "project::1".to_string(),
            title: "Solar kiosk".to_string(),
            total_target_amount: Some(Decimal::from(10000)),
            status,
        }
    }

    fn phase(status: PhaseStatus) -> Phase {
        let start = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap();
        Phase {
            id: "phase::1".to_string(),
            project_id: "project::1".to_string(),
            phase_number: 1,
            funding_goal: Decimal::from(5000),
            start_date: start,
            end_date: start + chrono::Duration::days(14),
            duration_days: 14,
            status,
        }
    }

    fn milestone() -> Milestone {
        Milestone {
            id: "milestone::1".to_string(),
            phase_id: "phase::1".to_string(),
            title: "Prototype".to_string(),
            description: String::new(),
            price: Decimal::from(500),
            items: vec![],
        }
    }

    #[test]
    fn test_only_plan_phases_are_editable() {
        let gatekeeper = MutationGatekeeper::new();
        assert!(gatekeeper.is_phase_editable(&phase(PhaseStatus::Plan)));
        assert!(!gatekeeper.is_phase_editable(&phase(PhaseStatus::Process)));
        assert!(!gatekeeper.is_phase_editable(&phase(PhaseStatus::Completed)));
    }

    #[test]
    fn test_milestone_editability_follows_phase() {
        let gatekeeper = MutationGatekeeper::new();
        assert!(gatekeeper.is_milestone_editable(&milestone(), &phase(PhaseStatus::Plan)));
        assert!(!gatekeeper.is_milestone_editable(&milestone(), &phase(PhaseStatus::Process)));
    }

    #[test]
    fn test_authorize_rejects_process_phase_every_time() {
        let gatekeeper = MutationGatekeeper::new();
        let project = project(ProjectStatus::Fundraising);
        let phase = phase(PhaseStatus::Process);
        let existing = milestone();
        let request = MutationRequest {
            kind: MutationKind::Update,
            project: Some(&project),
            target: MutationTarget::Milestone {
                milestone: Some(&existing),
                phase: &phase,
            },
        };

        let first = gatekeeper.authorize(&request);
        let second = gatekeeper.authorize(&request);
        assert!(matches!(first, Err(GatekeeperError::PhaseNotEditable { .. })));
        assert_eq!(first, second);
    }

    #[test]
    fn test_locked_project_overrides_plan_phase() {
        let gatekeeper = MutationGatekeeper::new();
        let phase = phase(PhaseStatus::Plan);
        for status in [ProjectStatus::Suspended, ProjectStatus::Cancelled] {
            let project = project(status);
            let request = MutationRequest {
                kind: MutationKind::Delete,
                project: Some(&project),
                target: MutationTarget::Phase(&phase),
            };
            assert_eq!(
                gatekeeper.authorize(&request),
                Err(GatekeeperError::ProjectLocked {
                    project_id: "project::1".to_string(),
                    status,
                })
            );
        }
    }

    #[test]
    fn test_creating_phase_only_checks_project() {
        let gatekeeper = MutationGatekeeper::new();
        let open = project(ProjectStatus::Draft);
        let request = MutationRequest {
            kind: MutationKind::Create,
            project: Some(&open),
            target: MutationTarget::Project,
        };
        assert!(gatekeeper.authorize(&request).is_ok());
    }
}
