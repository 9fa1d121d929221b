//! Milestone allocation.
//!
//! Partitions a phase's funding goal across its milestones. Each milestone is
//! capped at a share of the phase goal (`MILESTONE_VALUE_PERCENTAGE`, 20% when
//! the setting cannot be read), and the milestones together may never exceed
//! the goal. Under-allocation is allowed while the plan is being filled in
//! and comes back as a warning.

use log::{debug, info, warn};
use rust_decimal::Decimal;
use shared::{AllocationConfig, Milestone, MilestoneItem, Phase, Project};

use super::errors::{ensure_non_negative, AllocationError, AllocationWarning, Proposal};
use super::gatekeeper::{MutationGatekeeper, MutationKind, MutationRequest, MutationTarget};
use super::models::{MilestoneCandidate, MilestoneChanges, MilestoneRemovalPlan, NormalizedMilestone};
use super::money;

#[derive(Debug, Clone)]
pub struct MilestoneAllocator {
    config: AllocationConfig,
    gatekeeper: MutationGatekeeper,
}

impl Default for MilestoneAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl MilestoneAllocator {
    pub fn new() -> Self {
        Self::with_config(AllocationConfig::default())
    }

    pub fn with_config(config: AllocationConfig) -> Self {
        Self {
            config,
            gatekeeper: MutationGatekeeper::new(),
        }
    }

    /// The cap ratio to use. Missing or out-of-range values fall back to the
    /// configured default; settings trouble never blocks allocation.
    pub fn resolve_max_percentage(&self, max_percentage: Option<Decimal>) -> Decimal {
        let fallback = self.config.fallback_milestone_percentage;
        match max_percentage {
            Some(ratio) if ratio > Decimal::ZERO && ratio <= Decimal::ONE => ratio,
            Some(ratio) => {
                warn!("Milestone percentage {} is out of range, using {}", ratio, fallback);
                fallback
            }
            None => {
                warn!("Milestone percentage unavailable, using {}", fallback);
                fallback
            }
        }
    }

    /// Highest price a single milestone of `phase` may carry
    pub fn max_milestone_price(&self, phase: &Phase, max_percentage: Option<Decimal>) -> Decimal {
        money::share_of(phase.funding_goal, self.resolve_max_percentage(max_percentage))
    }

    pub fn propose_add_milestone(
        &self,
        project: &Project,
        phase: Option<&Phase>,
        existing_milestones: &[Milestone],
        candidate: &MilestoneCandidate,
        max_percentage: Option<Decimal>,
    ) -> Result<Proposal<NormalizedMilestone>, AllocationError> {
        info!("Proposing milestone '{}' for project {}", candidate.title, project.id);

        let title = candidate.title.trim();
        if title.is_empty() {
            return Err(AllocationError::MissingRequiredField { field: "title" });
        }
        let phase = phase.ok_or(AllocationError::MissingRequiredField { field: "phase" })?;
        let items = normalize_items(&candidate.items)?;

        ensure_non_negative("Candidate milestone", candidate.price)?;
        check_snapshot(phase, existing_milestones)?;

        self.gatekeeper.authorize(&MutationRequest {
            kind: MutationKind::Create,
            project: Some(project),
            target: MutationTarget::Milestone {
                milestone: None,
                phase,
            },
        })?;

        let price = money::round_currency(candidate.price);
        self.check_cap(phase, price, max_percentage)?;

        let existing_total = allocated_total(phase, existing_milestones, None);
        let proposal = self.check_phase_total(phase, existing_total, price)?;

        Ok(proposal.map_value(|remaining_budget| NormalizedMilestone {
            id: None,
            phase_id: phase.id.clone(),
            title: title.to_string(),
            description: candidate.description.trim().to_string(),
            price,
            items,
            remaining_budget,
        }))
    }

    /// Validate changes to a milestone, with its old price swapped for the new one
    pub fn propose_update_milestone(
        &self,
        project: &Project,
        phase: &Phase,
        existing_milestones: &[Milestone],
        milestone_id: &str,
        changes: &MilestoneChanges,
        max_percentage: Option<Decimal>,
    ) -> Result<Proposal<NormalizedMilestone>, AllocationError> {
        info!("Proposing update of milestone {}: {:?}", milestone_id, changes);

        let current = find_milestone(phase, existing_milestones, milestone_id)?;

        let title = changes
            .title
            .as_deref()
            .unwrap_or(&current.title)
            .trim()
            .to_string();
        if title.is_empty() {
            return Err(AllocationError::MissingRequiredField { field: "title" });
        }
        let items = match &changes.items {
            Some(items) => normalize_items(items)?,
            None => current.items.clone(),
        };
        if let Some(price) = changes.price {
            ensure_non_negative("Milestone update", price)?;
        }
        check_snapshot(phase, existing_milestones)?;

        self.gatekeeper.authorize(&MutationRequest {
            kind: MutationKind::Update,
            project: Some(project),
            target: MutationTarget::Milestone {
                milestone: Some(current),
                phase,
            },
        })?;

        let price = money::round_currency(changes.price.unwrap_or(current.price));
        self.check_cap(phase, price, max_percentage)?;

        let others_total = allocated_total(phase, existing_milestones, Some(&current.id));
        let proposal = self.check_phase_total(phase, others_total, price)?;

        let description = changes
            .description
            .as_deref()
            .unwrap_or(&current.description)
            .trim()
            .to_string();

        Ok(proposal.map_value(|remaining_budget| NormalizedMilestone {
            id: Some(current.id.clone()),
            phase_id: phase.id.clone(),
            title,
            description,
            price,
            items,
            remaining_budget,
        }))
    }

    /// Removal only shrinks the phase total, so the gatekeeper is the only check
    pub fn propose_remove_milestone(
        &self,
        project: &Project,
        phase: &Phase,
        existing_milestones: &[Milestone],
        milestone_id: &str,
    ) -> Result<Proposal<MilestoneRemovalPlan>, AllocationError> {
        info!("Proposing removal of milestone {}", milestone_id);

        let current = find_milestone(phase, existing_milestones, milestone_id)?;

        self.gatekeeper.authorize(&MutationRequest {
            kind: MutationKind::Delete,
            project: Some(project),
            target: MutationTarget::Milestone {
                milestone: Some(current),
                phase,
            },
        })?;

        let remaining_total = allocated_total(phase, existing_milestones, Some(&current.id));
        Ok(Proposal::new(MilestoneRemovalPlan {
            milestone_id: current.id.clone(),
            remaining_total,
            remaining_budget: money::round_currency(phase.funding_goal - remaining_total),
        }))
    }

    fn check_cap(&self, phase: &Phase, price: Decimal, max_percentage: Option<Decimal>) -> Result<(), AllocationError> {
        let ratio = self.resolve_max_percentage(max_percentage);
        let max_allowed = money::share_of(phase.funding_goal, ratio);
        if price > max_allowed {
            debug!(
                "Milestone price {} over cap {} ({}) for phase {}",
                price,
                max_allowed,
                money::format_percentage(ratio),
                phase.id
            );
            return Err(AllocationError::ExceedsPerMilestoneCap {
                price,
                max_allowed,
                max_percentage: ratio,
            });
        }
        Ok(())
    }

    /// Strict upper bound on the phase goal; returns the remaining budget
    /// wrapped with a warning when the phase is still under-allocated
    fn check_phase_total(
        &self,
        phase: &Phase,
        others_total: Decimal,
        price: Decimal,
    ) -> Result<Proposal<Decimal>, AllocationError> {
        let phase_goal = money::round_currency(phase.funding_goal);
        let new_total = money::round_currency(others_total + price);
        if new_total > phase_goal {
            return Err(AllocationError::ExceedsPhaseGoal {
                new_total,
                phase_goal,
                max_allowed: money::headroom(phase_goal, others_total),
            });
        }

        let remaining = money::round_currency(phase_goal - new_total);
        let mut proposal = Proposal::new(remaining);
        if new_total < phase_goal {
            proposal = proposal.with_warning(AllocationWarning::PartialAllocation {
                allocated: new_total,
                target: phase_goal,
                remaining,
            });
        }
        Ok(proposal)
    }
}

/// Budget of `phase` still unassigned, optionally ignoring one milestone
/// (the one being edited). Negative when the phase is over-allocated.
pub fn compute_remaining_budget(
    phase: &Phase,
    existing_milestones: &[Milestone],
    excluding_milestone_id: Option<&str>,
) -> Decimal {
    money::round_currency(phase.funding_goal - allocated_total(phase, existing_milestones, excluding_milestone_id))
}

fn allocated_total(phase: &Phase, milestones: &[Milestone], excluding: Option<&str>) -> Decimal {
    money::sum_amounts(
        milestones
            .iter()
            .filter(|milestone| milestone.phase_id == phase.id)
            .filter(|milestone| excluding.map_or(true, |id| milestone.id != id))
            .map(|milestone| milestone.price),
    )
}

fn find_milestone<'a>(
    phase: &Phase,
    milestones: &'a [Milestone],
    milestone_id: &str,
) -> Result<&'a Milestone, AllocationError> {
    milestones
        .iter()
        .find(|milestone| milestone.id == milestone_id && milestone.phase_id == phase.id)
        .ok_or_else(|| AllocationError::MilestoneNotFound(milestone_id.to_string()))
}

fn normalize_items(items: &[MilestoneItem]) -> Result<Vec<MilestoneItem>, AllocationError> {
    items
        .iter()
        .map(|item| {
            let name = item.name.trim();
            if name.is_empty() {
                return Err(AllocationError::MissingRequiredField { field: "item.name" });
            }
            if item.quantity < 1 {
                return Err(AllocationError::InvalidItemQuantity {
                    name: name.to_string(),
                });
            }
            Ok(MilestoneItem {
                name: name.to_string(),
                quantity: item.quantity,
                image_url: item.image_url.clone(),
            })
        })
        .collect()
}

fn check_snapshot(phase: &Phase, milestones: &[Milestone]) -> Result<(), AllocationError> {
    ensure_non_negative(format!("Phase {}", phase.id), phase.funding_goal)?;
    for milestone in milestones {
        ensure_non_negative(format!("Milestone {}", milestone.id), milestone.price)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gatekeeper::GatekeeperError;
    use chrono::NaiveDate;
    use shared::{PhaseStatus, ProjectStatus};

    fn project() -> Project {
        Project {
            id: "project::1".to_string(),
            title: "Repair cafe".to_string(),
            total_target_amount: Some(Decimal::from(5000)),
            status: ProjectStatus::Draft,
        }
    }

    fn phase(goal: i64, status: PhaseStatus) -> Phase {
        let start = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap();
        Phase {
            id: "phase::1".to_string(),
            project_id: "project::1".to_string(),
            phase_number: 1,
            funding_goal: Decimal::from(goal),
            start_date: start,
            end_date: start + chrono::Duration::days(30),
            duration_days: 30,
            status,
        }
    }

    fn milestone(id: &str, price: i64) -> Milestone {
        Milestone {
            id: id.to_string(),
            phase_id: "phase::1".to_string(),
            title: format!("Milestone {}", id),
            description: String::new(),
            price: Decimal::from(price),
            items: vec![],
        }
    }

    fn candidate(title: &str, price: i64) -> MilestoneCandidate {
        MilestoneCandidate {
            title: title.to_string(),
            description: "  tools and parts ".to_string(),
            price: Decimal::from(price),
            items: vec![],
        }
    }

    fn ratio() -> Option<Decimal> {
        Some(Decimal::new(2, 1))
    }

    #[test]
    fn test_cap_boundary() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);

        let err = allocator
            .propose_add_milestone(&project(), Some(&phase), &[], &candidate("Parts", 201), ratio())
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::ExceedsPerMilestoneCap {
                price: Decimal::from(201),
                max_allowed: Decimal::from(200),
                max_percentage: Decimal::new(2, 1),
            }
        );

        let proposal = allocator
            .propose_add_milestone(&project(), Some(&phase), &[], &candidate("Parts", 200), ratio())
            .unwrap();
        assert_eq!(proposal.value.price, Decimal::from(200));
        assert_eq!(proposal.value.remaining_budget, Decimal::from(800));
        assert_eq!(proposal.value.description, "tools and parts");
        assert_eq!(
            proposal.warnings,
            vec![AllocationWarning::PartialAllocation {
                allocated: Decimal::from(200),
                target: Decimal::from(1000),
                remaining: Decimal::from(800),
            }]
        );
    }

    #[test]
    fn test_missing_percentage_falls_back_to_twenty_percent() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);

        let err = allocator
            .propose_add_milestone(&project(), Some(&phase), &[], &candidate("Parts", 250), None)
            .unwrap_err();
        assert!(matches!(
            err,
            AllocationError::ExceedsPerMilestoneCap { max_allowed, .. } if max_allowed == Decimal::from(200)
        ));
    }

    #[test]
    fn test_out_of_range_percentage_falls_back() {
        let allocator = MilestoneAllocator::new();
        assert_eq!(allocator.resolve_max_percentage(Some(Decimal::from(20))), Decimal::new(20, 2));
        assert_eq!(allocator.resolve_max_percentage(Some(Decimal::ZERO)), Decimal::new(20, 2));
        assert_eq!(allocator.resolve_max_percentage(Some(Decimal::new(35, 2))), Decimal::new(35, 2));
    }

    #[test]
    fn test_total_cannot_exceed_phase_goal() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);
        let existing = vec![
            milestone("milestone::1", 200),
            milestone("milestone::2", 200),
            milestone("milestone::3", 200),
            milestone("milestone::4", 200),
            milestone("milestone::5", 100),
        ];

        let err = allocator
            .propose_add_milestone(&project(), Some(&phase), &existing, &candidate("Launch", 200), ratio())
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::ExceedsPhaseGoal {
                new_total: Decimal::from(1100),
                phase_goal: Decimal::from(1000),
                max_allowed: Decimal::from(100),
            }
        );

        let proposal = allocator
            .propose_add_milestone(&project(), Some(&phase), &existing, &candidate("Launch", 100), ratio())
            .unwrap();
        assert!(!proposal.has_warnings());
        assert_eq!(proposal.value.remaining_budget, Decimal::ZERO);
    }

    #[test]
    fn test_fully_allocated_phase_sums_to_goal() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);
        let mut milestones: Vec<Milestone> = Vec::new();

        for index in 0..5 {
            let proposal = allocator
                .propose_add_milestone(
                    &project(),
                    Some(&phase),
                    &milestones,
                    &candidate("Step", 200),
                    ratio(),
                )
                .unwrap();
            assert!(proposal.value.price <= Decimal::from(200));
            let approved = proposal.into_value();
            milestones.push(Milestone {
                id: format!("milestone::{}", index),
                phase_id: approved.phase_id,
                title: approved.title,
                description: approved.description,
                price: approved.price,
                items: approved.items,
            });
        }

        assert_eq!(compute_remaining_budget(&phase, &milestones, None), Decimal::ZERO);
    }

    #[test]
    fn test_required_fields() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);

        let err = allocator
            .propose_add_milestone(&project(), Some(&phase), &[], &candidate("   ", 100), ratio())
            .unwrap_err();
        assert_eq!(err, AllocationError::MissingRequiredField { field: "title" });

        let err = allocator
            .propose_add_milestone(&project(), None, &[], &candidate("Parts", 100), ratio())
            .unwrap_err();
        assert_eq!(err, AllocationError::MissingRequiredField { field: "phase" });
    }

    #[test]
    fn test_item_validation() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);
        let mut with_items = candidate("Parts", 100);
        with_items.items = vec![MilestoneItem {
            name: "Soldering kit".to_string(),
            quantity: 0,
            image_url: None,
        }];

        let err = allocator
            .propose_add_milestone(&project(), Some(&phase), &[], &with_items, ratio())
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::InvalidItemQuantity {
                name: "Soldering kit".to_string()
            }
        );

        with_items.items[0].quantity = 2;
        with_items.items[0].name = " Soldering kit ".to_string();
        let proposal = allocator
            .propose_add_milestone(&project(), Some(&phase), &[], &with_items, ratio())
            .unwrap();
        assert_eq!(proposal.value.items[0].name, "Soldering kit");
    }

    #[test]
    fn test_update_substitutes_old_price() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);
        let existing = vec![
            milestone("milestone::1", 200),
            milestone("milestone::2", 200),
            milestone("milestone::3", 200),
            milestone("milestone::4", 200),
            milestone("milestone::5", 200),
        ];

        let changes = MilestoneChanges {
            price: Some(Decimal::from(150)),
            ..Default::default()
        };
        let proposal = allocator
            .propose_update_milestone(&project(), &phase, &existing, "milestone::3", &changes, ratio())
            .unwrap();
        assert_eq!(proposal.value.id.as_deref(), Some("milestone::3"));
        assert_eq!(proposal.value.title, "Milestone milestone::3");
        assert_eq!(proposal.value.remaining_budget, Decimal::from(50));
        assert_eq!(proposal.warnings.len(), 1);
    }

    #[test]
    fn test_update_over_cap_is_rejected() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);
        let existing = vec![milestone("milestone::1", 200), milestone("milestone::2", 100)];

        let changes = MilestoneChanges {
            price: Some(Decimal::from(201)),
            ..Default::default()
        };
        let err = allocator
            .propose_update_milestone(&project(), &phase, &existing, "milestone::2", &changes, ratio())
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::ExceedsPerMilestoneCap {
                price: Decimal::from(201),
                max_allowed: Decimal::from(200),
                max_percentage: Decimal::new(2, 1),
            }
        );
    }

    #[test]
    fn test_update_counts_only_the_new_price_against_the_goal() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);
        let half = Some(Decimal::new(5, 1));
        let raise = MilestoneChanges {
            price: Some(Decimal::from(500)),
            ..Default::default()
        };

        // 400 + 400 + 500 would overshoot; with the old 400 swapped out it fits
        let existing = vec![milestone("milestone::1", 400), milestone("milestone::2", 400)];
        let proposal = allocator
            .propose_update_milestone(&project(), &phase, &existing, "milestone::2", &raise, half)
            .unwrap();
        assert_eq!(proposal.value.remaining_budget, Decimal::from(100));

        let existing = vec![
            milestone("milestone::1", 400),
            milestone("milestone::2", 400),
            milestone("milestone::3", 150),
        ];
        let err = allocator
            .propose_update_milestone(&project(), &phase, &existing, "milestone::2", &raise, half)
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::ExceedsPhaseGoal {
                new_total: Decimal::from(1050),
                phase_goal: Decimal::from(1000),
                max_allowed: Decimal::from(450),
            }
        );
    }

    #[test]
    fn test_cap_never_exceeds_exact_share() {
        let allocator = MilestoneAllocator::new();
        let mut phase = phase(1000, PhaseStatus::Plan);
        // Exact cap is 200.006
        phase.funding_goal = Decimal::new(100003, 2);
        let mut over = candidate("Parts", 0);
        over.price = Decimal::new(20001, 2);

        let err = allocator
            .propose_add_milestone(&project(), Some(&phase), &[], &over, ratio())
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::ExceedsPerMilestoneCap {
                price: Decimal::new(20001, 2),
                max_allowed: Decimal::new(20000, 2),
                max_percentage: Decimal::new(2, 1),
            }
        );
        assert_eq!(allocator.max_milestone_price(&phase, ratio()), Decimal::from(200));
    }

    #[test]
    fn test_update_unknown_milestone() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Plan);
        let err = allocator
            .propose_update_milestone(
                &project(),
                &phase,
                &[milestone("milestone::1", 100)],
                "milestone::9",
                &MilestoneChanges::default(),
                ratio(),
            )
            .unwrap_err();
        assert_eq!(err, AllocationError::MilestoneNotFound("milestone::9".to_string()));
    }

    #[test]
    fn test_update_in_process_phase_rejected_even_when_valid() {
        let allocator = MilestoneAllocator::new();
        let phase = phase(1000, PhaseStatus::Process);
        let existing = vec![milestone("milestone::1", 100)];

        for price in [50, 5000] {
            let changes = MilestoneChanges {
                price: Some(Decimal::from(price)),
                ..Default::default()
            };
            let err = allocator
                .propose_update_milestone(&project(), &phase, &existing, "milestone::1", &changes, ratio())
                .unwrap_err();
            assert!(matches!(
                err,
                AllocationError::NotEditable(GatekeeperError::PhaseNotEditable { .. })
            ));
        }
    }

    #[test]
    fn test_remove_milestone() {
        let allocator = MilestoneAllocator::new();
        let existing = vec![milestone("milestone::1", 200), milestone("milestone::2", 150)];

        let plan = allocator
            .propose_remove_milestone(&project(), &phase(1000, PhaseStatus::Plan), &existing, "milestone::1")
            .unwrap();
        assert!(!plan.has_warnings());
        assert_eq!(plan.value.remaining_total, Decimal::from(150));
        assert_eq!(plan.value.remaining_budget, Decimal::from(850));

        let err = allocator
            .propose_remove_milestone(&project(), &phase(1000, PhaseStatus::Completed), &existing, "milestone::1")
            .unwrap_err();
        assert!(matches!(err, AllocationError::NotEditable(_)));
    }

    #[test]
    fn test_locked_project_blocks_milestones() {
        let allocator = MilestoneAllocator::new();
        let mut project = project();
        project.status = ProjectStatus::Cancelled;
        let err = allocator
            .propose_add_milestone(
                &project,
                Some(&phase(1000, PhaseStatus::Plan)),
                &[],
                &candidate("Parts", 100),
                ratio(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AllocationError::NotEditable(GatekeeperError::ProjectLocked { .. })
        ));
    }

    #[test]
    fn test_remaining_budget_is_pure() {
        let phase = phase(1000, PhaseStatus::Plan);
        let mut other_phase = milestone("milestone::x", 999);
        other_phase.phase_id = "phase::2".to_string();
        let milestones = vec![
            milestone("milestone::1", 200),
            milestone("milestone::2", 150),
            other_phase,
        ];
        let before = milestones.clone();

        let first = compute_remaining_budget(&phase, &milestones, None);
        let second = compute_remaining_budget(&phase, &milestones, None);
        assert_eq!(first, Decimal::from(650));
        assert_eq!(first, second);
        assert_eq!(milestones, before);

        assert_eq!(
            compute_remaining_budget(&phase, &milestones, Some("milestone::1")),
            Decimal::from(850)
        );
    }

    #[test]
    fn test_negative_price_is_fault() {
        let allocator = MilestoneAllocator::new();
        let err = allocator
            .propose_add_milestone(
                &project(),
                Some(&phase(1000, PhaseStatus::Plan)),
                &[],
                &candidate("Parts", -1),
                ratio(),
            )
            .unwrap_err();
        assert!(err.is_fault());
    }
}
