//! # Domain Module
//!
//! Contains all budget allocation rules for crowdfunding project plans.
//!
//! A project's funding target is split into sequential phases, and each
//! phase's goal is split into milestones. This module decides whether a
//! proposed phase or milestone mutation is allowed against the current
//! snapshot of the plan. It never touches storage directly; the planning
//! service fetches snapshots and persists approved mutations.
//!
//! ## Module Organization
//!
//! - **money**: Currency rounding, tolerant comparison and formatting
//! - **schedule**: Phase date arithmetic (end dates, gaps, sequencing)
//! - **errors**: Validation errors, engine faults, warnings and proposals
//! - **gatekeeper**: Editability checks based on phase and project status
//! - **phase_allocator**: Add/update/remove validation for phases
//! - **milestone_allocator**: Add/update/remove validation for milestones
//! - **plan_review**: Whole-plan readiness check before submission
//! - **settings_service**: Platform settings with safe fallbacks
//! - **planning_service**: Fetch, validate, confirm, persist, re-fetch
//!
//! ## Business Rules
//!
//! - Phase goals never sum above the project target
//! - Milestone prices never sum above their phase goal
//! - No single milestone exceeds the configured share of its phase goal
//! - Phases last at least 14 days and are spaced at least 7 days apart
//! - Only phases still in PLAN, under an unlocked project, can be edited

pub mod errors;
pub mod gatekeeper;
pub mod milestone_allocator;
pub mod models;
pub mod money;
pub mod phase_allocator;
pub mod plan_review;
pub mod planning_service;
pub mod schedule;
pub mod settings_service;

pub use errors::{AllocationError, AllocationWarning, EngineFault, Proposal};
pub use gatekeeper::{GatekeeperError, MutationGatekeeper, MutationKind, MutationRequest, MutationTarget};
pub use milestone_allocator::{compute_remaining_budget, MilestoneAllocator};
pub use models::*;
pub use phase_allocator::PhaseAllocator;
pub use plan_review::{PlanIssue, PlanReview, PlanReviewer};
pub use planning_service::{AppliedMutation, MilestoneMutation, MutationOutcome, PhaseMutation, PlanningService};
pub use settings_service::SettingsService;
