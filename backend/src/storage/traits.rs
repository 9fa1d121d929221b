//! # Storage Traits
//!
//! Interfaces the planning service consumes. Implementations wrap whatever
//! backs the platform (REST client, database, the in-memory store in this
//! crate) so the domain layer works with any of them unchanged.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::{Milestone, MilestoneData, Phase, PhaseData, Project, SettingType};

/// Failures a store reports that callers may want to branch on.
/// Returned inside `anyhow::Error`; recover with `downcast_ref`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The write was based on a stale snapshot; re-fetch and try again
    #[error("Conflicting update on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether `error` is a stale-snapshot conflict
    pub fn is_conflict(error: &anyhow::Error) -> bool {
        matches!(error.downcast_ref::<StorageError>(), Some(StorageError::Conflict { .. }))
    }
}

#[async_trait]
pub trait ProjectStorage: Send + Sync {
    /// Retrieve a project by ID
    async fn get_project_by_id(&self, project_id: &str) -> Result<Option<Project>>;
}

#[async_trait]
pub trait PhaseStorage: Send + Sync {
    /// List a project's phases ordered by phase number
    async fn get_phases_by_project(&self, project_id: &str) -> Result<Vec<Phase>>;

    async fn create_phase(&self, project_id: &str, data: &PhaseData) -> Result<Phase>;

    async fn update_phase(&self, phase_id: &str, data: &PhaseData) -> Result<Phase>;

    /// Delete a phase together with its milestones
    async fn delete_phase(&self, phase_id: &str) -> Result<()>;
}

#[async_trait]
pub trait MilestoneStorage: Send + Sync {
    /// List a phase's milestones in creation order
    async fn get_milestones_by_phase(&self, phase_id: &str) -> Result<Vec<Milestone>>;

    async fn create_milestone(&self, phase_id: &str, data: &MilestoneData) -> Result<Milestone>;

    async fn update_milestone(&self, milestone_id: &str, data: &MilestoneData) -> Result<Milestone>;

    async fn delete_milestone(&self, milestone_id: &str) -> Result<()>;
}

#[async_trait]
pub trait SettingsStorage: Send + Sync {
    /// Read a platform setting; `Ok(None)` when it is not configured
    async fn get_setting(&self, setting: SettingType) -> Result<Option<Decimal>>;
}
