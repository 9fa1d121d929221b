//! # In-Memory Store
//!
//! Process-local implementation of every storage trait. Useful as a reference
//! adapter and as the backing store for service tests.
//!
//! IDs follow the `"<kind>::<uuid>"` format used throughout the platform.
//! Phase status changes are driven from outside the engine, so the store
//! exposes `set_phase_status` to play the backend's role; it refuses
//! backwards transitions.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use shared::{
    Milestone, MilestoneData, Phase, PhaseData, PhaseStatus, Project, ProjectStatus, SettingType,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{MilestoneStorage, PhaseStorage, ProjectStorage, SettingsStorage, StorageError};

#[derive(Default)]
pub struct InMemoryStore {
    projects: RwLock<Vec<Project>>,
    phases: RwLock<Vec<Phase>>,
    milestones: RwLock<Vec<Milestone>>,
    settings: RwLock<HashMap<SettingType, Decimal>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a project, replacing any project with the same ID
    pub async fn insert_project(&self, project: Project) {
        let mut projects = self.projects.write().await;
        projects.retain(|existing| existing.id != project.id);
        info!("Stored project {}", project.id);
        projects.push(project);
    }

    pub async fn set_project_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
        let mut projects = self.projects.write().await;
        let project = projects
            .iter_mut()
            .find(|project| project.id == project_id)
            .ok_or_else(|| not_found("Project", project_id))?;
        project.status = status;
        Ok(())
    }

    /// Move a phase along its lifecycle
    pub async fn set_phase_status(&self, phase_id: &str, status: PhaseStatus) -> Result<Phase> {
        let mut phases = self.phases.write().await;
        let phase = phases
            .iter_mut()
            .find(|phase| phase.id == phase_id)
            .ok_or_else(|| not_found("Phase", phase_id))?;
        if !phase.status.can_transition_to(status) {
            return Err(backwards_transition(phase_id, phase.status, status));
        }
        phase.status = status;
        Ok(phase.clone())
    }

    pub async fn set_setting(&self, setting: SettingType, value: Decimal) {
        self.settings.write().await.insert(setting, value);
    }

    pub async fn clear_setting(&self, setting: SettingType) {
        self.settings.write().await.remove(&setting);
    }

    async fn project_exists(&self, project_id: &str) -> bool {
        self.projects
            .read()
            .await
            .iter()
            .any(|project| project.id == project_id)
    }

    async fn phase_exists(&self, phase_id: &str) -> bool {
        self.phases.read().await.iter().any(|phase| phase.id == phase_id)
    }
}

#[async_trait]
impl ProjectStorage for InMemoryStore {
    async fn get_project_by_id(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self
            .projects
            .read()
            .await
            .iter()
            .find(|project| project.id == project_id)
            .cloned())
    }
}

#[async_trait]
impl PhaseStorage for InMemoryStore {
    async fn get_phases_by_project(&self, project_id: &str) -> Result<Vec<Phase>> {
        let mut phases: Vec<Phase> = self
            .phases
            .read()
            .await
            .iter()
            .filter(|phase| phase.project_id == project_id)
            .cloned()
            .collect();
        phases.sort_by_key(|phase| phase.phase_number);
        Ok(phases)
    }

    async fn create_phase(&self, project_id: &str, data: &PhaseData) -> Result<Phase> {
        if !self.project_exists(project_id).await {
            return Err(not_found("Project", project_id));
        }

        let phase = Phase {
            id: generate_id("phase"),
            project_id: project_id.to_string(),
            phase_number: data.phase_number,
            funding_goal: data.funding_goal,
            start_date: data.start_date,
            end_date: data.end_date,
            duration_days: data.duration_days,
            status: data.status,
        };
        debug!("Creating phase {} for project {}", phase.id, project_id);
        self.phases.write().await.push(phase.clone());
        Ok(phase)
    }

    async fn update_phase(&self, phase_id: &str, data: &PhaseData) -> Result<Phase> {
        let mut phases = self.phases.write().await;
        let phase = phases
            .iter_mut()
            .find(|phase| phase.id == phase_id)
            .ok_or_else(|| not_found("Phase", phase_id))?;
        if !phase.status.can_transition_to(data.status) {
            return Err(backwards_transition(phase_id, phase.status, data.status));
        }

        phase.phase_number = data.phase_number;
        phase.funding_goal = data.funding_goal;
        phase.start_date = data.start_date;
        phase.end_date = data.end_date;
        phase.duration_days = data.duration_days;
        phase.status = data.status;
        Ok(phase.clone())
    }

    async fn delete_phase(&self, phase_id: &str) -> Result<()> {
        let mut phases = self.phases.write().await;
        let before = phases.len();
        phases.retain(|phase| phase.id != phase_id);
        if phases.len() == before {
            return Err(not_found("Phase", phase_id));
        }
        drop(phases);

        self.milestones
            .write()
            .await
            .retain(|milestone| milestone.phase_id != phase_id);
        debug!("Deleted phase {} and its milestones", phase_id);
        Ok(())
    }
}

#[async_trait]
impl MilestoneStorage for InMemoryStore {
    async fn get_milestones_by_phase(&self, phase_id: &str) -> Result<Vec<Milestone>> {
        Ok(self
            .milestones
            .read()
            .await
            .iter()
            .filter(|milestone| milestone.phase_id == phase_id)
            .cloned()
            .collect())
    }

    async fn create_milestone(&self, phase_id: &str, data: &MilestoneData) -> Result<Milestone> {
        if !self.phase_exists(phase_id).await {
            return Err(not_found("Phase", phase_id));
        }

        let milestone = Milestone {
            id: generate_id("milestone"),
            phase_id: phase_id.to_string(),
            title: data.title.clone(),
            description: data.description.clone(),
            price: data.price,
            items: data.items.clone(),
        };
        self.milestones.write().await.push(milestone.clone());
        Ok(milestone)
    }

    async fn update_milestone(&self, milestone_id: &str, data: &MilestoneData) -> Result<Milestone> {
        let mut milestones = self.milestones.write().await;
        let milestone = milestones
            .iter_mut()
            .find(|milestone| milestone.id == milestone_id)
            .ok_or_else(|| not_found("Milestone", milestone_id))?;

        milestone.title = data.title.clone();
        milestone.description = data.description.clone();
        milestone.price = data.price;
        milestone.items = data.items.clone();
        Ok(milestone.clone())
    }

    async fn delete_milestone(&self, milestone_id: &str) -> Result<()> {
        let mut milestones = self.milestones.write().await;
        let before = milestones.len();
        milestones.retain(|milestone| milestone.id != milestone_id);
        if milestones.len() == before {
            return Err(not_found("Milestone", milestone_id));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStorage for InMemoryStore {
    async fn get_setting(&self, setting: SettingType) -> Result<Option<Decimal>> {
        Ok(self.settings.read().await.get(&setting).copied())
    }
}

fn generate_id(kind: &str) -> String {
    format!("{}::{}", kind, Uuid::new_v4())
}

fn backwards_transition(phase_id: &str, from: PhaseStatus, to: PhaseStatus) -> anyhow::Error {
    anyhow::anyhow!("Phase {} cannot move from {} back to {}", phase_id, from, to)
}

fn not_found(entity: &'static str, id: &str) -> anyhow::Error {
    StorageError::NotFound {
        entity,
        id: id.to_string(),
    }
    .into()
}
