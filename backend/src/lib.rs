//! # Crowdfund Backend
//!
//! Contains all non-UI logic for planning how a crowdfunding project's target
//! is split into phases and milestones.
//!
//! This crate brings together:
//! - **Domain**: Allocation rules and the planning service
//! - **Storage**: Contracts for the remote project store plus an in-memory store
//! - **Config**: YAML-backed engine tunables
//!
//! ## Architecture
//!
//! ```text
//! Caller (REST handler, UI, CLI)
//!     ↓
//! PlanningService (fetch, validate, confirm, persist, re-fetch)
//!     ↓
//! Allocators (pure validation over a snapshot)
//!     ↓
//! Storage traits (remote store)
//! ```

pub mod config;
pub mod domain;
pub mod storage;

use anyhow::Result;
use log::info;
use shared::AllocationConfig;
use std::path::Path;
use std::sync::Arc;

use crate::domain::PlanningService;
use crate::storage::{MilestoneStorage, PhaseStorage, ProjectStorage, SettingsStorage};

pub use domain::*;
pub use storage::*;

/// Main application state that holds all services
#[derive(Clone)]
pub struct AppState {
    pub planning_service: PlanningService,
    pub config: AllocationConfig,
}

/// Initialize the backend on top of a store implementing every storage trait
pub fn initialize_backend<S>(config_path: Option<&Path>, store: Arc<S>) -> Result<AppState>
where
    S: ProjectStorage + PhaseStorage + MilestoneStorage + SettingsStorage + 'static,
{
    info!("Loading allocation config");
    let config = match config_path {
        Some(path) => config::load_config(path)?,
        None => AllocationConfig::default(),
    };

    info!("Setting up planning service");
    let planning_service = PlanningService::new(
        config.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store,
    );

    Ok(AppState {
        planning_service,
        config,
    })
}
