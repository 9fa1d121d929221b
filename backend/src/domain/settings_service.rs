//! Platform settings consumed by the allocators.
//!
//! The milestone cap comes from the `MILESTONE_VALUE_PERCENTAGE` setting.
//! The store may hold it as a ratio (0.2) or a percentage (20); both are
//! accepted. Anything missing, unreadable or out of range falls back to the
//! configured default so settings trouble never blocks planning.

use log::{debug, warn};
use rust_decimal::Decimal;
use shared::{AllocationConfig, SettingType};
use std::sync::Arc;

use crate::storage::SettingsStorage;

#[derive(Clone)]
pub struct SettingsService {
    settings: Arc<dyn SettingsStorage>,
    config: AllocationConfig,
}

impl SettingsService {
    pub fn new(settings: Arc<dyn SettingsStorage>, config: AllocationConfig) -> Self {
        Self { settings, config }
    }

    /// Per-milestone cap as a ratio of the phase goal
    pub async fn max_milestone_percentage(&self) -> Decimal {
        let setting = SettingType::MilestoneValuePercentage;
        let fallback = self.config.fallback_milestone_percentage;

        match self.settings.get_setting(setting).await {
            Ok(Some(raw)) => match normalize_percentage(raw) {
                Some(ratio) => {
                    debug!("{} resolved to {}", setting.as_str(), ratio);
                    ratio
                }
                None => {
                    warn!("{} has unusable value {}, using {}", setting.as_str(), raw, fallback);
                    fallback
                }
            },
            Ok(None) => {
                warn!("{} is not configured, using {}", setting.as_str(), fallback);
                fallback
            }
            Err(e) => {
                warn!("Failed to read {}: {}. Using {}", setting.as_str(), e, fallback);
                fallback
            }
        }
    }
}

/// Accept either a ratio in (0, 1] or a percentage in (1, 100]
pub fn normalize_percentage(raw: Decimal) -> Option<Decimal> {
    if raw <= Decimal::ZERO {
        None
    } else if raw <= Decimal::ONE {
        Some(raw)
    } else if raw <= Decimal::ONE_HUNDRED {
        Some(raw / Decimal::ONE_HUNDRED)
    } else {
        None
    }
}
