//! # Engine Configuration
//!
//! Loads [`AllocationConfig`] from a YAML file. Every field is optional; a
//! missing file or missing fields fall back to the platform defaults.
//!
//! ## YAML Format
//!
//! ```yaml
//! fallback_milestone_percentage: 0.20
//! min_phase_duration_days: 14
//! min_phase_gap_days: 7
//! tolerance: 0.01
//! max_conflict_retries: 2
//! currency_symbol: "$"
//! phase_count_tiers:
//!   - max_target: 10000
//!     min_phases: 1
//!   - max_target: 100000
//!     min_phases: 2
//!   - max_target: null
//!     min_phases: 3
//! ```

use anyhow::{bail, Context, Result};
use log::{debug, info};
use rust_decimal::Decimal;
use shared::AllocationConfig;
use std::fs;
use std::path::Path;

/// Load the engine configuration, using defaults when the file doesn't exist
pub fn load_config(path: &Path) -> Result<AllocationConfig> {
    if !path.exists() {
        info!("No allocation config at {:?}, using defaults", path);
        return Ok(AllocationConfig::default());
    }

    let yaml_content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read allocation config {:?}", path))?;
    let config: AllocationConfig = serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to parse allocation config {:?}", path))?;
    validate_config(&config)?;

    debug!("Loaded allocation config from {:?}: {:?}", path, config);
    Ok(config)
}

/// Reject values the allocators cannot work with
pub fn validate_config(config: &AllocationConfig) -> Result<()> {
    if config.tolerance.is_sign_negative() && !config.tolerance.is_zero() {
        bail!("tolerance must not be negative, got {}", config.tolerance);
    }
    let fallback = config.fallback_milestone_percentage;
    if fallback <= Decimal::ZERO || fallback > Decimal::ONE {
        bail!(
            "fallback_milestone_percentage must be a ratio in (0, 1], got {}",
            fallback
        );
    }
    if config.min_phase_duration_days == 0 {
        bail!("min_phase_duration_days must be at least 1");
    }
    if config.phase_count_tiers.is_empty() {
        bail!("phase_count_tiers must contain at least one tier");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("allocation.yaml");
        fs::write(&path, contents).expect("Failed to write config");
        (temp_dir, path)
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, AllocationConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let (_temp_dir, path) = write_config("min_phase_gap_days: 10\nfallback_milestone_percentage: 0.25\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.min_phase_gap_days, 10);
        assert_eq!(config.fallback_milestone_percentage, Decimal::new(25, 2));
        assert_eq!(config.min_phase_duration_days, 14);
        assert_eq!(config.tolerance, Decimal::new(1, 2));
    }

    #[test]
    fn test_custom_tiers() {
        let (_temp_dir, path) = write_config(
            "phase_count_tiers:\n  - max_target: \"50000\"\n    min_phases: 1\n  - max_target: null\n    min_phases: 4\n",
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.phase_count_tiers.len(), 2);
        assert_eq!(config.phase_count_tiers[0].max_target, Some(Decimal::from(50000)));
        assert_eq!(config.phase_count_tiers[1].min_phases, 4);
    }

    #[test]
    fn test_out_of_range_percentage_is_rejected() {
        let (_temp_dir, path) = write_config("fallback_milestone_percentage: 20\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("fallback_milestone_percentage"));
    }

    #[test]
    fn test_empty_tiers_are_rejected() {
        let (_temp_dir, path) = write_config("phase_count_tiers: []\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let (_temp_dir, path) = write_config("min_phase_gap_days: [not, a, number]\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
