//! TOML-based engine configuration and preset definitions.

use std::fs;
use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::clock::{BucketWidth, WallClock};
use crate::engine::tariff::TariffPolicy;
use crate::engine::types::Channel;

/// Top-level engine configuration parsed from TOML.
///
/// All fields have defaults matching the `default` preset. Load from
/// TOML with [`EngineConfig::from_toml_file`] or use
/// [`EngineConfig::from_preset`] for a built-in set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Flow reconciliation thresholds.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Bucketing and wall-clock settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,
    /// Fee components and the fees toggle.
    #[serde(default)]
    pub tariff: TariffConfig,
}

/// Thresholds used by the flow reconciler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconciliationConfig {
    /// Relative disagreement between measured and estimated load above which the
    /// measured value is trusted (0.0-1.0, exclusive lower bound).
    pub relative_tolerance: f64,
    /// Battery throughput (W) that must be exceeded before measured load is trusted.
    pub battery_floor_w: f64,
    /// Fraction of battery discharge that reaches the household bus (0.0-1.0).
    pub discharge_efficiency: f64,
    /// Allowed absolute balance residual (W) before an instant is flagged.
    pub balance_tolerance_w: f64,
    /// Oldest a channel's latest sample may be, relative to the join instant (seconds).
    pub max_sample_age_secs: i64,
    /// Channel whose timestamps drive the join.
    pub reference_channel: Channel,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            relative_tolerance: 0.5,
            battery_floor_w: 1.0,
            discharge_efficiency: 0.95,
            balance_tolerance_w: 1.0,
            max_sample_age_secs: 60,
            reference_channel: Channel::GridNet,
        }
    }
}

/// Bucketing and wall-clock settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregationConfig {
    /// IANA time zone name used for wall-clock bucket boundaries and price keys.
    pub timezone: String,
    /// Width of the display buckets in a snapshot.
    pub bucket_width: BucketWidth,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Stockholm".to_string(),
            bucket_width: BucketWidth::Hour,
        }
    }
}

impl AggregationConfig {
    /// Wall clock for the configured time zone.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the zone name is not a known IANA zone.
    pub fn clock(&self) -> Result<WallClock, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map(WallClock::new)
            .map_err(|_| ConfigError {
                field: "aggregation.timezone".into(),
                message: format!("unknown time zone \"{}\"", self.timezone),
            })
    }
}

/// Fee components (currency per kWh) and the default fees toggle.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TariffConfig {
    /// Whether costs include taxes and grid fees by default.
    pub include_fees_and_taxes: bool,
    /// Energy tax added to the buy price.
    pub buy_energy_tax_per_kwh: f64,
    /// Transmission fee added to the buy price.
    pub buy_transmission_fee_per_kwh: f64,
    /// Tax reduction credited on exported energy.
    pub sell_tax_reduction_per_kwh: f64,
    /// Grid benefit credited on exported energy.
    pub sell_grid_benefit_per_kwh: f64,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            include_fees_and_taxes: false,
            buy_energy_tax_per_kwh: 0.49,
            buy_transmission_fee_per_kwh: 0.25,
            sell_tax_reduction_per_kwh: 0.60,
            sell_grid_benefit_per_kwh: 0.08,
        }
    }
}

impl TariffConfig {
    /// Policy derived from the configured fee components.
    pub fn policy(&self) -> TariffPolicy {
        TariffPolicy {
            include_fees_and_taxes: self.include_fees_and_taxes,
            buy_fees_per_kwh: self.buy_energy_tax_per_kwh + self.buy_transmission_fee_per_kwh,
            sell_benefits_per_kwh: self.sell_tax_reduction_per_kwh
                + self.sell_grid_benefit_per_kwh,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"reconciliation.relative_tolerance"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl EngineConfig {
    /// Returns the strict preset: measured load is trusted at smaller disagreements
    /// and the balance check tolerates less residual.
    pub fn strict() -> Self {
        Self {
            reconciliation: ReconciliationConfig {
                relative_tolerance: 0.2,
                balance_tolerance_w: 0.5,
                max_sample_age_secs: 30,
                ..ReconciliationConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["default", "strict"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "default" => Ok(Self::default()),
            "strict" => Ok(Self::strict()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let r = &self.reconciliation;

        if !(r.relative_tolerance > 0.0 && r.relative_tolerance <= 1.0) {
            errors.push(ConfigError {
                field: "reconciliation.relative_tolerance".into(),
                message: "must be in (0.0, 1.0]".into(),
            });
        }
        if !(r.battery_floor_w.is_finite() && r.battery_floor_w >= 0.0) {
            errors.push(ConfigError {
                field: "reconciliation.battery_floor_w".into(),
                message: "must be >= 0".into(),
            });
        }
        if !(r.discharge_efficiency > 0.0 && r.discharge_efficiency <= 1.0) {
            errors.push(ConfigError {
                field: "reconciliation.discharge_efficiency".into(),
                message: "must be in (0.0, 1.0]".into(),
            });
        }
        if !(r.balance_tolerance_w.is_finite() && r.balance_tolerance_w >= 0.0) {
            errors.push(ConfigError {
                field: "reconciliation.balance_tolerance_w".into(),
                message: "must be >= 0".into(),
            });
        }
        if r.max_sample_age_secs <= 0 {
            errors.push(ConfigError {
                field: "reconciliation.max_sample_age_secs".into(),
                message: "must be > 0".into(),
            });
        }

        if let Err(e) = self.aggregation.clock() {
            errors.push(e);
        }

        let t = &self.tariff;
        for (field, value) in [
            ("tariff.buy_energy_tax_per_kwh", t.buy_energy_tax_per_kwh),
            ("tariff.buy_transmission_fee_per_kwh", t.buy_transmission_fee_per_kwh),
            ("tariff.sell_tax_reduction_per_kwh", t.sell_tax_reduction_per_kwh),
            ("tariff.sell_grid_benefit_per_kwh", t.sell_grid_benefit_per_kwh),
        ] {
            if !value.is_finite() {
                errors.push(ConfigError {
                    field: field.into(),
                    message: "must be a finite number".into(),
                });
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preset_valid() {
        let cfg = EngineConfig::default();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "default should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = EngineConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.unwrap_err();
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in EngineConfig::PRESETS {
            let cfg = EngineConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn strict_trusts_measured_load_sooner() {
        let base = EngineConfig::default();
        let strict = EngineConfig::strict();
        assert!(strict.reconciliation.relative_tolerance < base.reconciliation.relative_tolerance);
        assert_eq!(strict.tariff, base.tariff);
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[reconciliation]
relative_tolerance = 0.3
battery_floor_w = 5.0
discharge_efficiency = 0.9
balance_tolerance_w = 2.0
max_sample_age_secs = 120
reference_channel = "load"

[aggregation]
timezone = "UTC"
bucket_width = "minute"

[tariff]
include_fees_and_taxes = true
buy_energy_tax_per_kwh = 0.5
buy_transmission_fee_per_kwh = 0.3
sell_tax_reduction_per_kwh = 0.6
sell_grid_benefit_per_kwh = 0.1
"#;
        let cfg = EngineConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        assert_eq!(
            cfg.as_ref().map(|c| c.reconciliation.reference_channel),
            Some(Channel::Load)
        );
        assert_eq!(
            cfg.as_ref().map(|c| c.aggregation.bucket_width),
            Some(BucketWidth::Minute)
        );
        assert_eq!(
            cfg.as_ref().map(|c| c.tariff.include_fees_and_taxes),
            Some(true)
        );
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[reconciliation]
relative_tolerance = 0.5
bogus_field = true
"#;
        let result = EngineConfig::from_toml_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[tariff]
include_fees_and_taxes = true
"#;
        let cfg = EngineConfig::from_toml_str(toml).ok();
        assert_eq!(
            cfg.as_ref().map(|c| c.tariff.include_fees_and_taxes),
            Some(true)
        );
        // untouched sections keep defaults
        assert_eq!(
            cfg.as_ref().map(|c| c.reconciliation.relative_tolerance),
            Some(0.5)
        );
        assert_eq!(
            cfg.as_ref().map(|c| c.aggregation.timezone.as_str()),
            Some("Europe/Stockholm")
        );
    }

    #[test]
    fn validation_catches_zero_tolerance() {
        let mut cfg = EngineConfig::default();
        cfg.reconciliation.relative_tolerance = 0.0;
        let errors = cfg.validate();
        assert!(
            errors
                .iter()
                .any(|e| e.field == "reconciliation.relative_tolerance")
        );
    }

    #[test]
    fn validation_catches_efficiency_above_one() {
        let mut cfg = EngineConfig::default();
        cfg.reconciliation.discharge_efficiency = 1.2;
        let errors = cfg.validate();
        assert!(
            errors
                .iter()
                .any(|e| e.field == "reconciliation.discharge_efficiency")
        );
    }

    #[test]
    fn validation_catches_unknown_timezone() {
        let mut cfg = EngineConfig::default();
        cfg.aggregation.timezone = "Mars/Olympus_Mons".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "aggregation.timezone"));
    }

    #[test]
    fn default_policy_sums_fee_components() {
        let policy = TariffConfig::default().policy();
        assert!(!policy.include_fees_and_taxes);
        assert!((policy.buy_fees_per_kwh - 0.74).abs() < 1e-9);
        assert!((policy.sell_benefits_per_kwh - 0.68).abs() < 1e-9);
    }
}
