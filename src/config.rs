//! Simulation configuration.
//!
//! A flat record with camelCase keys, loaded from JSON. Unknown keys are
//! rejected at parse time; out-of-range values are rejected by
//! [`SimulationConfig::validate`] naming the offending key. `Default`
//! carries the standard parameters.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Mortality model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MortalityModelConfig {
    /// Modern Gompertz–Makeham parameters.
    Realistic,
    /// Pre-industrial parameters: higher background mortality, flatter
    /// senescence.
    Historical,
    #[serde(rename_all = "camelCase")]
    Custom {
        alpha: f64,
        beta: f64,
        gamma: f64,
        infant_rate: f64,
        child_factor: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SimulationConfig {
    pub initial_population: u32,
    pub male_ratio: f64,
    pub annual_immigration: u32,
    pub annual_emigration_rate: f64,
    pub adult_age: u32,
    pub maximum_age: u32,
    pub child_bearing_age_min: u32,
    pub child_bearing_age_max: u32,
    pub base_fertility_rate: f64,
    pub partnership_probability: f64,
    pub partnership_threshold: f64,
    pub max_age_gap: u32,
    pub remarriage_probability: f64,
    pub mortality_model: MortalityModelConfig,
    pub random_seed: u64,
    /// Ticks between automatic snapshots taken by the driver; 0 disables.
    pub auto_save_interval: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            initial_population: 100,
            male_ratio: 0.5,
            annual_immigration: 12,
            annual_emigration_rate: 0.03,
            adult_age: 18,
            maximum_age: 120,
            child_bearing_age_min: 16,
            child_bearing_age_max: 45,
            base_fertility_rate: 0.15,
            partnership_probability: 0.7,
            partnership_threshold: 0.55,
            max_age_gap: 15,
            remarriage_probability: 0.4,
            mortality_model: MortalityModelConfig::Realistic,
            random_seed: 0,
            auto_save_interval: 0,
        }
    }
}

fn range_err(key: &'static str, reason: String) -> ConfigError {
    ConfigError::OutOfRange { key, reason }
}

impl SimulationConfig {
    /// Parse a JSON document. Unknown keys and malformed values surface as
    /// [`ConfigError::Invalid`]; range violations as
    /// [`ConfigError::OutOfRange`]. Missing keys fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(10..=1000).contains(&self.initial_population) {
            return Err(range_err(
                "initialPopulation",
                format!("{} not in 10..=1000", self.initial_population),
            ));
        }
        if !(0.4..=0.6).contains(&self.male_ratio) {
            return Err(range_err(
                "maleRatio",
                format!("{} not in 0.4..=0.6", self.male_ratio),
            ));
        }
        if self.annual_immigration > 100 {
            return Err(range_err(
                "annualImmigration",
                format!("{} not in 0..=100", self.annual_immigration),
            ));
        }
        if !(0.0..=0.2).contains(&self.annual_emigration_rate) {
            return Err(range_err(
                "annualEmigrationRate",
                format!("{} not in 0.0..=0.2", self.annual_emigration_rate),
            ));
        }
        if self.maximum_age > 150 {
            return Err(range_err(
                "maximumAge",
                format!("{} exceeds 150", self.maximum_age),
            ));
        }
        if self.adult_age == 0 || self.adult_age >= self.maximum_age {
            return Err(range_err(
                "adultAge",
                format!("{} not in 1..maximumAge", self.adult_age),
            ));
        }
        if self.child_bearing_age_min > self.child_bearing_age_max {
            return Err(range_err(
                "childBearingAgeMin",
                format!(
                    "{} exceeds childBearingAgeMax {}",
                    self.child_bearing_age_min, self.child_bearing_age_max
                ),
            ));
        }
        if self.child_bearing_age_max >= self.maximum_age {
            return Err(range_err(
                "childBearingAgeMax",
                format!("{} must be below maximumAge", self.child_bearing_age_max),
            ));
        }
        if !(0.0..=1.0).contains(&self.base_fertility_rate) {
            return Err(range_err(
                "baseFertilityRate",
                format!("{} not in 0.0..=1.0", self.base_fertility_rate),
            ));
        }
        if !(0.0..=1.0).contains(&self.partnership_probability) {
            return Err(range_err(
                "partnershipProbability",
                format!("{} not in 0.0..=1.0", self.partnership_probability),
            ));
        }
        if !(0.0..=1.0).contains(&self.partnership_threshold) {
            return Err(range_err(
                "partnershipThreshold",
                format!("{} not in 0.0..=1.0", self.partnership_threshold),
            ));
        }
        if self.max_age_gap > 50 {
            return Err(range_err(
                "maxAgeGap",
                format!("{} not in 0..=50", self.max_age_gap),
            ));
        }
        if !(0.0..=1.0).contains(&self.remarriage_probability) {
            return Err(range_err(
                "remarriageProbability",
                format!("{} not in 0.0..=1.0", self.remarriage_probability),
            ));
        }
        if let MortalityModelConfig::Custom {
            alpha,
            beta,
            gamma,
            infant_rate,
            child_factor,
        } = &self.mortality_model
        {
            for (name, value) in [
                ("alpha", *alpha),
                ("beta", *beta),
                ("gamma", *gamma),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(range_err(
                        "mortalityModel",
                        format!("custom {name} must be finite and non-negative"),
                    ));
                }
            }
            if !(0.0..=1.0).contains(infant_rate) {
                return Err(range_err(
                    "mortalityModel",
                    format!("custom infantRate {infant_rate} not in 0.0..=1.0"),
                ));
            }
            if !(0.0..=1.0).contains(child_factor) {
                return Err(range_err(
                    "mortalityModel",
                    format!("custom childFactor {child_factor} not in 0.0..=1.0"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = SimulationConfig::from_json_str(r#"{"plagueRate": 0.5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn out_of_range_names_the_key() {
        let err =
            SimulationConfig::from_json_str(r#"{"maleRatio": 0.9}"#).unwrap_err();
        match err {
            ConfigError::OutOfRange { key, .. } => assert_eq!(key, "maleRatio"),
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{"initialPopulation": 50, "randomSeed": 42}"#,
        )
        .unwrap();
        assert_eq!(config.initial_population, 50);
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.adult_age, 18);
        assert_eq!(config.maximum_age, 120);
    }

    #[test]
    fn custom_mortality_model_parses() {
        let config = SimulationConfig::from_json_str(
            r#"{"mortalityModel": {"custom": {"alpha": 0.005, "beta": 0.07,
                "gamma": 0.00001, "infantRate": 0.15, "childFactor": 0.5}}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.mortality_model,
            MortalityModelConfig::Custom { .. }
        ));
    }

    #[test]
    fn named_mortality_models_parse() {
        let config =
            SimulationConfig::from_json_str(r#"{"mortalityModel": "historical"}"#).unwrap();
        assert_eq!(config.mortality_model, MortalityModelConfig::Historical);
    }

    #[test]
    fn camel_case_round_trip() {
        let json = serde_json::to_string(&SimulationConfig::default()).unwrap();
        assert!(json.contains("initialPopulation"));
        assert!(json.contains("annualEmigrationRate"));
        let back = SimulationConfig::from_json_str(&json).unwrap();
        assert_eq!(back, SimulationConfig::default());
    }

    #[test]
    fn invalid_custom_model_is_rejected() {
        let err = SimulationConfig::from_json_str(
            r#"{"mortalityModel": {"custom": {"alpha": -1.0, "beta": 0.07,
                "gamma": 0.00001, "infantRate": 0.1, "childFactor": 0.3}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "mortalityModel", .. }));
    }
}
