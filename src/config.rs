//! External configuration record (spec §6).
//!
//! `SimConfig` is the complete set of parameters the core consumes. It owns
//! no defaults that imply CLI behavior — parsing argv, reading a TOML file,
//! or prompting interactively is the job of an external driver binary. This
//! crate only validates and runs.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    pub global_w: usize,
    pub global_h: usize,
    pub total_cycles: u64,
    pub season_length: u64,
    pub num_agents: usize,
    pub max_workload: usize,
    pub energy_gain: f64,
    pub energy_loss: f64,
    pub initial_energy: f64,
    pub seed: u64,

    /// Reproduction is enabled iff both of these are `Some` (spec §9 open question).
    pub reproduce_threshold: Option<f64>,
    pub reproduce_cost: Option<f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            global_w: 64,
            global_h: 64,
            total_cycles: 100,
            season_length: 20,
            num_agents: 1000,
            max_workload: 0,
            energy_gain: 0.3,
            energy_loss: 0.4,
            initial_energy: 0.8,
            seed: 42,
            reproduce_threshold: None,
            reproduce_cost: None,
        }
    }
}

impl SimConfig {
    /// Reproduction is gated on both threshold and cost being present.
    pub fn reproduction_enabled(&self) -> bool {
        self.reproduce_threshold.is_some() && self.reproduce_cost.is_some()
    }

    /// Deserializes a `SimConfig` from a JSON document, one of the formats
    /// spec §6 describes an external driver handing to the core (TOML/JSON/
    /// env); this crate only parses the JSON case itself.
    pub fn from_json(s: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serializes this config back to JSON, e.g. so a driver can persist
    /// the record a run was launched with alongside its output.
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the record independent of process count. Process-count-aware
    /// validation (shape factorability) happens once a `Topology` is live,
    /// since `size` is only known at that point.
    pub fn validate(&self) -> SimResult<()> {
        if self.global_w == 0 || self.global_h == 0 {
            return Err(SimError::InvalidShape {
                global_w: self.global_w,
                global_h: self.global_h,
            });
        }
        if self.season_length == 0 {
            return Err(SimError::InvalidSeasonLength);
        }
        if (self.reproduce_threshold.is_some()) != (self.reproduce_cost.is_some()) {
            return Err(SimError::IncompleteReproductionConfig);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_dims_rejected() {
        let mut cfg = SimConfig::default();
        cfg.global_w = 0;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidShape { .. })));
    }

    #[test]
    fn partial_reproduction_config_rejected() {
        let mut cfg = SimConfig::default();
        cfg.reproduce_threshold = Some(1.0);
        cfg.reproduce_cost = None;
        assert!(matches!(
            cfg.validate(),
            Err(SimError::IncompleteReproductionConfig)
        ));
        assert!(!cfg.reproduction_enabled());
    }

    #[test]
    fn full_reproduction_config_enables() {
        let mut cfg = SimConfig::default();
        cfg.reproduce_threshold = Some(1.0);
        cfg.reproduce_cost = Some(0.4);
        assert!(cfg.validate().is_ok());
        assert!(cfg.reproduction_enabled());
    }

    #[test]
    fn json_round_trips() {
        let mut cfg = SimConfig::default();
        cfg.seed = 7;
        cfg.reproduce_threshold = Some(2.0);
        cfg.reproduce_cost = Some(0.5);
        let json = cfg.to_json().unwrap();
        let parsed = SimConfig::from_json(&json).unwrap();
        assert_eq!(parsed.seed, 7);
        assert_eq!(parsed.reproduce_threshold, Some(2.0));
        assert_eq!(parsed.reproduce_cost, Some(0.5));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(SimConfig::from_json("{not valid json"), Err(SimError::Json(_))));
    }
}
