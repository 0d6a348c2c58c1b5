//! Scoring configuration
//!
//! Weights and thresholds are data, not constants baked into the scorer. The
//! defaults reproduce the reference weighting: each area is the plain mean of its
//! metrics and the global score is the plain mean of the four areas.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{Area, Metric};

/// Invalid scoring configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("area {0} has no weighted metrics")]
    EmptyArea(Area),

    #[error("weight for {target} must be a finite non-negative number, got {weight}")]
    InvalidWeight { target: String, weight: f64 },

    #[error("weights for {0} sum to zero")]
    ZeroWeightSum(String),

    #[error("severity thresholds must satisfy 0 < critical < major < minor <= 100")]
    Thresholds,

    #[error("entity bonus cap must be within [0, 100], got {0}")]
    EntityBonus(f64),
}

/// Metric weights for each E-E-A-T area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaWeights {
    pub expertise: BTreeMap<Metric, f64>,
    pub experience: BTreeMap<Metric, f64>,
    pub authoritativeness: BTreeMap<Metric, f64>,
    pub trustworthiness: BTreeMap<Metric, f64>,
}

impl AreaWeights {
    pub fn for_area(&self, area: Area) -> &BTreeMap<Metric, f64> {
        match area {
            Area::Expertise => &self.expertise,
            Area::Experience => &self.experience,
            Area::Authoritativeness => &self.authoritativeness,
            Area::Trustworthiness => &self.trustworthiness,
        }
    }
}

fn equal(metrics: &[Metric]) -> BTreeMap<Metric, f64> {
    metrics.iter().map(|m| (*m, 1.0)).collect()
}

impl Default for AreaWeights {
    fn default() -> Self {
        Self {
            expertise: equal(&[
                Metric::InfoOriginale,
                Metric::AnalysePertinente,
                Metric::ValeurOriginale,
            ]),
            experience: equal(&[Metric::DescriptionComplete, Metric::AttentionLecteur]),
            authoritativeness: equal(&[Metric::Credibilite, Metric::QualiteProduction]),
            trustworthiness: equal(&[Metric::Credibilite, Metric::TitreSobre]),
        }
    }
}

/// Area weights for the global score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalWeights {
    pub expertise: f64,
    pub experience: f64,
    pub authoritativeness: f64,
    pub trustworthiness: f64,
}

impl GlobalWeights {
    pub fn for_area(&self, area: Area) -> f64 {
        match area {
            Area::Expertise => self.expertise,
            Area::Experience => self.experience,
            Area::Authoritativeness => self.authoritativeness,
            Area::Trustworthiness => self.trustworthiness,
        }
    }
}

impl Default for GlobalWeights {
    fn default() -> Self {
        Self {
            expertise: 1.0,
            experience: 1.0,
            authoritativeness: 1.0,
            trustworthiness: 1.0,
        }
    }
}

/// Upper bounds (exclusive) of each severity band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub critical: f64,
    pub major: f64,
    pub minor: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            critical: 40.0,
            major: 60.0,
            minor: 75.0,
        }
    }
}

/// Everything the scorer needs, threaded through the pipeline immutably
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub areas: AreaWeights,
    pub global: GlobalWeights,
    pub thresholds: SeverityThresholds,
    /// Maximum bonus added to the global score for full entity coverage
    pub entity_bonus_cap: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            areas: AreaWeights::default(),
            global: GlobalWeights::default(),
            thresholds: SeverityThresholds::default(),
            entity_bonus_cap: 5.0,
        }
    }
}

fn check_weight(target: String, weight: f64) -> Result<(), ConfigError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight { target, weight })
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for area in Area::ALL {
            let weights = self.areas.for_area(area);
            if weights.is_empty() {
                return Err(ConfigError::EmptyArea(area));
            }
            for (metric, weight) in weights {
                check_weight(format!("{}.{}", area, metric), *weight)?;
            }
            if weights.values().sum::<f64>() <= 0.0 {
                return Err(ConfigError::ZeroWeightSum(area.to_string()));
            }
            check_weight(format!("global.{}", area), self.global.for_area(area))?;
        }

        let global_sum: f64 = Area::ALL.iter().map(|a| self.global.for_area(*a)).sum();
        if global_sum <= 0.0 {
            return Err(ConfigError::ZeroWeightSum("global".to_string()));
        }

        let t = &self.thresholds;
        if !(0.0 < t.critical && t.critical < t.major && t.major < t.minor && t.minor <= 100.0) {
            return Err(ConfigError::Thresholds);
        }

        if !(0.0..=100.0).contains(&self.entity_bonus_cap) {
            return Err(ConfigError::EntityBonus(self.entity_bonus_cap));
        }

        Ok(())
    }
}
