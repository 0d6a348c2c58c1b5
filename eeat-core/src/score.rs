//! Scorer: sub-scores in, area scores + weaknesses out
//!
//! `Scorer::compute` is a pure function of the nine sub-scores and the scoring
//! configuration. It never clamps: a sub-score outside [0, 100] is an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{
    ConfigError, EEATSubScores, ImprovementPlan, MainEntity, Metric, ScoringConfig, Sentiment,
};

/// The four E-E-A-T areas
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Area {
    Expertise,
    Experience,
    Authoritativeness,
    Trustworthiness,
}

impl Area {
    pub const ALL: [Area; 4] = [
        Area::Expertise,
        Area::Experience,
        Area::Authoritativeness,
        Area::Trustworthiness,
    ];
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Area::Expertise => "Expertise",
            Area::Experience => "Experience",
            Area::Authoritativeness => "Authoritativeness",
            Area::Trustworthiness => "Trustworthiness",
        };
        f.write_str(name)
    }
}

/// Severity of a weak metric; also the priority rank of a recommendation.
///
/// Variant order is the sort order: critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
        }
    }

    pub fn parse(value: &str) -> Option<Severity> {
        match value {
            "critical" => Some(Severity::Critical),
            "major" => Some(Severity::Major),
            "minor" => Some(Severity::Minor),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sub-score below the minor threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weakness {
    pub metric: Metric,
    pub score: f64,
    pub severity: Severity,
}

/// Area and global scores derived from sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EEATScore {
    pub global: f64,
    pub expertise: f64,
    pub experience: f64,
    pub authority: f64,
    pub trust: f64,
}

impl EEATScore {
    pub fn area(&self, area: Area) -> f64 {
        match area {
            Area::Expertise => self.expertise,
            Area::Experience => self.experience,
            Area::Authoritativeness => self.authority,
            Area::Trustworthiness => self.trust,
        }
    }
}

/// Scoring failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("invalid sub-score {metric} = {value}: expected a number in [0, 100]")]
    InvalidSubScore { metric: Metric, value: f64 },
}

/// Result of [`Scorer::compute`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score: EEATScore,
    /// Ascending by score, most severe first
    pub weaknesses: Vec<Weakness>,
}

/// Overall quality band of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Excellent,
    Good,
    Average,
    Poor,
}

impl QualityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityLevel::Excellent => "excellent",
            QualityLevel::Good => "good",
            QualityLevel::Average => "average",
            QualityLevel::Poor => "poor",
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            QualityLevel::Excellent
        } else if score >= 60.0 {
            QualityLevel::Good
        } else if score >= 40.0 {
            QualityLevel::Average
        } else {
            QualityLevel::Poor
        }
    }
}

/// Composite view of a page: pure E-E-A-T score plus entity and reader signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub eeat: EEATScore,
    pub weaknesses: Vec<Weakness>,
    /// Bonus granted when the main entity is spread across intro, body and conclusion
    pub entity_bonus: f64,
    /// `eeat.global + entity_bonus`, capped at 100
    pub adjusted_global: f64,
    /// 70% global, 20% readability, 10% sentiment
    pub composite: f64,
    pub quality_level: QualityLevel,
    /// Rule-based actions from weaknesses and entity placement
    pub improvements: ImprovementPlan,
}

/// Combines sub-scores into area scores and classifies weaknesses
#[derive(Debug, Clone)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Severity band for a score, `None` when it is not a weakness
    pub fn severity(&self, score: f64) -> Option<Severity> {
        let t = &self.config.thresholds;
        if score < t.critical {
            Some(Severity::Critical)
        } else if score < t.major {
            Some(Severity::Major)
        } else if score < t.minor {
            Some(Severity::Minor)
        } else {
            None
        }
    }

    /// Areas a metric contributes to (non-zero weight)
    pub fn areas_for(&self, metric: Metric) -> Vec<Area> {
        Area::ALL
            .into_iter()
            .filter(|area| {
                self.config
                    .areas
                    .for_area(*area)
                    .get(&metric)
                    .is_some_and(|w| *w > 0.0)
            })
            .collect()
    }

    pub fn compute(&self, sub_scores: &EEATSubScores) -> Result<ScoreOutcome, ScoreError> {
        for (metric, value) in sub_scores.iter() {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ScoreError::InvalidSubScore { metric, value });
            }
        }

        let area_score = |area: Area| {
            let weights = self.config.areas.for_area(area);
            let total: f64 = weights.values().sum();
            let weighted: f64 = weights
                .iter()
                .map(|(metric, weight)| sub_scores.get(*metric) * weight)
                .sum();
            weighted / total
        };

        let expertise = area_score(Area::Expertise);
        let experience = area_score(Area::Experience);
        let authority = area_score(Area::Authoritativeness);
        let trust = area_score(Area::Trustworthiness);

        let g = &self.config.global;
        let global = (expertise * g.expertise
            + experience * g.experience
            + authority * g.authoritativeness
            + trust * g.trustworthiness)
            / (g.expertise + g.experience + g.authoritativeness + g.trustworthiness);

        let mut weaknesses: Vec<Weakness> = sub_scores
            .iter()
            .filter_map(|(metric, score)| {
                self.severity(score).map(|severity| Weakness {
                    metric,
                    score,
                    severity,
                })
            })
            .collect();
        // Stable sort over canonical metric order keeps ties deterministic
        weaknesses.sort_by(|a, b| a.score.total_cmp(&b.score));

        Ok(ScoreOutcome {
            score: EEATScore {
                global,
                expertise,
                experience,
                authority,
                trust,
            },
            weaknesses,
        })
    }

    /// Build the composite card from a computed outcome and page signals
    pub fn score_card(
        &self,
        outcome: ScoreOutcome,
        entity: &MainEntity,
        readability: f64,
        sentiment: Sentiment,
    ) -> ScoreCard {
        let entity_bonus = if entity.distribution.covers_all_sections() {
            (entity.coverage_score / 20.0).min(self.config.entity_bonus_cap)
        } else {
            0.0
        };
        let adjusted_global = (outcome.score.global + entity_bonus).min(100.0);
        let composite = outcome.score.global * 0.7
            + readability.clamp(0.0, 100.0) * 0.2
            + sentiment.score() * 0.1;

        ScoreCard {
            improvements: ImprovementPlan::build(&outcome.weaknesses, entity),
            eeat: outcome.score,
            weaknesses: outcome.weaknesses,
            entity_bonus,
            adjusted_global,
            composite,
            quality_level: QualityLevel::from_score(adjusted_global),
        }
    }
}
