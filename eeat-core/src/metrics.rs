//! The nine E-E-A-T sub-score metrics
//!
//! Metric keys keep the judge's wire names (`info_originale`, `credibilite`, ...)
//! so breakdowns round-trip through prompts, cache payloads and reports unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// One fine-grained sub-score dimension rated by the judge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    InfoOriginale,
    DescriptionComplete,
    AnalysePertinente,
    ValeurOriginale,
    TitreDescriptif,
    TitreSobre,
    Credibilite,
    QualiteProduction,
    AttentionLecteur,
}

impl Metric {
    /// All metrics in canonical order
    pub const ALL: [Metric; 9] = [
        Metric::InfoOriginale,
        Metric::DescriptionComplete,
        Metric::AnalysePertinente,
        Metric::ValeurOriginale,
        Metric::TitreDescriptif,
        Metric::TitreSobre,
        Metric::Credibilite,
        Metric::QualiteProduction,
        Metric::AttentionLecteur,
    ];

    /// Wire key used in `eeat_breakdown`
    pub fn key(self) -> &'static str {
        match self {
            Metric::InfoOriginale => "info_originale",
            Metric::DescriptionComplete => "description_complete",
            Metric::AnalysePertinente => "analyse_pertinente",
            Metric::ValeurOriginale => "valeur_originale",
            Metric::TitreDescriptif => "titre_descriptif",
            Metric::TitreSobre => "titre_sobre",
            Metric::Credibilite => "credibilite",
            Metric::QualiteProduction => "qualite_production",
            Metric::AttentionLecteur => "attention_lecteur",
        }
    }

    /// Human-readable label for prompts and reports
    pub fn label(self) -> &'static str {
        match self {
            Metric::InfoOriginale => "Information originality",
            Metric::DescriptionComplete => "Description completeness",
            Metric::AnalysePertinente => "Analysis relevance",
            Metric::ValeurOriginale => "Original value",
            Metric::TitreDescriptif => "Title clarity",
            Metric::TitreSobre => "Title sobriety",
            Metric::Credibilite => "Credibility",
            Metric::QualiteProduction => "Production quality",
            Metric::AttentionLecteur => "Reader engagement",
        }
    }

    pub fn from_key(key: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.key() == key)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Why a judge breakdown could not be turned into sub-scores
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BreakdownError {
    #[error("eeat_breakdown is not an object")]
    NotAnObject,

    #[error("eeat_breakdown is missing `{0}`")]
    Missing(Metric),

    #[error("eeat_breakdown.{0} is not numeric")]
    NotNumeric(Metric),

    #[error("eeat_breakdown.{metric} = {value} is outside [0, 100]")]
    OutOfRange { metric: Metric, value: f64 },
}

/// The nine judge sub-scores, each expected in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EEATSubScores {
    pub info_originale: f64,
    pub description_complete: f64,
    pub analyse_pertinente: f64,
    pub valeur_originale: f64,
    pub titre_descriptif: f64,
    pub titre_sobre: f64,
    pub credibilite: f64,
    pub qualite_production: f64,
    pub attention_lecteur: f64,
}

impl EEATSubScores {
    /// Every metric set to the same value
    pub fn uniform(value: f64) -> Self {
        Self {
            info_originale: value,
            description_complete: value,
            analyse_pertinente: value,
            valeur_originale: value,
            titre_descriptif: value,
            titre_sobre: value,
            credibilite: value,
            qualite_production: value,
            attention_lecteur: value,
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::InfoOriginale => self.info_originale,
            Metric::DescriptionComplete => self.description_complete,
            Metric::AnalysePertinente => self.analyse_pertinente,
            Metric::ValeurOriginale => self.valeur_originale,
            Metric::TitreDescriptif => self.titre_descriptif,
            Metric::TitreSobre => self.titre_sobre,
            Metric::Credibilite => self.credibilite,
            Metric::QualiteProduction => self.qualite_production,
            Metric::AttentionLecteur => self.attention_lecteur,
        }
    }

    /// Return a copy with one metric replaced
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        let slot = match metric {
            Metric::InfoOriginale => &mut self.info_originale,
            Metric::DescriptionComplete => &mut self.description_complete,
            Metric::AnalysePertinente => &mut self.analyse_pertinente,
            Metric::ValeurOriginale => &mut self.valeur_originale,
            Metric::TitreDescriptif => &mut self.titre_descriptif,
            Metric::TitreSobre => &mut self.titre_sobre,
            Metric::Credibilite => &mut self.credibilite,
            Metric::QualiteProduction => &mut self.qualite_production,
            Metric::AttentionLecteur => &mut self.attention_lecteur,
        };
        *slot = value;
        self
    }

    /// (metric, score) pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    /// Parse a judge `eeat_breakdown` object.
    ///
    /// All nine keys must be present and numeric within [0, 100]. Extra keys are
    /// ignored.
    pub fn from_breakdown(value: &Value) -> Result<Self, BreakdownError> {
        let map: &Map<String, Value> = value.as_object().ok_or(BreakdownError::NotAnObject)?;

        let mut scores = Self::uniform(0.0);
        for metric in Metric::ALL {
            let raw = map.get(metric.key()).ok_or(BreakdownError::Missing(metric))?;
            let score = raw.as_f64().ok_or(BreakdownError::NotNumeric(metric))?;
            if !(0.0..=100.0).contains(&score) {
                return Err(BreakdownError::OutOfRange {
                    metric,
                    value: score,
                });
            }
            scores = scores.with(metric, score);
        }

        Ok(scores)
    }
}
