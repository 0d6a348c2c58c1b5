//! Rule-based improvement plan
//!
//! A deterministic companion to the judge's recommendations: one item per weak
//! metric plus main-entity placement tips, ranked by priority then impact.

use serde::{Deserialize, Serialize};

use crate::{MainEntity, Metric, Severity, Weakness};

/// Coverage below this is a critical entity problem
const COVERAGE_CRITICAL: f64 = 40.0;
/// Coverage below this still needs more mentions
const COVERAGE_MAJOR: f64 = 70.0;
/// Plan items surfaced as top priorities
pub const TOP_PRIORITIES: usize = 3;

/// What an improvement is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementTarget {
    Metric(Metric),
    EntityInTitle,
    EntityCoverage,
    EntityDistribution,
}

impl ImprovementTarget {
    pub fn label(self) -> &'static str {
        match self {
            ImprovementTarget::Metric(metric) => metric.label(),
            ImprovementTarget::EntityInTitle => "Entity in title",
            ImprovementTarget::EntityCoverage => "Entity coverage",
            ImprovementTarget::EntityDistribution => "Entity distribution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub target: ImprovementTarget,
    pub score: f64,
    pub priority: Severity,
    /// Expected gain, 0-100; ranks items within a priority
    pub impact: u32,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Critical,
    NeedsImprovement,
    Good,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Critical => "critical",
            PlanStatus::NeedsImprovement => "needs_improvement",
            PlanStatus::Good => "good",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementPlan {
    pub status: PlanStatus,
    pub critical_count: usize,
    pub major_count: usize,
    /// Critical before major before minor, higher impact first
    pub items: Vec<Improvement>,
}

impl ImprovementPlan {
    /// Build the plan from classified weaknesses and the page's main entity
    pub fn build(weaknesses: &[Weakness], entity: &MainEntity) -> Self {
        let mut items: Vec<Improvement> = weaknesses
            .iter()
            .map(|w| Improvement {
                target: ImprovementTarget::Metric(w.metric),
                score: w.score,
                priority: w.severity,
                impact: ((100.0 - w.score) * impact_weight(w.metric)).max(0.0) as u32,
                action: metric_action(w.metric, w.severity, &entity.name),
            })
            .collect();
        items.extend(entity_tips(entity));
        // Stable: equal (priority, impact) keep metric order, then entity tips
        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.impact.cmp(&a.impact))
        });

        let count = |severity| items.iter().filter(|i| i.priority == severity).count();
        let critical_count = count(Severity::Critical);
        let major_count = count(Severity::Major);
        let status = if critical_count > 0 {
            PlanStatus::Critical
        } else if major_count > 0 {
            PlanStatus::NeedsImprovement
        } else {
            PlanStatus::Good
        };

        Self {
            status,
            critical_count,
            major_count,
            items,
        }
    }

    pub fn top_priorities(&self) -> &[Improvement] {
        &self.items[..self.items.len().min(TOP_PRIORITIES)]
    }
}

fn impact_weight(metric: Metric) -> f64 {
    match metric {
        Metric::InfoOriginale => 1.0,
        Metric::ValeurOriginale => 0.95,
        Metric::AnalysePertinente | Metric::Credibilite => 0.9,
        Metric::DescriptionComplete => 0.85,
        Metric::AttentionLecteur => 0.75,
        Metric::QualiteProduction => 0.7,
        Metric::TitreDescriptif => 0.6,
        Metric::TitreSobre => 0.5,
    }
}

fn metric_action(metric: Metric, severity: Severity, entity: &str) -> String {
    use Severity::*;
    match (metric, severity) {
        (Metric::InfoOriginale, Critical) => format!("Add information about {} found nowhere else", entity),
        (Metric::InfoOriginale, Major) => format!("Enrich the page with a unique perspective on {}", entity),
        (Metric::InfoOriginale, Minor) => format!("Strengthen the originality of the {} coverage", entity),
        (Metric::DescriptionComplete, Critical) => format!("Cover every facet of {}", entity),
        (Metric::DescriptionComplete, Major) => format!("Describe {} in more depth", entity),
        (Metric::DescriptionComplete, Minor) => format!("Fill the remaining gaps about {}", entity),
        (Metric::AnalysePertinente, Critical) => format!("The analysis of {} is superficial; add real assessment", entity),
        (Metric::AnalysePertinente, Major) => format!("Add critical analysis of {}", entity),
        (Metric::AnalysePertinente, Minor) => format!("Sharpen the analysis of {}", entity),
        (Metric::ValeurOriginale, Critical) => format!("Give readers something about {} they cannot get elsewhere", entity),
        (Metric::ValeurOriginale, Major) => format!("Create distinctive value around {}", entity),
        (Metric::ValeurOriginale, Minor) => format!("Raise the perceived value of the {} content", entity),
        (Metric::TitreDescriptif, Critical) => format!("Rewrite the title so it describes {}", entity),
        (Metric::TitreDescriptif, Major) => "Make the title clearer".to_string(),
        (Metric::TitreDescriptif, Minor) => "Refine the title".to_string(),
        (Metric::TitreSobre, Critical) => format!("Remove the clickbait from the {} title", entity),
        (Metric::TitreSobre, Major) => "Make the title more sober".to_string(),
        (Metric::TitreSobre, Minor) => "Tone down the title".to_string(),
        (Metric::Credibilite, Critical) => format!("Cite sources for the claims about {}", entity),
        (Metric::Credibilite, Major) => "Add reliable sources".to_string(),
        (Metric::Credibilite, Minor) => "Add more trust signals".to_string(),
        (Metric::QualiteProduction, Critical) => format!("Fix the many errors in the {} content", entity),
        (Metric::QualiteProduction, Major) => "Improve the writing quality".to_string(),
        (Metric::QualiteProduction, Minor) => "Polish the writing".to_string(),
        (Metric::AttentionLecteur, Critical) => format!("The {} content is flat; give readers a reason to stay", entity),
        (Metric::AttentionLecteur, Major) => "Make the content more engaging".to_string(),
        (Metric::AttentionLecteur, Minor) => "Liven up the content".to_string(),
    }
}

fn entity_tips(entity: &MainEntity) -> Vec<Improvement> {
    let name = &entity.name;
    let mut tips = Vec::new();

    if !entity.in_title {
        tips.push(Improvement {
            target: ImprovementTarget::EntityInTitle,
            score: 0.0,
            priority: Severity::Major,
            impact: 85,
            action: format!("Include \"{}\" in the title", name),
        });
    }

    let coverage = entity.coverage_score;
    if coverage < COVERAGE_CRITICAL {
        tips.push(Improvement {
            target: ImprovementTarget::EntityCoverage,
            score: coverage,
            priority: Severity::Critical,
            impact: 95,
            action: format!("\"{}\" is under-mentioned", name),
        });
    } else if coverage < COVERAGE_MAJOR {
        tips.push(Improvement {
            target: ImprovementTarget::EntityCoverage,
            score: coverage,
            priority: Severity::Major,
            impact: 70,
            action: format!("Mention \"{}\" more often", name),
        });
    }

    let missing = entity.distribution.missing_sections();
    if !missing.is_empty() {
        tips.push(Improvement {
            target: ImprovementTarget::EntityDistribution,
            score: 30.0,
            priority: Severity::Major,
            impact: 80,
            action: format!("\"{}\" is absent from: {}", name, missing.join(", ")),
        });
    }

    tips
}
