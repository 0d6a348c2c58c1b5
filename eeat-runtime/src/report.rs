//! Page and run reports, with JSON and Markdown export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use eeat_agents::describe_distribution;
use eeat_core::{
    CacheKey, Category, ContentMetrics, DetectionMethod, EEATSubScores, MainEntity, Metric,
    Readability, Recommendation, ScoreCard, Sentiment,
};

use crate::RunError;

/// Everything produced for a page that went through every stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub url: String,
    pub title: String,
    pub meta_description: Option<String>,
    pub content_metrics: ContentMetrics,
    pub language: String,
    pub language_method: DetectionMethod,
    /// Keyword pre-classification
    pub detected_category: Category,
    /// The judge's category, authoritative
    pub category: Category,
    /// Heuristic candidate sent to the judge as evidence
    pub entity_candidate: Option<String>,
    /// The judge's entity with statistics computed for it
    pub main_entity: MainEntity,
    pub title_suggested: String,
    /// The judge's own overall figure, for reference only
    pub declared_eeat: f64,
    pub sub_scores: EEATSubScores,
    pub score_card: ScoreCard,
    pub sentiment: Sentiment,
    pub readability: Readability,
    pub resume: String,
    pub notes: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub drafts_dropped: usize,
    pub regenerated: bool,
    pub cache_keys: Vec<CacheKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageStatus {
    Succeeded,
    Failed { reason: String },
    TimedOut,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Succeeded => "succeeded",
            PageStatus::Failed { .. } => "failed",
            PageStatus::TimedOut => "timed_out",
        }
    }
}

/// Outcome for one input URL; `report` is set only on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    #[serde(flatten)]
    pub status: PageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<PageReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl RunSummary {
    pub fn from_pages(pages: &[PageResult]) -> Self {
        let mut summary = Self {
            total: pages.len(),
            ..Self::default()
        };
        for page in pages {
            match page.status {
                PageStatus::Succeeded => summary.succeeded += 1,
                PageStatus::Failed { .. } => summary.failed += 1,
                PageStatus::TimedOut => summary.timed_out += 1,
            }
        }
        summary
    }
}

/// A whole run, pages in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub with_draft: bool,
    /// `id@version` of every prompt used
    pub prompt_versions: Vec<String>,
    pub pages: Vec<PageResult>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        with_draft: bool,
        prompt_versions: Vec<String>,
        pages: Vec<PageResult>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            with_draft,
            prompt_versions,
            summary: RunSummary::from_pages(&pages),
            pages,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_markdown(&self) -> String {
        Markdown(self).to_string()
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), RunError> {
        let path = path.as_ref();
        let json = self.to_json().map_err(|e| RunError::Export {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        write_file(path, &json)
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), RunError> {
        write_file(path.as_ref(), &self.to_markdown())
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), RunError> {
    std::fs::write(path, content).map_err(|source| RunError::Export {
        path: path.to_path_buf(),
        source,
    })
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

struct Markdown<'a>(&'a RunReport);

impl fmt::Display for Markdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.0;
        writeln!(f, "# E-E-A-T Report")?;
        writeln!(f)?;
        writeln!(f, "- Run: `{}`", run.run_id)?;
        writeln!(
            f,
            "- Started: {} / finished: {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            run.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(
            f,
            "- Pages: {} ({} succeeded, {} failed, {} timed out)",
            run.summary.total, run.summary.succeeded, run.summary.failed, run.summary.timed_out
        )?;
        writeln!(f, "- Prompts: {}", run.prompt_versions.join(", "))?;

        for page in &run.pages {
            writeln!(f)?;
            writeln!(f, "## {}", page.url)?;
            writeln!(f)?;
            match (&page.status, &page.report) {
                (PageStatus::Succeeded, Some(report)) => write_page(f, report)?,
                (PageStatus::Failed { reason }, _) => writeln!(f, "**Failed:** {}", reason)?,
                (status, _) => writeln!(f, "**Status:** {}", status.as_str())?,
            }
        }
        Ok(())
    }
}

fn write_page(f: &mut fmt::Formatter<'_>, report: &PageReport) -> fmt::Result {
    let card = &report.score_card;
    let entity = &report.main_entity;

    writeln!(f, "**Title:** {}  ", report.title)?;
    writeln!(f, "**Suggested title:** {}  ", report.title_suggested)?;
    writeln!(
        f,
        "**Language:** {}  \n**Category:** {}  ",
        report.language, report.category
    )?;
    writeln!(
        f,
        "**Main entity:** {} (in title: {}, {} mentions, {})",
        entity.name,
        yes_no(entity.in_title),
        entity.mention_count,
        describe_distribution(&entity.distribution)
    )?;
    let metrics = &report.content_metrics;
    writeln!(
        f,
        "**Content:** {} words, {} chars{}, meta description: {}",
        metrics.content_words,
        metrics.content_chars,
        if metrics.content_sufficient { "" } else { " (thin)" },
        metrics
            .meta_description_chars
            .map_or("missing".to_string(), |n| format!("{} chars", n))
    )?;
    writeln!(f)?;

    writeln!(f, "| Score | Value |")?;
    writeln!(f, "|---|---|")?;
    writeln!(f, "| Global E-E-A-T | {:.1} |", card.eeat.global)?;
    writeln!(f, "| Expertise | {:.1} |", card.eeat.expertise)?;
    writeln!(f, "| Experience | {:.1} |", card.eeat.experience)?;
    writeln!(f, "| Authoritativeness | {:.1} |", card.eeat.authority)?;
    writeln!(f, "| Trustworthiness | {:.1} |", card.eeat.trust)?;
    writeln!(
        f,
        "| Adjusted global (entity bonus {:.1}) | {:.1} |",
        card.entity_bonus, card.adjusted_global
    )?;
    writeln!(f, "| Composite | {:.1} |", card.composite)?;
    writeln!(f, "| Quality | {} |", card.quality_level.as_str())?;
    writeln!(
        f,
        "| Readability | {:.0} ({}) |",
        report.readability.score,
        report.readability.label.as_str()
    )?;
    writeln!(f, "| Sentiment | {} |", report.sentiment.as_str())?;
    writeln!(f)?;

    writeln!(f, "### Sub-scores")?;
    writeln!(f)?;
    for metric in Metric::ALL {
        writeln!(
            f,
            "- {} (`{}`): {:.0}",
            metric.label(),
            metric.key(),
            report.sub_scores.get(metric)
        )?;
    }
    writeln!(f)?;

    if !report.resume.is_empty() {
        writeln!(f, "> {}", report.resume)?;
        writeln!(f)?;
    }

    writeln!(f, "### Weaknesses")?;
    writeln!(f)?;
    if card.weaknesses.is_empty() {
        writeln!(f, "None.")?;
    }
    for weakness in &card.weaknesses {
        writeln!(
            f,
            "- **{}** {} ({:.0})",
            weakness.severity,
            weakness.metric.label(),
            weakness.score
        )?;
    }
    writeln!(f)?;

    let plan = &card.improvements;
    writeln!(f, "### Improvement plan ({})", plan.status.as_str())?;
    writeln!(f)?;
    if plan.items.is_empty() {
        writeln!(f, "None.")?;
    }
    for item in &plan.items {
        writeln!(
            f,
            "- **{}** {} (impact {}): {}",
            item.priority,
            item.target.label(),
            item.impact,
            item.action
        )?;
    }
    writeln!(f)?;

    writeln!(f, "### Recommendations")?;
    writeln!(f)?;
    if report.recommendations.is_empty() {
        writeln!(f, "None.")?;
    }
    for (i, rec) in report.recommendations.iter().enumerate() {
        writeln!(
            f,
            "{}. **[{}] {} / {}**: {}",
            i + 1,
            rec.priority,
            rec.eeat_area,
            rec.section,
            rec.recommendation
        )?;
        writeln!(f, "   - Why: {}", rec.rationale)?;
        if let Some(draft) = &rec.proposed_content {
            writeln!(f, "   - Draft: {}", draft)?;
        }
    }
    if report.drafts_dropped > 0 {
        writeln!(
            f,
            "\n_{} recommendation(s) dropped: drafts did not name the main entity._",
            report.drafts_dropped
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(url: &str) -> PageResult {
        PageResult {
            url: url.to_string(),
            status: PageStatus::Failed {
                reason: "no usable content".to_string(),
            },
            report: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let pages = vec![
            failed("a"),
            PageResult {
                url: "b".into(),
                status: PageStatus::TimedOut,
                report: None,
            },
            failed("c"),
        ];
        let summary = RunSummary::from_pages(&pages);
        assert_eq!(
            summary,
            RunSummary {
                total: 3,
                succeeded: 0,
                failed: 2,
                timed_out: 1
            }
        );
    }

    #[test]
    fn test_status_serializes_flat() {
        let value = serde_json::to_value(failed("https://x")).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["reason"], "no usable content");
        assert!(value.get("report").is_none());
    }

    #[test]
    fn test_markdown_lists_failures() {
        let report = RunReport::new(
            Utc::now(),
            false,
            vec!["evaluate@2".into()],
            vec![failed("https://x")],
        );
        let md = report.to_markdown();
        assert!(md.starts_with("# E-E-A-T Report"));
        assert!(md.contains("## https://x"));
        assert!(md.contains("**Failed:** no usable content"));
        assert!(md.contains("1 failed"));
    }
}
