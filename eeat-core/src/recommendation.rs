//! Recommendations returned by the second judge call

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Severity;

/// Recommendation priority shares the weakness severity scale
pub type Priority = Severity;

/// Area a recommendation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EeatArea {
    Expertise,
    Experience,
    Authoritativeness,
    Trustworthiness,
    #[serde(rename = "Content Coverage")]
    ContentCoverage,
}

impl EeatArea {
    pub fn as_str(self) -> &'static str {
        match self {
            EeatArea::Expertise => "Expertise",
            EeatArea::Experience => "Experience",
            EeatArea::Authoritativeness => "Authoritativeness",
            EeatArea::Trustworthiness => "Trustworthiness",
            EeatArea::ContentCoverage => "Content Coverage",
        }
    }

    pub fn parse(value: &str) -> Option<EeatArea> {
        match value {
            "Expertise" => Some(EeatArea::Expertise),
            "Experience" => Some(EeatArea::Experience),
            "Authoritativeness" => Some(EeatArea::Authoritativeness),
            "Trustworthiness" => Some(EeatArea::Trustworthiness),
            "Content Coverage" => Some(EeatArea::ContentCoverage),
            _ => None,
        }
    }
}

impl fmt::Display for EeatArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where on the page the change applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Introduction,
    Body,
    Conclusion,
    Title,
    Overall,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Introduction => "introduction",
            Section::Body => "body",
            Section::Conclusion => "conclusion",
            Section::Title => "title",
            Section::Overall => "overall",
        }
    }

    pub fn parse(value: &str) -> Option<Section> {
        match value {
            "introduction" => Some(Section::Introduction),
            "body" => Some(Section::Body),
            "conclusion" => Some(Section::Conclusion),
            "title" => Some(Section::Title),
            "overall" => Some(Section::Overall),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub eeat_area: EeatArea,
    pub section: Section,
    pub recommendation: String,
    pub rationale: String,
    /// Ready-to-insert text, only in draft mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_content: Option<String>,
}

/// Stable sort: critical, then major, then minor; judge order kept within a priority
pub fn sort_by_priority(recommendations: &mut [Recommendation]) {
    recommendations.sort_by_key(|r| r.priority);
}
