//! Strict validation of judge responses
//!
//! Any missing key, wrong type, out-of-range number or out-of-enum value is a
//! schema violation. [`ValidatingJudge`] retries a violation exactly once with
//! a corrective instruction before surfacing it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use eeat_core::{
    contains_ignore_case, Category, EEATSubScores, EeatArea, Readability, ReadabilityLabel,
    Recommendation, Section, Sentiment, Severity, MAX_TITLE_CHARS, MIN_RECOMMENDATIONS,
};

use crate::{Judge, JudgeError, JudgeRequest, ResponseSchema, SharedJudge};

/// A validated evaluation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub main_entity: String,
    pub title_suggested: String,
    /// The judge's own overall figure, kept for reference only
    pub declared_eeat: f64,
    pub sub_scores: EEATSubScores,
    pub sentiment: Sentiment,
    pub readability: Readability,
    pub category: Category,
    pub resume: String,
    pub notes: Vec<String>,
}

fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Value, String> {
    obj.get(key).ok_or_else(|| format!("missing `{}`", key))
}

fn string_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    field(obj, key)?
        .as_str()
        .ok_or_else(|| format!("`{}` must be a string", key))
}

fn non_empty<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    let value = string_field(obj, key)?.trim();
    if value.is_empty() {
        Err(format!("`{}` must not be empty", key))
    } else {
        Ok(value)
    }
}

fn score_field(obj: &Map<String, Value>, key: &str) -> Result<f64, String> {
    let score = field(obj, key)?
        .as_f64()
        .ok_or_else(|| format!("`{}` must be a number", key))?;
    if (0.0..=100.0).contains(&score) {
        Ok(score)
    } else {
        Err(format!("`{}` = {} is outside [0, 100]", key, score))
    }
}

fn enum_field<T>(
    obj: &Map<String, Value>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, String> {
    let raw = string_field(obj, key)?;
    parse(raw).ok_or_else(|| format!("`{}` has unexpected value `{}`", key, raw))
}

/// Parse and check an evaluation response
pub fn parse_evaluation(value: &Value) -> Result<Evaluation, String> {
    let obj = value.as_object().ok_or("response is not an object")?;

    let main_entity = non_empty(obj, "main_entity")?.to_string();

    let title_suggested = string_field(obj, "title_suggested")?.trim().to_string();
    let title_len = title_suggested.chars().count();
    if title_len > MAX_TITLE_CHARS {
        return Err(format!(
            "`title_suggested` has {} characters, at most {} allowed",
            title_len, MAX_TITLE_CHARS
        ));
    }
    if !contains_ignore_case(&title_suggested, &main_entity) {
        return Err(format!(
            "`title_suggested` must contain the main entity `{}`",
            main_entity
        ));
    }

    let declared_eeat = score_field(obj, "eeat")?;
    let sub_scores =
        EEATSubScores::from_breakdown(field(obj, "eeat_breakdown")?).map_err(|e| e.to_string())?;
    let sentiment = enum_field(obj, "sentiment", Sentiment::parse)?;

    let lisibilite = field(obj, "lisibilite")?
        .as_object()
        .ok_or("`lisibilite` must be an object")?;
    let readability = Readability {
        score: score_field(lisibilite, "score").map_err(|e| format!("lisibilite: {}", e))?,
        label: enum_field(lisibilite, "label", ReadabilityLabel::parse)
            .map_err(|e| format!("lisibilite: {}", e))?,
    };

    let category = enum_field(obj, "categorie", Category::parse)?;
    let resume = string_field(obj, "resume")?.trim().to_string();

    let notes = match field(obj, "notes")? {
        Value::String(s) => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| "`notes` entries must be strings".to_string())
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err("`notes` must be a string or a list of strings".to_string()),
    };

    Ok(Evaluation {
        main_entity,
        title_suggested,
        declared_eeat,
        sub_scores,
        sentiment,
        readability,
        category,
        resume,
        notes,
    })
}

/// Parse and check a recommendation response.
///
/// Returns every entry in judge order. `proposed_content` is kept only in draft
/// mode; whether a draft names the main entity is checked by the recommender.
pub fn parse_recommendations(value: &Value, with_draft: bool) -> Result<Vec<Recommendation>, String> {
    let obj = value.as_object().ok_or("response is not an object")?;
    let entries = field(obj, "recommendations")?
        .as_array()
        .ok_or("`recommendations` must be a list")?;

    if entries.len() < MIN_RECOMMENDATIONS {
        return Err(format!(
            "expected at least {} recommendations, got {}",
            MIN_RECOMMENDATIONS,
            entries.len()
        ));
    }

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            parse_recommendation(entry, with_draft).map_err(|e| format!("recommendations[{}]: {}", i, e))
        })
        .collect()
}

fn parse_recommendation(entry: &Value, with_draft: bool) -> Result<Recommendation, String> {
    let obj = entry.as_object().ok_or("entry is not an object")?;

    let proposed_content = if with_draft {
        obj.get("proposed_content")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    } else {
        None
    };

    Ok(Recommendation {
        priority: enum_field(obj, "priority", Severity::parse)?,
        eeat_area: enum_field(obj, "eeat_area", EeatArea::parse)?,
        section: enum_field(obj, "section", Section::parse)?,
        recommendation: non_empty(obj, "recommendation")?.to_string(),
        rationale: non_empty(obj, "rationale")?.to_string(),
        proposed_content,
    })
}

/// Check a response against the schema a request expects
pub fn validate(schema: ResponseSchema, value: &Value) -> Result<(), String> {
    match schema {
        ResponseSchema::Evaluation => parse_evaluation(value).map(|_| ()),
        ResponseSchema::Recommendations { with_draft } => {
            parse_recommendations(value, with_draft).map(|_| ())
        }
    }
}

fn corrective_note(reason: &str) -> String {
    format!(
        "IMPORTANT: your previous answer was rejected ({}). Reply again with one valid JSON \
         object that follows the required structure exactly, with every field present and \
         within its allowed values.",
        reason
    )
}

/// Validates responses; one corrective retry on a violation
pub struct ValidatingJudge {
    inner: SharedJudge,
}

impl ValidatingJudge {
    pub fn new(inner: SharedJudge) -> Self {
        Self { inner }
    }

    async fn checked(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
        let value = self.inner.evaluate(request).await?;
        validate(request.schema, &value).map_err(JudgeError::SchemaViolation)?;
        Ok(value)
    }
}

#[async_trait]
impl Judge for ValidatingJudge {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
        match self.checked(request).await {
            Err(JudgeError::SchemaViolation(reason)) => {
                warn!(
                    url = %request.url,
                    "Judge response rejected ({}); retrying once with a corrective note",
                    reason
                );
                self.checked(&request.with_correction(&corrective_note(&reason)))
                    .await
            }
            other => other,
        }
    }
}
