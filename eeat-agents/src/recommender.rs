//! Recommendation generator: second judge call
//!
//! Turns the weakness list, entity statistics and a content excerpt into 5-8
//! prioritized recommendations. In draft mode every entry needs ready-to-insert
//! text naming the main entity; failing entries trigger one regeneration of the
//! whole list, and entries still failing after it are dropped.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use eeat_core::{
    contains_ignore_case, sort_by_priority, CacheKey, Category, Deadline, EEATScore,
    EEATSubScores, MainEntity, PageContent, PinSet, Recommendation, Scorer, Weakness,
    MAX_RECOMMENDATIONS,
};

use crate::{
    describe_distribution, parse_recommendations, JudgeError, JudgeRequest, PromptError,
    PromptRegistry, PromptTemplate, PromptVars, ResponseSchema, SharedJudge, RECOMMEND_PROMPT,
};

/// Characters of cleaned text sent with the recommendation prompt
pub const RECOMMENDATION_EXCERPT_CHARS: usize = 3000;

/// Everything the second call needs about one page
#[derive(Debug, Clone, Copy)]
pub struct RecommendInput<'a> {
    pub content: &'a PageContent,
    /// The judge's entity, with statistics recomputed for it
    pub entity: &'a MainEntity,
    pub category: Category,
    pub score: &'a EEATScore,
    pub sub_scores: &'a EEATSubScores,
    pub weaknesses: &'a [Weakness],
    pub scorer: &'a Scorer,
    /// Holds the cache pins of every call made
    pub pins: &'a PinSet,
}

/// Ordered recommendations plus bookkeeping for the page report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendOutcome {
    pub recommendations: Vec<Recommendation>,
    /// Keys of the judge calls made (or served from cache)
    pub cache_keys: Vec<CacheKey>,
    /// Entries removed for failing draft validation
    pub dropped: usize,
    pub regenerated: bool,
}

pub struct RecommendationGenerator {
    judge: SharedJudge,
    template: PromptTemplate,
    with_draft: bool,
    excerpt_chars: usize,
    /// Part of the cache key
    model: String,
}

impl RecommendationGenerator {
    pub fn new(
        judge: SharedJudge,
        registry: &PromptRegistry,
        with_draft: bool,
    ) -> Result<Self, PromptError> {
        Ok(Self {
            judge,
            template: registry.get(RECOMMEND_PROMPT)?.clone(),
            with_draft,
            excerpt_chars: RECOMMENDATION_EXCERPT_CHARS,
            model: String::new(),
        })
    }

    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_draft(&self) -> bool {
        self.with_draft
    }

    /// Render the prompt; `note` is appended for a regeneration
    pub fn build_request(
        &self,
        input: &RecommendInput<'_>,
        note: Option<&str>,
    ) -> Result<JudgeRequest, PromptError> {
        let content = input.content;
        let entity = input.entity;

        let mut vars = PromptVars::new();
        vars.insert("language_target", content.language.clone());
        vars.insert("url", content.url.clone());
        vars.insert("title", content.title.clone());
        vars.insert("main_entity", entity.name.clone());
        vars.insert("categorie", input.category.to_string());
        vars.insert("eeat_global", format!("{:.1}", input.score.global));
        vars.insert("expertise", format!("{:.1}", input.score.expertise));
        vars.insert("experience", format!("{:.1}", input.score.experience));
        vars.insert("authority", format!("{:.1}", input.score.authority));
        vars.insert("trust", format!("{:.1}", input.score.trust));
        for (metric, value) in input.sub_scores.iter() {
            vars.insert(metric.key(), format!("{:.0}", value));
        }
        vars.insert("weaknesses", weakness_lines(input.weaknesses, input.scorer));
        vars.insert("entity_in_title", entity.in_title.to_string());
        vars.insert("entity_mentions", entity.mention_count.to_string());
        vars.insert(
            "entity_distribution",
            describe_distribution(&entity.distribution),
        );
        vars.insert("with_draft", self.with_draft.to_string());
        vars.insert("content_extract", content.excerpt(self.excerpt_chars));

        let mut user = self.template.render(&vars)?;
        if let Some(note) = note {
            user = format!("{}\n\n{}", user, note);
        }

        let system = self.template.system_prompt().to_string();
        Ok(JudgeRequest {
            url: content.url.clone(),
            cache_key: JudgeRequest::derive_key(
                &content.url,
                &system,
                &user,
                &self.template.version_tag(),
                &self.model,
            ),
            system,
            user,
            schema: ResponseSchema::Recommendations {
                with_draft: self.with_draft,
            },
            options: self.template.options(),
            pins: input.pins.clone(),
        })
    }

    pub async fn recommend(
        &self,
        input: RecommendInput<'_>,
        deadline: &Deadline,
    ) -> Result<RecommendOutcome, JudgeError> {
        let url = &input.content.url;

        if input.weaknesses.is_empty() {
            info!(url = %url, "No weaknesses; skipping recommendations");
            return Ok(RecommendOutcome::default());
        }

        deadline.check("recommendations")?;
        let request = self.build_request(&input, None)?;
        let first = self.call(&request).await?;

        let mut outcome = RecommendOutcome {
            cache_keys: vec![request.cache_key],
            ..RecommendOutcome::default()
        };

        let failing = self.failing_drafts(&first, &input.entity.name);
        let mut recommendations = if failing.is_empty() {
            first
        } else {
            warn!(
                url = %url,
                failing = failing.len(),
                "Drafts do not name the main entity; regenerating once"
            );
            deadline.check("draft regeneration")?;

            let note = regeneration_note(&failing, &input.entity.name);
            let retry = self.build_request(&input, Some(&note))?;
            outcome.regenerated = true;

            let list = match self.call(&retry).await {
                Ok(second) => {
                    outcome.cache_keys.push(retry.cache_key);
                    second
                }
                Err(JudgeError::SchemaViolation(reason)) => {
                    warn!(
                        url = %url,
                        "Regenerated recommendations invalid ({}); keeping the first list",
                        reason
                    );
                    first
                }
                Err(e) => return Err(e),
            };

            let before = list.len();
            let kept: Vec<_> = list
                .into_iter()
                .filter(|r| self.draft_ok(r, &input.entity.name))
                .collect();
            outcome.dropped = before - kept.len();
            if outcome.dropped > 0 {
                warn!(
                    url = %url,
                    dropped = outcome.dropped,
                    "Dropped recommendations whose drafts still miss the main entity"
                );
            }
            kept
        };

        sort_by_priority(&mut recommendations);
        outcome.recommendations = recommendations;

        info!(
            url = %url,
            count = outcome.recommendations.len(),
            "Recommendations ready"
        );
        Ok(outcome)
    }

    async fn call(&self, request: &JudgeRequest) -> Result<Vec<Recommendation>, JudgeError> {
        let value = self.judge.evaluate(request).await?;
        let mut list = parse_recommendations(&value, self.with_draft)
            .map_err(JudgeError::SchemaViolation)?;

        if list.len() > MAX_RECOMMENDATIONS {
            warn!(
                url = %request.url,
                received = list.len(),
                "Judge returned too many recommendations; keeping the first {}",
                MAX_RECOMMENDATIONS
            );
            list.truncate(MAX_RECOMMENDATIONS);
        }
        Ok(list)
    }

    fn draft_ok(&self, recommendation: &Recommendation, entity: &str) -> bool {
        !self.with_draft
            || recommendation
                .proposed_content
                .as_deref()
                .is_some_and(|draft| contains_ignore_case(draft, entity))
    }

    /// 1-based positions of entries failing draft validation
    fn failing_drafts(&self, list: &[Recommendation], entity: &str) -> Vec<usize> {
        list.iter()
            .enumerate()
            .filter(|(_, r)| !self.draft_ok(r, entity))
            .map(|(i, _)| i + 1)
            .collect()
    }
}

fn weakness_lines(weaknesses: &[Weakness], scorer: &Scorer) -> String {
    weaknesses
        .iter()
        .map(|w| {
            let areas: Vec<String> = scorer
                .areas_for(w.metric)
                .iter()
                .map(|a| a.to_string())
                .collect();
            let areas = if areas.is_empty() {
                "Content Coverage".to_string()
            } else {
                areas.join(", ")
            };
            format!(
                "- {} ({}): {:.0}/100, {} (affects {})",
                w.metric.key(),
                w.metric.label(),
                w.score,
                w.severity,
                areas
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn regeneration_note(failing: &[usize], entity: &str) -> String {
    let positions: Vec<String> = failing.iter().map(|i| i.to_string()).collect();
    format!(
        "IMPORTANT: the proposed_content of recommendation(s) {} was missing or did not \
         name \"{}\". Write the complete list again. Every proposed_content must be \
         ready-to-insert text that mentions \"{}\" explicitly.",
        positions.join(", "),
        entity,
        entity
    )
}
