//! Analyzer: first judge call
//!
//! Renders the evaluation prompt for a prepared page, runs it through the judge
//! and returns the validated evaluation.

use tracing::info;

use eeat_core::{CacheKey, Deadline, EntityDistribution, PinSet, PreparedPage};

use crate::{
    parse_evaluation, Evaluation, JudgeError, JudgeRequest, PromptError, PromptRegistry,
    PromptTemplate, PromptVars, ResponseSchema, SharedJudge, EVALUATE_PROMPT,
};

/// Characters of cleaned text sent with the evaluation prompt
pub const EVALUATION_CONTENT_CHARS: usize = 6000;

/// Validated first-call result for one page
#[derive(Debug, Clone)]
pub struct Analysis {
    pub evaluation: Evaluation,
    pub cache_key: CacheKey,
}

/// Human-readable spread of mentions, as shown to the judge
pub fn describe_distribution(distribution: &EntityDistribution) -> String {
    format!(
        "introduction {}, body {}, conclusion {}",
        distribution.intro, distribution.body, distribution.conclusion
    )
}

pub struct Analyzer {
    judge: SharedJudge,
    template: PromptTemplate,
    content_chars: usize,
    /// Part of the cache key
    model: String,
}

impl Analyzer {
    pub fn new(judge: SharedJudge, registry: &PromptRegistry) -> Result<Self, PromptError> {
        Ok(Self {
            judge,
            template: registry.get(EVALUATE_PROMPT)?.clone(),
            content_chars: EVALUATION_CONTENT_CHARS,
            model: String::new(),
        })
    }

    pub fn with_content_chars(mut self, chars: usize) -> Self {
        self.content_chars = chars;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn build_request(&self, page: &PreparedPage) -> Result<JudgeRequest, PromptError> {
        let content = &page.content;
        let mut vars = PromptVars::new();
        vars.insert("language_target", content.language.clone());
        vars.insert("url", content.url.clone());
        vars.insert("title_raw", content.title.clone());

        match &page.candidate {
            Some(entity) => {
                vars.insert("entity_candidate", entity.name.clone());
                vars.insert("entity_in_title", entity.in_title.to_string());
                vars.insert("entity_mentions", entity.mention_count.to_string());
                vars.insert(
                    "entity_distribution",
                    describe_distribution(&entity.distribution),
                );
            }
            None => {
                for key in [
                    "entity_candidate",
                    "entity_in_title",
                    "entity_mentions",
                    "entity_distribution",
                ] {
                    vars.insert(key, "unknown".to_string());
                }
            }
        }

        vars.insert("content_text", content.excerpt(self.content_chars));

        let user = self.template.render(&vars)?;
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
            schema: ResponseSchema::Evaluation,
            options: self.template.options(),
            pins: PinSet::default(),
        })
    }

    /// Cache pins taken by the call are held in `pins`
    pub async fn analyze(
        &self,
        page: &PreparedPage,
        deadline: &Deadline,
        pins: &PinSet,
    ) -> Result<Analysis, JudgeError> {
        deadline.check("evaluation")?;

        let request = self.build_request(page)?.pinned_by(pins);
        let value = self.judge.evaluate(&request).await?;
        let evaluation = parse_evaluation(&value).map_err(JudgeError::SchemaViolation)?;

        info!(
            url = %request.url,
            entity = %evaluation.main_entity,
            category = %evaluation.category,
            "Page evaluated"
        );

        Ok(Analysis {
            evaluation,
            cache_key: request.cache_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{evaluation_json, ScriptedJudge};
    use eeat_core::{Preprocessor, RawPage};
    use std::sync::Arc;
    use std::time::Duration;

    fn prepared(text: &str) -> PreparedPage {
        Preprocessor::new()
            .prepare(RawPage {
                url: "https://example.com/eiffel".to_string(),
                title: "Eiffel Tower Visitor Guide".to_string(),
                raw_text: text.to_string(),
                cleaned_text: text.to_string(),
                html_lang: Some("en".to_string()),
                meta_description: None,
            })
            .unwrap()
    }

    fn analyzer(judge: Arc<ScriptedJudge>) -> Analyzer {
        Analyzer::new(judge, &PromptRegistry::load_embedded().unwrap()).unwrap()
    }

    #[test]
    fn test_request_carries_evidence_and_truncated_content() {
        let text = format!("The Eiffel Tower is in Paris. {}", "word ".repeat(3000));
        let analyzer = analyzer(Arc::new(ScriptedJudge::new(vec![])));
        let request = analyzer.build_request(&prepared(&text)).unwrap();

        assert!(request.user.contains("https://example.com/eiffel"));
        assert!(request.user.contains("Target language: EN"));
        assert!(request.user.contains("Eiffel Tower Visitor Guide"));
        assert!(!request.user.contains(&text));
        assert_eq!(request.schema, ResponseSchema::Evaluation);
    }

    #[test]
    fn test_cache_key_tracks_content() {
        let analyzer = analyzer(Arc::new(ScriptedJudge::new(vec![])));
        let a = analyzer.build_request(&prepared("The Eiffel Tower is tall.")).unwrap();
        let b = analyzer.build_request(&prepared("The Eiffel Tower is tall.")).unwrap();
        let c = analyzer.build_request(&prepared("The Eiffel Tower is old.")).unwrap();

        assert_eq!(a.cache_key, b.cache_key);
        assert_ne!(a.cache_key, c.cache_key);
    }

    #[test]
    fn test_cache_key_tracks_model() {
        let page = prepared("The Eiffel Tower is tall.");
        let judge = Arc::new(ScriptedJudge::new(vec![]));
        let small = analyzer(judge.clone()).with_model("gpt-4o-mini");
        let large = analyzer(judge).with_model("gpt-4o");

        assert_ne!(
            small.build_request(&page).unwrap().cache_key,
            large.build_request(&page).unwrap().cache_key
        );
    }

    #[tokio::test]
    async fn test_analyze_returns_typed_evaluation() {
        let judge = Arc::new(ScriptedJudge::new(vec![Ok(evaluation_json(
            "Eiffel Tower",
            80.0,
        ))]));
        let analysis = analyzer(judge)
            .analyze(
                &prepared("The Eiffel Tower is tall."),
                &Deadline::after(Duration::from_secs(60)),
                &PinSet::new(),
            )
            .await
            .unwrap();

        assert_eq!(analysis.evaluation.main_entity, "Eiffel Tower");
        assert_eq!(analysis.evaluation.sub_scores.credibilite, 80.0);
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_judge() {
        let judge = Arc::new(ScriptedJudge::new(vec![]));
        let err = analyzer(judge.clone())
            .analyze(
                &prepared("The Eiffel Tower is tall."),
                &Deadline::after(Duration::ZERO),
                &PinSet::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, JudgeError::Deadline(_)));
        assert_eq!(judge.calls(), 0);
    }
}
