//! Pipeline orchestrator
//!
//! Per page, strictly in sequence: fetch, preprocess, analyze, score,
//! recommend. Pages run concurrently up to the configured fan-out; the judge
//! stack (and its rate limiter) is shared by all of them. A page that fails is
//! reported and the run continues; a cache key collision aborts the run.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use eeat_agents::{
    Analyzer, BackendJudge, JudgeStack, PromptRegistry, RateLimiter, RecommendInput,
    RecommendationGenerator, SharedBackend, SharedJudge, EVALUATE_PROMPT, RECOMMEND_PROMPT,
};
use eeat_core::{
    entity_stats, Deadline, MainEntity, PinSet, PreparedPage, Preprocessor, ResultCache, Scorer,
};
use eeat_web::PageFetcher;

use crate::{PageError, PageReport, PageResult, PageStatus, PipelineConfig, RunError, RunReport};

/// Scores a batch of pages
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn PageFetcher>,
    preprocessor: Preprocessor,
    analyzer: Analyzer,
    recommender: RecommendationGenerator,
    scorer: Scorer,
    cache: ResultCache,
    prompt_versions: Vec<String>,
}

impl Pipeline {
    /// Wrap `judge` in the configured decorator stack and wire up every stage
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn PageFetcher>,
        judge: SharedJudge,
        registry: &PromptRegistry,
        cache: ResultCache,
    ) -> Result<Self, RunError> {
        config.validate()?;

        let judge = JudgeStack::over(judge)
            .with_retry(config.retry.clone())
            .with_rate_limiter(Arc::new(RateLimiter::new(&config.rate_limit)))
            .with_cache(cache.clone())
            .build();

        let mut preprocessor = Preprocessor::new();
        if let Some(code) = &config.forced_language {
            preprocessor = preprocessor.with_forced_language(code.as_str());
        }

        let analyzer = Analyzer::new(judge.clone(), registry)?
            .with_content_chars(config.limits.evaluation_chars);
        let recommender = RecommendationGenerator::new(judge, registry, config.with_draft)?
            .with_excerpt_chars(config.limits.recommendation_chars);

        let prompt_versions = vec![
            registry.get(EVALUATE_PROMPT)?.version_tag(),
            registry.get(RECOMMEND_PROMPT)?.version_tag(),
        ];

        Ok(Self {
            scorer: Scorer::new(config.scoring.clone())?,
            config,
            fetcher,
            preprocessor,
            analyzer,
            recommender,
            cache,
            prompt_versions,
        })
    }

    /// Same as [`Pipeline::new`] with an LLM backend as the innermost judge
    pub fn with_backend(
        config: PipelineConfig,
        fetcher: Arc<dyn PageFetcher>,
        backend: SharedBackend,
        registry: &PromptRegistry,
        cache: ResultCache,
    ) -> Result<Self, RunError> {
        let model = backend.model_name().to_string();
        Ok(Self::new(
            config,
            fetcher,
            Arc::new(BackendJudge::new(backend)),
            registry,
            cache,
        )?
        .with_model(&model))
    }

    /// Model name folded into every cache key
    pub fn with_model(mut self, model: &str) -> Self {
        self.analyzer = self.analyzer.with_model(model);
        self.recommender = self.recommender.with_model(model);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Score every URL; pages in the report keep input order
    pub async fn run(&self, urls: &[String]) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let urls = dedupe(urls);

        info!(
            "Scoring {} page(s), fan-out {}",
            urls.len(),
            self.config.fan_out
        );

        let mut pending = stream::iter(urls.iter().enumerate())
            .map(|(index, url)| async move { (index, self.run_page(url).await) })
            .buffer_unordered(self.config.fan_out);

        let mut slots: Vec<Option<PageResult>> = vec![None; urls.len()];

        while let Some((index, outcome)) = pending.next().await {
            let url = urls[index].clone();
            let result = match outcome {
                Ok(report) => {
                    info!(
                        url = %url,
                        global = report.score_card.eeat.global,
                        weaknesses = report.score_card.weaknesses.len(),
                        recommendations = report.recommendations.len(),
                        "Page scored"
                    );
                    PageResult {
                        url,
                        status: PageStatus::Succeeded,
                        report: Some(report),
                    }
                }
                Err(PageError::Judge(e)) if e.is_cache_collision() => {
                    error!(url = %url, "Cache key collision: {}", e);
                    return Err(RunError::CacheCollision { url, source: e });
                }
                Err(PageError::TimedOut) => {
                    warn!(url = %url, "Page timed out");
                    PageResult {
                        url,
                        status: PageStatus::TimedOut,
                        report: None,
                    }
                }
                Err(e) => {
                    warn!(url = %url, "Page failed: {}", e);
                    PageResult {
                        url,
                        status: PageStatus::Failed {
                            reason: e.to_string(),
                        },
                        report: None,
                    }
                }
            };
            slots[index] = Some(result);
        }

        let pages: Vec<PageResult> = slots.into_iter().flatten().collect();
        let report = RunReport::new(
            started_at,
            self.config.with_draft,
            self.prompt_versions.clone(),
            pages,
        );

        info!(
            succeeded = report.summary.succeeded,
            failed = report.summary.failed,
            timed_out = report.summary.timed_out,
            "Run complete"
        );
        Ok(report)
    }

    /// One page under its deadline
    pub async fn run_page(&self, url: &str) -> Result<PageReport, PageError> {
        let budget = Duration::from_secs(self.config.page_timeout_secs);
        let deadline = Deadline::after(budget);

        match tokio::time::timeout(budget, self.process(url, &deadline)).await {
            Ok(result) => result,
            Err(_) => Err(PageError::TimedOut),
        }
    }

    async fn process(&self, url: &str, deadline: &Deadline) -> Result<PageReport, PageError> {
        let raw = self.fetcher.fetch(url).await?;
        let prepared = self.preprocessor.prepare(raw)?;

        // Every entry this page reads or writes stays pinned until it finishes
        let pins = PinSet::new();
        let analysis = self.analyzer.analyze(&prepared, deadline, &pins).await?;
        let evaluation = analysis.evaluation;

        let entity = self.resolve_entity(&prepared, &evaluation.main_entity);
        let outcome = self.scorer.compute(&evaluation.sub_scores)?;

        let recommended = self
            .recommender
            .recommend(
                RecommendInput {
                    content: &prepared.content,
                    entity: &entity,
                    category: evaluation.category,
                    score: &outcome.score,
                    sub_scores: &evaluation.sub_scores,
                    weaknesses: &outcome.weaknesses,
                    scorer: &self.scorer,
                    pins: &pins,
                },
                deadline,
            )
            .await?;

        let score_card = self.scorer.score_card(
            outcome,
            &entity,
            evaluation.readability.score,
            evaluation.sentiment,
        );

        let mut cache_keys = vec![analysis.cache_key];
        cache_keys.extend(recommended.cache_keys);

        let content = prepared.content;
        let report = PageReport {
            content_metrics: content.metrics(),
            url: content.url,
            title: content.title,
            meta_description: content.meta_description,
            language: content.language,
            language_method: prepared.language.method,
            detected_category: content.category,
            category: evaluation.category,
            entity_candidate: prepared.candidate.map(|c| c.name),
            main_entity: entity,
            title_suggested: evaluation.title_suggested,
            declared_eeat: evaluation.declared_eeat,
            sub_scores: evaluation.sub_scores,
            score_card,
            sentiment: evaluation.sentiment,
            readability: evaluation.readability,
            resume: evaluation.resume,
            notes: evaluation.notes,
            recommendations: recommended.recommendations,
            drafts_dropped: recommended.dropped,
            regenerated: recommended.regenerated,
            cache_keys,
        };

        drop(pins);
        Ok(report)
    }

    /// The judge's entity wins; the heuristic candidate is only evidence
    fn resolve_entity(&self, prepared: &PreparedPage, judged: &str) -> MainEntity {
        let content = &prepared.content;
        match &prepared.candidate {
            Some(candidate)
                if candidate.name.to_lowercase() == judged.trim().to_lowercase() =>
            {
                candidate.clone()
            }
            candidate => {
                if let Some(candidate) = candidate {
                    warn!(
                        url = %content.url,
                        candidate = %candidate.name,
                        judged = %judged,
                        "Judge named a different main entity; recomputing its statistics"
                    );
                }
                entity_stats(judged, &content.title, &content.cleaned_text)
            }
        }
    }
}

/// Drop repeated URLs, keeping the first occurrence
fn dedupe(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(urls.len());
    for url in urls {
        let url = url.trim();
        if url.is_empty() {
            continue;
        }
        if seen.insert(url.to_string()) {
            unique.push(url.to_string());
        } else {
            warn!(url = %url, "Duplicate URL skipped");
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eeat_agents::{Judge, JudgeError, JudgeRequest, RateLimit, ResponseSchema, RetryPolicy};
    use eeat_core::{EeatArea, Metric, PlanStatus, PrunePolicy, RawPage, Severity};
    use eeat_web::FetchError;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEXT: &str = "The Eiffel Tower is the symbol of Paris. Built in 1889, the Eiffel \
        Tower welcomes millions of visitors. Tickets for the Eiffel Tower sell out in summer.";

    struct StubFetcher {
        pages: HashMap<String, RawPage>,
    }

    impl StubFetcher {
        fn new(pages: Vec<RawPage>) -> Arc<Self> {
            Arc::new(Self {
                pages: pages.into_iter().map(|p| (p.url.clone(), p)).collect(),
            })
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<RawPage, FetchError> {
            self.pages.get(url).cloned().ok_or(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn page(url: &str, text: &str) -> RawPage {
        RawPage {
            url: url.to_string(),
            title: "Eiffel Tower Guide".to_string(),
            raw_text: text.to_string(),
            cleaned_text: text.to_string(),
            html_lang: Some("en".to_string()),
            meta_description: None,
        }
    }

    fn evaluation(scores: &[(Metric, f64)]) -> Value {
        let breakdown: serde_json::Map<String, Value> = Metric::ALL
            .iter()
            .map(|m| {
                let score = scores
                    .iter()
                    .find(|(metric, _)| metric == m)
                    .map_or(80.0, |(_, s)| *s);
                (m.key().to_string(), json!(score))
            })
            .collect();
        json!({
            "main_entity": "Eiffel Tower",
            "title_suggested": "Eiffel Tower: tickets and tips",
            "eeat": 70,
            "eeat_breakdown": breakdown,
            "sentiment": "positive",
            "lisibilite": {"score": 70, "label": "facile"},
            "categorie": "Destination",
            "resume": "Visitor guide.",
            "notes": ["ok"]
        })
    }

    fn recommendations() -> Value {
        let entry = |priority: &str, area: &str, text: &str| {
            json!({
                "priority": priority,
                "eeat_area": area,
                "section": "body",
                "recommendation": text,
                "rationale": "Improves the weakest area"
            })
        };
        json!({"recommendations": [
            entry("minor", "Experience", "Add a personal visit story"),
            entry("major", "Trustworthiness", "Date the ticket prices"),
            entry("critical", "Authoritativeness", "Cite the official operator"),
            entry("major", "Expertise", "Explain the construction history"),
            entry("minor", "Content Coverage", "Add a FAQ"),
        ]})
    }

    /// Answers evaluations per URL and recommendations with a fixed list
    struct StubJudge {
        evaluations: HashMap<String, Value>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StubJudge {
        fn new(evaluations: Vec<(&str, Value)>) -> Arc<Self> {
            Arc::new(Self {
                evaluations: evaluations
                    .into_iter()
                    .map(|(url, v)| (url.to_string(), v))
                    .collect(),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Judge for StubJudge {
        async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match request.schema {
                ResponseSchema::Evaluation => self
                    .evaluations
                    .get(&request.url)
                    .cloned()
                    .ok_or_else(|| JudgeError::Rejected("unknown url".into())),
                ResponseSchema::Recommendations { .. } => Ok(recommendations()),
            }
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy::immediate(2),
            rate_limit: RateLimit {
                requests_per_minute: 0,
            },
            fan_out: 2,
            ..PipelineConfig::default()
        }
    }

    fn pipeline(
        fetcher: Arc<StubFetcher>,
        judge: SharedJudge,
        cache: ResultCache,
    ) -> Pipeline {
        Pipeline::new(
            config(),
            fetcher,
            judge,
            &PromptRegistry::load_embedded().unwrap(),
            cache,
        )
        .unwrap()
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn test_uniform_scores_need_no_recommendations() {
        let judge = StubJudge::new(vec![("https://a", evaluation(&[]))]);
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://a", TEXT)]),
            judge.clone(),
            ResultCache::in_memory(),
        );

        let run = pipeline.run(&urls(&["https://a"])).await.unwrap();
        let report = run.pages[0].report.as_ref().unwrap();

        assert_eq!(report.score_card.eeat.global, 80.0);
        assert!(report.score_card.weaknesses.is_empty());
        assert!(report.recommendations.is_empty());
        assert_eq!(judge.calls(), 1);
        assert_eq!(run.summary.succeeded, 1);
    }

    #[tokio::test]
    async fn test_weak_authority_leads_recommendations() {
        let judge = StubJudge::new(vec![(
            "https://b",
            evaluation(&[(Metric::Credibilite, 20.0), (Metric::QualiteProduction, 30.0)]),
        )]);
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://b", TEXT)]),
            judge.clone(),
            ResultCache::in_memory(),
        );

        let run = pipeline.run(&urls(&["https://b"])).await.unwrap();
        let report = run.pages[0].report.as_ref().unwrap();

        assert_eq!(report.score_card.eeat.authority, 25.0);
        let critical: Vec<_> = report
            .score_card
            .weaknesses
            .iter()
            .filter(|w| w.severity == Severity::Critical)
            .map(|w| w.metric)
            .collect();
        assert_eq!(critical, vec![Metric::Credibilite, Metric::QualiteProduction]);

        let top = &report.recommendations[0];
        assert_eq!(top.priority, Severity::Critical);
        assert_eq!(top.eeat_area, EeatArea::Authoritativeness);
        assert_eq!(report.cache_keys.len(), 2);
        assert_eq!(judge.calls(), 2);

        assert_eq!(report.score_card.improvements.status, PlanStatus::Critical);
        assert!(report.score_card.improvements.critical_count >= 2);
        assert!(run.to_markdown().contains("### Improvement plan (critical)"));
    }

    #[tokio::test]
    async fn test_schema_violation_fails_page_and_run_continues() {
        let mut broken = evaluation(&[]);
        broken["eeat_breakdown"]
            .as_object_mut()
            .unwrap()
            .remove("titre_sobre");
        let judge = StubJudge::new(vec![
            ("https://bad", broken),
            ("https://good", evaluation(&[])),
        ]);
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://bad", TEXT), page("https://good", TEXT)]),
            judge.clone(),
            ResultCache::in_memory(),
        );

        let run = pipeline
            .run(&urls(&["https://bad", "https://good"]))
            .await
            .unwrap();

        match &run.pages[0].status {
            PageStatus::Failed { reason } => assert!(reason.contains("titre_sobre")),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(run.pages[0].report.is_none());
        assert_eq!(run.pages[1].status, PageStatus::Succeeded);
        assert_eq!((run.summary.succeeded, run.summary.failed), (1, 1));
        // Corrective retry for the broken page, one call for the good one
        assert_eq!(judge.calls(), 3);
        assert_eq!(pipeline.cache().stats().unwrap().entries, 1);
    }

    #[tokio::test]
    async fn test_empty_content_skips_judge() {
        let judge = StubJudge::new(vec![]);
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://empty", "   ")]),
            judge.clone(),
            ResultCache::in_memory(),
        );

        let run = pipeline
            .run(&urls(&["https://empty", "https://missing"]))
            .await
            .unwrap();

        assert_eq!(run.summary.failed, 2);
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicates_and_order() {
        let judge = StubJudge::new(vec![
            ("https://a", evaluation(&[])),
            ("https://b", evaluation(&[])),
        ]);
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://a", TEXT), page("https://b", TEXT)]),
            judge,
            ResultCache::in_memory(),
        );

        let run = pipeline
            .run(&urls(&["https://b", "https://a", "https://b"]))
            .await
            .unwrap();

        let order: Vec<_> = run.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(order, vec!["https://b", "https://a"]);
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let judge = StubJudge::new(vec![(
            "https://b",
            evaluation(&[(Metric::Credibilite, 20.0)]),
        )]);
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://b", TEXT)]),
            judge.clone(),
            ResultCache::in_memory(),
        );

        let first = pipeline.run(&urls(&["https://b"])).await.unwrap();
        let second = pipeline.run(&urls(&["https://b"])).await.unwrap();

        assert_eq!(judge.calls(), 2);
        assert_eq!(
            first.pages[0].report.as_ref().unwrap().score_card,
            second.pages[0].report.as_ref().unwrap().score_card
        );
        assert_eq!(pipeline.cache().stats().unwrap().pinned, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_page_times_out() {
        let judge = Arc::new(StubJudge {
            evaluations: HashMap::from([("https://slow".to_string(), evaluation(&[]))]),
            delay: Some(Duration::from_secs(3600)),
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://slow", TEXT)]),
            judge,
            ResultCache::in_memory(),
        );

        let run = pipeline.run(&urls(&["https://slow"])).await.unwrap();
        assert_eq!(run.pages[0].status, PageStatus::TimedOut);
        assert!(run.pages[0].report.is_none());
        assert_eq!(run.summary.timed_out, 1);
    }

    /// Stores a competing payload under the request key before answering
    struct CollidingJudge {
        cache: ResultCache,
    }

    #[async_trait]
    impl Judge for CollidingJudge {
        async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
            self.cache.put(&request.cache_key, json!({"stale": true}))?;
            Ok(evaluation(&[]))
        }
    }

    #[tokio::test]
    async fn test_cache_collision_aborts_run() {
        let cache = ResultCache::in_memory();
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://a", TEXT)]),
            Arc::new(CollidingJudge {
                cache: cache.clone(),
            }),
            cache,
        );

        let err = pipeline.run(&urls(&["https://a"])).await.unwrap_err();
        assert!(matches!(err, RunError::CacheCollision { .. }));
    }

    /// Prunes the shared cache directory from a separate handle mid-page
    struct PruningJudge {
        inner: Arc<StubJudge>,
        dir: std::path::PathBuf,
        skipped: AtomicUsize,
    }

    #[async_trait]
    impl Judge for PruningJudge {
        async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
            if matches!(request.schema, ResponseSchema::Recommendations { .. }) {
                let other = ResultCache::open_dir(&self.dir)?;
                let report = other.prune(PrunePolicy {
                    max_age: None,
                    max_entries: Some(0),
                })?;
                self.skipped.store(report.skipped_pinned, Ordering::SeqCst);
            }
            self.inner.evaluate(request).await
        }
    }

    #[tokio::test]
    async fn test_prune_from_another_handle_spares_in_flight_page() {
        let dir = std::env::temp_dir().join(format!("eeat-pipeline-{}", uuid::Uuid::new_v4()));
        let judge = Arc::new(PruningJudge {
            inner: StubJudge::new(vec![(
                "https://b",
                evaluation(&[(Metric::Credibilite, 20.0)]),
            )]),
            dir: dir.clone(),
            skipped: AtomicUsize::new(0),
        });
        let cache = ResultCache::open_dir(&dir).unwrap();
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://b", TEXT)]),
            judge.clone(),
            cache.clone(),
        );

        let run = pipeline.run(&urls(&["https://b"])).await.unwrap();
        assert_eq!(run.pages[0].status, PageStatus::Succeeded);
        // The evaluation written moments earlier survived
        assert_eq!(judge.skipped.load(Ordering::SeqCst), 1);
        let stats = cache.stats().unwrap();
        assert_eq!((stats.entries, stats.pinned), (2, 0));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_model_changes_cache_key() {
        let judge = StubJudge::new(vec![("https://a", evaluation(&[]))]);
        let cache = ResultCache::in_memory();
        let fetcher = StubFetcher::new(vec![page("https://a", TEXT)]);
        let small = pipeline(fetcher.clone(), judge.clone(), cache.clone()).with_model("small");
        let large = pipeline(fetcher, judge.clone(), cache.clone()).with_model("large");

        small.run(&urls(&["https://a"])).await.unwrap();
        large.run(&urls(&["https://a"])).await.unwrap();

        assert_eq!(judge.calls(), 2);
        assert_eq!(cache.stats().unwrap().entries, 2);
    }

    #[tokio::test]
    async fn test_judge_entity_overrides_candidate() {
        let mut eval = evaluation(&[]);
        eval["main_entity"] = json!("Paris");
        eval["title_suggested"] = json!("Paris: the Eiffel Tower");
        let judge = StubJudge::new(vec![("https://a", eval)]);
        let pipeline = pipeline(
            StubFetcher::new(vec![page("https://a", TEXT)]),
            judge,
            ResultCache::in_memory(),
        );

        let run = pipeline.run(&urls(&["https://a"])).await.unwrap();
        let report = run.pages[0].report.as_ref().unwrap();

        assert_eq!(report.main_entity.name, "Paris");
        assert_eq!(report.main_entity.mention_count, 1);
        assert!(!report.main_entity.in_title);
        assert_eq!(report.entity_candidate.as_deref(), Some("Eiffel Tower"));
    }
}
