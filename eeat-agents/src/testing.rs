//! Deterministic judge and backend stubs for unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

use eeat_core::{CacheKey, Metric, PinSet};

use crate::{
    GenerationOptions, Judge, JudgeError, JudgeRequest, LlmBackend, LlmError, ResponseSchema,
};

type Fallback = Box<dyn Fn() -> Result<Value, JudgeError> + Send + Sync>;

/// Replays scripted results in order, then the fallback if any
pub struct ScriptedJudge {
    script: Mutex<VecDeque<Result<Value, JudgeError>>>,
    fallback: Option<Fallback>,
    seen: Mutex<Vec<JudgeRequest>>,
}

impl ScriptedJudge {
    pub fn new(script: Vec<Result<Value, JudgeError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `f()`
    pub fn repeating(f: impl Fn() -> Result<Value, JudgeError> + Send + Sync + 'static) -> Self {
        Self {
            fallback: Some(Box::new(f)),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<JudgeRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
        self.seen.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(f)) => f(),
            (None, None) => Err(JudgeError::Rejected("script exhausted".to_string())),
        }
    }
}

/// Replays scripted completions
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<usize>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(
        &self,
        _system: &str,
        _user: &str,
        _options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        *self.calls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn request(url: &str) -> JudgeRequest {
    JudgeRequest {
        url: url.to_string(),
        system: "system".to_string(),
        user: "user".to_string(),
        schema: ResponseSchema::Evaluation,
        cache_key: CacheKey::derive(url, "user", "test@1"),
        options: GenerationOptions::default(),
        pins: PinSet::default(),
    }
}

/// A valid evaluation response with every sub-score set to `score`
pub fn evaluation_json(entity: &str, score: f64) -> Value {
    let breakdown: serde_json::Map<String, Value> = Metric::ALL
        .iter()
        .map(|m| (m.key().to_string(), json!(score)))
        .collect();

    json!({
        "main_entity": entity,
        "title_suggested": format!("{} guide", entity),
        "eeat": score,
        "eeat_breakdown": breakdown,
        "sentiment": "positive",
        "lisibilite": {"score": 72, "label": "facile"},
        "categorie": "Destination",
        "resume": "A practical guide.",
        "notes": "Solid page."
    })
}

/// A valid recommendation response with `count` entries
pub fn recommendations_json(count: usize, draft: Option<&str>) -> Value {
    let priorities = ["minor", "critical", "major"];
    let entries: Vec<Value> = (0..count)
        .map(|i| {
            let mut entry = json!({
                "priority": priorities[i % priorities.len()],
                "eeat_area": "Authoritativeness",
                "section": "body",
                "recommendation": format!("Action {}", i),
                "rationale": format!("Reason {}", i),
            });
            if let Some(text) = draft {
                entry["proposed_content"] = json!(text);
            }
            entry
        })
        .collect();

    json!({ "recommendations": entries })
}
