//! Remote Response Generator
//!
//! This module produces the simulated customer's side of the call. For every
//! agent response it asks the LLM for the customer's next line and, from the
//! second step on, makes a separate call that scores the agent's response and
//! explains the score.
//!
//! A scoring reply that cannot be parsed never blocks the call: it is replaced
//! by a neutral score of [`FALLBACK_SCORE`] and [`FALLBACK_FEEDBACK`].

use crate::{
    llm_client::{ChatMessage, LLMClient},
    scenario::{self, MAX_STEPS, Scenario, ScenarioId},
    transcript::{DialogueStep, Emotion, Speaker, format_history},
};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Score used when the scoring reply is not the JSON we asked for.
pub const FALLBACK_SCORE: u8 = 50;
pub const FALLBACK_FEEDBACK: &str =
    "Good effort. Keep focusing on empathy, clear next steps, and confirming the customer's needs.";

/// Prompt template keys expected in the prompts map.
pub const CUSTOMER_PROMPT_KEY: &str = "customer_prompt";
pub const SCORING_PROMPT_KEY: &str = "scoring_prompt";

/// Input for one customer reply.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub scenario_id: ScenarioId,
    /// The step at which the agent responded (1-based).
    pub step: u32,
    /// The transcript before the agent's response.
    pub history: Vec<DialogueStep>,
    pub agent_response: String,
    pub user_id: Option<String>,
}

/// The customer's next line, plus the assessment of the agent's response
/// when one was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerReply {
    pub message: String,
    pub emotion: Emotion,
    pub score: Option<u8>,
    pub feedback: Option<String>,
}

/// Score and feedback for a single agent response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub score: u8,
    pub feedback: String,
}

impl Assessment {
    pub fn fallback() -> Self {
        Self {
            score: FALLBACK_SCORE,
            feedback: FALLBACK_FEEDBACK.to_string(),
        }
    }
}

/// Defines the contract for anything that can play the customer.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Produces the customer's next line for the given agent response.
    ///
    /// Errors are transport failures; the caller reports them and leaves the
    /// call untouched so the agent can resubmit.
    async fn generate_next_customer_response(
        &self,
        request: GenerationRequest,
    ) -> Result<CustomerReply>;
}

/// A `ResponseGenerator` backed by an OpenAI-compatible chat model.
pub struct LLMResponseGenerator {
    llm: Arc<dyn LLMClient>,
    prompts: HashMap<String, String>,
}

impl LLMResponseGenerator {
    /// Creates a new LLM-backed generator.
    ///
    /// # Arguments
    ///
    /// * `llm` - The chat client used for both the customer line and the score.
    /// * `prompts` - Template strings, which must include the
    ///   `"customer_prompt"` and `"scoring_prompt"` keys.
    pub fn new(llm: Arc<dyn LLMClient>, prompts: HashMap<String, String>) -> Self {
        Self { llm, prompts }
    }

    fn template(&self, key: &str) -> Result<&str> {
        self.prompts
            .get(key)
            .map(String::as_str)
            .with_context(|| format!("Missing prompt template: '{key}'"))
    }

    async fn customer_line(&self, scenario: &Scenario, request: &GenerationRequest) -> Result<(String, Emotion)> {
        let system_prompt = fill_template(self.template(CUSTOMER_PROMPT_KEY)?, scenario, request);

        let mut messages: Vec<ChatMessage> = request
            .history
            .iter()
            .filter_map(|step| match step.speaker {
                Speaker::Customer => Some(ChatMessage::assistant(step.message.clone())),
                Speaker::Agent => Some(ChatMessage::user(step.message.clone())),
                Speaker::System => None,
            })
            .collect();
        messages.push(ChatMessage::user(request.agent_response.clone()));

        let raw = self.llm.complete(system_prompt, messages).await?;
        parse_customer_line(&raw)
    }

    async fn assess(&self, scenario: &Scenario, request: &GenerationRequest) -> Result<Assessment> {
        let system_prompt = fill_template(self.template(SCORING_PROMPT_KEY)?, scenario, request);
        let raw = self
            .llm
            .complete(
                system_prompt,
                vec![ChatMessage::user(
                    "Score the agent's latest response. Reply with JSON only.",
                )],
            )
            .await?;
        Ok(parse_assessment(&raw))
    }
}

#[async_trait]
impl ResponseGenerator for LLMResponseGenerator {
    #[instrument(skip_all, fields(scenario = %request.scenario_id, step = request.step))]
    async fn generate_next_customer_response(
        &self,
        request: GenerationRequest,
    ) -> Result<CustomerReply> {
        let scenario = scenario::find(request.scenario_id);
        let (message, emotion) = self.customer_line(scenario, &request).await?;

        let assessment = if request.step > 1 {
            Some(self.assess(scenario, &request).await?)
        } else {
            None
        };

        info!(
            ?emotion,
            score = assessment.as_ref().map(|a| a.score),
            "Generated customer reply"
        );

        Ok(CustomerReply {
            message,
            emotion,
            score: assessment.as_ref().map(|a| a.score),
            feedback: assessment.map(|a| a.feedback),
        })
    }
}

/// A deterministic `ResponseGenerator` for development and tests.
///
/// The customer calms down as the call goes on, and every assessed response
/// scores [`MockResponseGenerator::SCORE`].
pub struct MockResponseGenerator;

impl MockResponseGenerator {
    pub const SCORE: u8 = 80;
}

#[async_trait]
impl ResponseGenerator for MockResponseGenerator {
    async fn generate_next_customer_response(
        &self,
        request: GenerationRequest,
    ) -> Result<CustomerReply> {
        let (message, emotion) = match request.step {
            1 => ("Okay. So what can you actually do for me?", Emotion::Frustrated),
            2 => ("That could work. Is there anything else?", Emotion::Anxious),
            3 => ("Alright, that's a relief.", Emotion::Calm),
            _ => ("Thank you, I appreciate your help.", Emotion::Grateful),
        };
        let assessed = request.step > 1;
        Ok(CustomerReply {
            message: message.to_string(),
            emotion,
            score: assessed.then_some(Self::SCORE),
            feedback: assessed
                .then(|| "Clear and empathetic. Keep confirming next steps.".to_string()),
        })
    }
}

/// Substitutes scenario and turn details into a prompt template.
///
/// Placeholders are resolved in a single pass over the template, so braces
/// inside substituted text (an agent typing `{history}`, say) stay literal.
/// Unknown `{...}` spans are copied through unchanged.
fn fill_template(template: &str, scenario: &Scenario, request: &GenerationRequest) -> String {
    let mut filled = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        filled.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let value = match &after[..close] {
                "title" => scenario.title.to_string(),
                "description" => scenario.description.to_string(),
                "persona" => scenario.persona.to_string(),
                "step" => request.step.to_string(),
                "max_steps" => MAX_STEPS.to_string(),
                "agent_response" => request.agent_response.clone(),
                "history" => format_history(&request.history),
                _ => return None,
            };
            Some((value, close))
        });
        match value {
            Some((value, close)) => {
                filled.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                filled.push('{');
                rest = after;
            }
        }
    }
    filled.push_str(rest);
    filled
}

/// Returns the outermost `{...}` span of `text`, if any.
fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Reads the customer's line from `{"message": ..., "emotion": ...}`.
///
/// Plain text is accepted as the message with a neutral emotion.
pub fn parse_customer_line(raw: &str) -> Result<(String, Emotion)> {
    let parsed = json_object_span(raw)
        .and_then(|span| serde_json::from_str::<Value>(span).ok())
        .and_then(|value| {
            let message = value.get("message")?.as_str()?.trim().to_string();
            let emotion = value
                .get("emotion")
                .and_then(Value::as_str)
                .map(Emotion::from_tag)
                .unwrap_or(Emotion::Neutral);
            Some((message, emotion))
        });

    let (message, emotion) = match parsed {
        Some(line) => line,
        None => (raw.trim().to_string(), Emotion::Neutral),
    };
    if message.is_empty() {
        bail!("LLM returned an empty customer reply");
    }
    Ok((message, emotion))
}

/// Reads `{"score": 0-100, "feedback": "..."}` from a scoring reply.
///
/// Anything that is not a usable score yields [`Assessment::fallback`]; a
/// usable score with missing feedback keeps the score.
pub fn parse_assessment(raw: &str) -> Assessment {
    let Some(value) = json_object_span(raw).and_then(|span| serde_json::from_str::<Value>(span).ok())
    else {
        warn!("Scoring reply was not JSON; using fallback assessment");
        return Assessment::fallback();
    };

    let score = match value.get("score") {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(score) = score.filter(|s| s.is_finite()) else {
        warn!("Scoring reply had no numeric score; using fallback assessment");
        return Assessment::fallback();
    };

    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(FALLBACK_FEEDBACK)
        .to_string();

    Assessment {
        score: score.round().clamp(0.0, 100.0) as u8,
        feedback,
    }
}
