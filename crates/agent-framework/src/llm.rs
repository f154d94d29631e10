use std::sync::Arc;
use std::time::Duration;

use analysis_core::{AgentOpinion, AnalyzerAgent, LLMClient};
use async_trait::async_trait;
use reliability::{CircuitBreaker, RetryPolicy};
use serde::Deserialize;

/// Names the factors an `LLMAgent` is asked to report, so its free-text
/// reply can be parsed into the same factor shape the ensemble expects
/// from rule-based agents.
#[derive(Debug, Clone)]
pub struct FactorSchema {
    pub names: Vec<String>,
}

impl FactorSchema {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LLMReply {
    score: f64,
    confidence: f64,
    reasoning: String,
    #[serde(default)]
    factors: std::collections::HashMap<String, f64>,
}

/// Wraps an [`LLMClient`] with a fixed role prompt and factor schema,
/// behind a dedicated circuit breaker and retry policy so a struggling
/// model degrades to neutral opinions instead of stalling the ensemble.
pub struct LLMAgent {
    name: String,
    role_prompt: String,
    factor_schema: FactorSchema,
    client: Arc<dyn LLMClient>,
    retry_policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl LLMAgent {
    pub fn new(
        name: impl Into<String>,
        role_prompt: impl Into<String>,
        factor_schema: FactorSchema,
        client: Arc<dyn LLMClient>,
    ) -> Self {
        let name = name.into();
        Self {
            breaker: Arc::new(CircuitBreaker::new(name.clone(), 5, Duration::from_secs(60))),
            name,
            role_prompt: role_prompt.into(),
            factor_schema,
            client,
            retry_policy: RetryPolicy::default(),
        }
    }

    fn user_prompt(&self, ticker: &str) -> String {
        format!(
            "Ticker: {ticker}\nRespond with JSON: {{\"score\": -1..1, \"confidence\": 0..1, \"reasoning\": \"...\", \"factors\": {{{}}}}}",
            self.factor_schema
                .names
                .iter()
                .map(|n| format!("\"{n}\": -1..1"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    fn parse_reply(raw: &str) -> Result<LLMReply, String> {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl AnalyzerAgent for LLMAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, ticker: &str) -> AgentOpinion {
        if !crate::is_valid_ticker(ticker) {
            return AgentOpinion::neutral(&self.name, ticker, "invalid ticker: expected 1-5 uppercase letters");
        }
        if !self.breaker.can_execute() {
            return AgentOpinion::neutral(&self.name, ticker, "circuit breaker open, skipping LLM call");
        }

        let system_prompt = self.role_prompt.clone();
        let user_prompt = self.user_prompt(ticker);
        let client = self.client.clone();

        let result = reliability::retry_with_backoff(&self.retry_policy, || {
            let client = client.clone();
            let system_prompt = system_prompt.clone();
            let user_prompt = user_prompt.clone();
            async move { client.complete(&system_prompt, &user_prompt).await }
        })
        .await;

        let raw = match result {
            Ok(raw) => {
                self.breaker.record_success();
                raw
            }
            Err(err) => {
                self.breaker.record_failure();
                return AgentOpinion::neutral(&self.name, ticker, format!("LLM call failed: {err}"));
            }
        };

        match Self::parse_reply(&raw) {
            Ok(reply) => AgentOpinion::from_score(
                &self.name,
                ticker,
                reply.score,
                reply.confidence,
                reply.reasoning,
                reply.factors,
            ),
            Err(parse_err) => {
                tracing::warn!(agent = %self.name, ticker, %parse_err, "malformed LLM reply");
                AgentOpinion::neutral(&self.name, ticker, format!("malformed LLM reply: {parse_err}"))
            }
        }
    }
}

impl std::fmt::Display for FactorSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::AnalysisError;

    struct ScriptedClient {
        replies: std::sync::Mutex<Vec<Result<String, AnalysisError>>>,
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, AnalysisError> {
            self.replies.lock().unwrap().pop().unwrap()
        }
    }

    #[tokio::test]
    async fn parses_well_formed_reply_into_opinion() {
        let client = Arc::new(ScriptedClient {
            replies: std::sync::Mutex::new(vec![Ok(
                r#"{"score": 0.7, "confidence": 0.8, "reasoning": "strong momentum", "factors": {"llm_factor_1": 0.5}}"#
                    .to_string(),
            )]),
        });
        let agent = LLMAgent::new(
            "llm-momentum",
            "You are a momentum analyst.",
            FactorSchema::new(["llm_factor_1"]),
            client,
        );
        let opinion = agent.analyze("AAPL").await;
        assert_eq!(opinion.raw_score, 0.7);
        assert_eq!(opinion.confidence, 0.8);
    }

    #[tokio::test]
    async fn falls_back_to_neutral_on_malformed_reply() {
        let client = Arc::new(ScriptedClient {
            replies: std::sync::Mutex::new(vec![Ok("not json".to_string())]),
        });
        let agent = LLMAgent::new("llm-momentum", "role", FactorSchema::new(["x"]), client);
        let opinion = agent.analyze("AAPL").await;
        assert_eq!(opinion.confidence, 0.0);
    }

    #[tokio::test]
    async fn falls_back_to_neutral_for_an_invalid_ticker_without_calling_the_client() {
        let client = Arc::new(ScriptedClient { replies: std::sync::Mutex::new(vec![]) });
        let agent = LLMAgent::new("llm-momentum", "role", FactorSchema::new(["x"]), client);
        let opinion = agent.analyze("not-a-ticker").await;
        assert_eq!(opinion.confidence, 0.0);
        assert_eq!(opinion.raw_score, 0.0);
    }

    #[tokio::test]
    async fn falls_back_to_neutral_when_client_errors_out() {
        let client = Arc::new(ScriptedClient {
            replies: std::sync::Mutex::new(vec![
                Err(AnalysisError::ApiError("timeout".into())),
                Err(AnalysisError::ApiError("timeout".into())),
                Err(AnalysisError::ApiError("timeout".into())),
                Err(AnalysisError::ApiError("timeout".into())),
            ]),
        });
        let agent = LLMAgent::new("llm-momentum", "role", FactorSchema::new(["x"]), client);
        let opinion = agent.analyze("AAPL").await;
        assert_eq!(opinion.confidence, 0.0);
        assert_eq!(opinion.raw_score, 0.0);
    }
}
