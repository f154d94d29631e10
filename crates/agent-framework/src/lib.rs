//! Agents that turn market data into an [`AgentOpinion`](analysis_core::AgentOpinion).
//!
//! Two flavors ship here: [`RuleBasedAgent`], a deterministic technical
//! scorer, and [`LLMAgent`], a thin wrapper around an [`LLMClient`] with a
//! role-specific prompt. Both implement [`AnalyzerAgent`] so the ensemble
//! can hold a `Vec<Box<dyn AnalyzerAgent>>` without caring which kind it's
//! talking to.

mod llm;
mod rule_based;

pub use llm::{FactorSchema, LLMAgent};
pub use rule_based::{RuleBasedAgent, RuleBasedWeights};

use analysis_core::AnalyzerAgent;

/// Collects opinions from every configured agent. Each agent's own
/// `analyze` is responsible for substituting a neutral opinion on failure
/// (invalid inputs, an open circuit breaker, retry exhaustion); this just
/// runs them all concurrently so one slow agent never blocks the others.
pub async fn collect_opinions(
    ticker: &str,
    agents: &[Box<dyn AnalyzerAgent>],
) -> Vec<analysis_core::AgentOpinion> {
    let futures = agents.iter().map(|agent| agent.analyze(ticker));
    futures_util::future::join_all(futures).await
}

/// A ticker is 1-5 uppercase letters. Agents validate this themselves
/// before doing any adapter work, since the framework's `analyze` contract
/// carries only the ticker -- market/sentiment/historical data is fetched
/// by each agent through its own injected adapters, and a missing or empty
/// reading there is already surfaced as an adapter `Err`, which both
/// agents convert to a neutral opinion the same way an invalid ticker does.
pub fn is_valid_ticker(ticker: &str) -> bool {
    !ticker.is_empty() && ticker.len() <= 5 && ticker.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod ticker_validation_tests {
    use super::is_valid_ticker;

    #[test]
    fn accepts_one_to_five_uppercase_letters() {
        assert!(is_valid_ticker("A"));
        assert!(is_valid_ticker("AAPL"));
        assert!(is_valid_ticker("GOOGL"));
    }

    #[test]
    fn rejects_empty_lowercase_and_overlong_tickers() {
        assert!(!is_valid_ticker(""));
        assert!(!is_valid_ticker("aapl"));
        assert!(!is_valid_ticker("TOOLONG"));
        assert!(!is_valid_ticker("AA1"));
    }
}
