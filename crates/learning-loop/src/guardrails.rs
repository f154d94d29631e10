//! Final safety checks run against a proposed weight vector immediately
//! before it is persisted. Any violation blocks the whole update.

use std::collections::HashMap;

use analysis_core::{WEIGHT_MAX_BOUND, WEIGHT_MIN_BOUND};

/// One guardrail failure, human-readable, suitable for the ALERT event's
/// reasoning field.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailViolation(pub String);

/// Checks the three guardrails in spec order. `weight_7d_ago` holds each
/// agent's weight from 7 days before this run, used for the cumulative
/// change check; an agent missing from the map is treated as unconstrained
/// by that check (no prior weight to compare against, e.g. a newly added
/// agent).
pub fn check_guardrails(
    new_weights: &[(String, f64)],
    weight_7d_ago: &HashMap<String, f64>,
) -> Result<(), Vec<GuardrailViolation>> {
    let mut violations = Vec::new();

    for (agent_name, weight) in new_weights {
        if let Some(prior) = weight_7d_ago.get(agent_name) {
            if *prior > 0.0 {
                let cumulative_change = (weight - prior).abs() / prior;
                if cumulative_change > 0.20 {
                    violations.push(GuardrailViolation(format!(
                        "{agent_name}: 7-day cumulative change {:.1}% exceeds 20%",
                        cumulative_change * 100.0
                    )));
                }
            }
        }
        if *weight < WEIGHT_MIN_BOUND || *weight > WEIGHT_MAX_BOUND {
            violations.push(GuardrailViolation(format!(
                "{agent_name}: weight {weight:.3} outside [{WEIGHT_MIN_BOUND}, {WEIGHT_MAX_BOUND}]"
            )));
        }
    }

    let n_agents = new_weights.len() as f64;
    let sum: f64 = new_weights.iter().map(|(_, w)| w).sum();
    if (sum - n_agents).abs() > 0.10 * n_agents {
        violations.push(GuardrailViolation(format!(
            "weight sum {sum:.3} deviates from agent count {n_agents} by more than 10%"
        )));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
