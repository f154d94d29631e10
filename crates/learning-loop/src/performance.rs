//! Rolling win-rate computation per agent, over the 7/30/90-day windows
//! the weight proposal formula consumes.

use analysis_core::StoredSignalType;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// One closed signal's outcome attributed to the agent whose analysis is
/// being scored. Built by the caller from a join of `agent_analyses` and
/// `signals` rows.
#[derive(Debug, Clone)]
pub struct AgentTradeRecord {
    pub agent_name: String,
    pub closed_at: NaiveDate,
    pub recommendation: StoredSignalType,
    pub pnl: Decimal,
}

/// The three trailing windows the proposal formula blends.
pub const WINDOWS: [i64; 3] = [7, 30, 90];

#[derive(Debug, Clone, PartialEq)]
pub struct AgentPerformance {
    pub agent_name: String,
    pub win_rate_7: f64,
    pub win_rate_30: f64,
    pub win_rate_90: f64,
    pub trades_7: i32,
    pub trades_30: i32,
    pub trades_90: i32,
}

impl AgentPerformance {
    pub fn win_rate(&self, window: i64) -> f64 {
        match window {
            7 => self.win_rate_7,
            30 => self.win_rate_30,
            90 => self.win_rate_90,
            _ => 0.0,
        }
    }

    pub fn trades(&self, window: i64) -> i32 {
        match window {
            7 => self.trades_7,
            30 => self.trades_30,
            90 => self.trades_90,
            _ => 0,
        }
    }
}

fn is_win(record: &AgentTradeRecord) -> bool {
    match record.recommendation {
        StoredSignalType::Buy => record.pnl > Decimal::ZERO,
        StoredSignalType::Sell => record.pnl < Decimal::ZERO,
        StoredSignalType::Hold => record.pnl.abs() < Decimal::from(5),
    }
}

fn window_stats(records: &[&AgentTradeRecord], as_of: NaiveDate, window: i64) -> (f64, i32) {
    let since = as_of - chrono::Duration::days(window);
    let matching: Vec<&&AgentTradeRecord> =
        records.iter().filter(|r| r.closed_at > since && r.closed_at <= as_of).collect();
    let trades = matching.len() as i32;
    if trades == 0 {
        return (0.0, 0);
    }
    let wins = matching.iter().filter(|r| is_win(r)).count();
    (wins as f64 / trades as f64 * 100.0, trades)
}

/// Computes rolling performance for one agent from its closed-trade
/// history, as of `as_of`.
pub fn rolling_performance(agent_name: &str, history: &[AgentTradeRecord], as_of: NaiveDate) -> AgentPerformance {
    let records: Vec<&AgentTradeRecord> = history.iter().filter(|r| r.agent_name == agent_name).collect();
    let (win_rate_7, trades_7) = window_stats(&records, as_of, 7);
    let (win_rate_30, trades_30) = window_stats(&records, as_of, 30);
    let (win_rate_90, trades_90) = window_stats(&records, as_of, 90);
    AgentPerformance {
        agent_name: agent_name.to_string(),
        win_rate_7,
        win_rate_30,
        win_rate_90,
        trades_7,
        trades_30,
        trades_90,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(agent: &str, days_ago: i64, rec: StoredSignalType, pnl: Decimal) -> AgentTradeRecord {
        AgentTradeRecord {
            agent_name: agent.to_string(),
            closed_at: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap() - chrono::Duration::days(days_ago),
            recommendation: rec,
            pnl,
        }
    }

    #[test]
    fn buy_wins_require_positive_pnl() {
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let history = vec![
            record("rsi_agent", 1, StoredSignalType::Buy, Decimal::from(10)),
            record("rsi_agent", 2, StoredSignalType::Buy, Decimal::from(-5)),
        ];
        let perf = rolling_performance("rsi_agent", &history, as_of);
        assert_eq!(perf.trades_7, 2);
        assert!((perf.win_rate_7 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn sell_wins_require_negative_pnl() {
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let history = vec![record("rsi_agent", 1, StoredSignalType::Sell, Decimal::from(-10))];
        let perf = rolling_performance("rsi_agent", &history, as_of);
        assert_eq!(perf.trades_7, 1);
        assert_eq!(perf.win_rate_7, 100.0);
    }

    #[test]
    fn hold_wins_require_small_pnl_magnitude() {
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let history = vec![
            record("rsi_agent", 1, StoredSignalType::Hold, Decimal::from(2)),
            record("rsi_agent", 2, StoredSignalType::Hold, Decimal::from(20)),
        ];
        let perf = rolling_performance("rsi_agent", &history, as_of);
        assert!((perf.win_rate_7 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn no_trades_in_window_yields_zero_win_rate() {
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let perf = rolling_performance("rsi_agent", &[], as_of);
        assert_eq!(perf.trades_7, 0);
        assert_eq!(perf.win_rate_7, 0.0);
    }

    #[test]
    fn windows_are_exclusive_of_trades_older_than_the_window() {
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let history = vec![record("rsi_agent", 10, StoredSignalType::Buy, Decimal::from(10))];
        let perf = rolling_performance("rsi_agent", &history, as_of);
        assert_eq!(perf.trades_7, 0);
        assert_eq!(perf.trades_30, 1);
    }

    #[test]
    fn other_agents_history_is_ignored() {
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let history = vec![record("other_agent", 1, StoredSignalType::Buy, Decimal::from(10))];
        let perf = rolling_performance("rsi_agent", &history, as_of);
        assert_eq!(perf.trades_7, 0);
    }
}
