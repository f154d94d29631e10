//! Cooperative scheduler: two interval-driven jobs (market data, sentiment)
//! and four wall-clock jobs (daily signals at two slots, performance
//! analysis, weight optimization, daily summary), all idempotent at day
//! granularity the way `trading-agent/src/main.rs` tracks its own daily
//! report -- `today != last_run_date && now >= target` -- except tracked
//! per job here instead of just one.

use std::time::Duration;

use chrono::{NaiveDate, Timelike};
use tokio::signal::unix::SignalKind;
use tokio::time;

use crate::config::EngineConfig;
use crate::jobs::{self, run_label_for, EngineContext};

const WALL_CLOCK_POLL_SECS: u64 = 30;

/// One wall-clock job's schedule and the last local date it fired on.
struct WallClockJob {
    name: &'static str,
    hour: u32,
    minute: u32,
    last_run: Option<NaiveDate>,
}

/// Runs the scheduler until SIGINT or SIGTERM. Each tick checks the
/// interval timers and the wall clock; a job that fires runs to
/// completion before the next tick is considered, so two jobs never
/// interleave on the same cycle (per-ticker parallelism happens inside a
/// job, not across jobs).
pub async fn run(ctx: EngineContext, config: &EngineConfig) -> anyhow::Result<()> {
    let mut market_data_interval = time::interval(Duration::from_secs(config.fetch_market_data_interval_secs));
    let mut sentiment_interval = time::interval(Duration::from_secs(config.fetch_sentiment_interval_secs));
    let mut wall_clock_poll = time::interval(Duration::from_secs(WALL_CLOCK_POLL_SECS));

    let mut daily_signal_jobs: Vec<WallClockJob> = config
        .generate_daily_signals_times
        .iter()
        .map(|&(hour, minute)| WallClockJob { name: "generate_daily_signals", hour, minute, last_run: None })
        .collect();
    let mut performance_job = WallClockJob {
        name: "analyze_signal_performance",
        hour: config.analyze_performance_time.0,
        minute: config.analyze_performance_time.1,
        last_run: None,
    };
    let mut weights_job = WallClockJob {
        name: "optimize_agent_weights",
        hour: config.optimize_weights_time.0,
        minute: config.optimize_weights_time.1,
        last_run: None,
    };
    let mut summary_job =
        WallClockJob { name: "send_daily_summary", hour: config.daily_summary_time.0, minute: config.daily_summary_time.1, last_run: None };

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    tracing::info!("signal-engine scheduler starting");

    loop {
        tokio::select! {
            _ = market_data_interval.tick() => {
                jobs::fetch_market_data(&ctx).await;
            }
            _ = sentiment_interval.tick() => {
                jobs::fetch_sentiment(&ctx).await;
            }
            _ = wall_clock_poll.tick() => {
                let now = eastern_now();
                let today = now.date_naive();
                let (hour, minute) = (now.hour(), now.minute());

                for job in daily_signal_jobs.iter_mut() {
                    if due(job, today, hour, minute) {
                        let label = run_label_for(job.hour, job.minute);
                        tracing::info!(job = job.name, run_label = %label, "firing");
                        jobs::generate_daily_signals(&ctx, &label).await;
                        job.last_run = Some(today);
                    }
                }
                if due(&performance_job, today, hour, minute) {
                    tracing::info!(job = performance_job.name, "firing");
                    jobs::analyze_signal_performance(&ctx).await;
                    performance_job.last_run = Some(today);
                }
                if due(&weights_job, today, hour, minute) {
                    tracing::info!(job = weights_job.name, "firing");
                    jobs::optimize_agent_weights(&ctx).await;
                    weights_job.last_run = Some(today);
                }
                if due(&summary_job, today, hour, minute) {
                    tracing::info!(job = summary_job.name, "firing");
                    jobs::send_daily_summary(&ctx).await;
                    summary_job.last_run = Some(today);
                }
            }
            _ = &mut shutdown => {
                tracing::info!("scheduler shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn due(job: &WallClockJob, today: NaiveDate, hour: u32, minute: u32) -> bool {
    job.last_run != Some(today) && hour == job.hour && minute >= job.minute
}

fn eastern_now() -> chrono::DateTime<chrono_tz::Tz> {
    chrono::Utc::now().with_timezone(&chrono_tz::America::New_York)
}

/// Whether `America/New_York` wall time right now falls within the
/// 09:30-16:00 weekday market session.
pub fn is_market_hours() -> bool {
    let now = eastern_now();
    use chrono::Datelike;
    let weekday = now.weekday();
    if matches!(weekday, chrono::Weekday::Sat | chrono::Weekday::Sun) {
        return false;
    }
    let minutes_since_midnight = now.hour() * 60 + now.minute();
    (9 * 60 + 30..16 * 60).contains(&minutes_since_midnight)
}
