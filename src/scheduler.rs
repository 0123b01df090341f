//! Timed automation: one long-running loop firing the orchestrator on the
//! configured interval, plus on-demand triggers.
//!
//! A cycle that overruns its interval defers the next firing (the tick is
//! rejected by the engine's cycle gate and retried on the following
//! tick); triggers arriving mid-cycle are rejected with
//! [`CycleError::Busy`].

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::cycle::{CancelToken, CycleError, Engine};
use crate::summary::CycleSummary;

pub struct Scheduler {
    engine: Arc<Engine>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run cycles forever: once at startup, then on every interval tick,
    /// until `cancel` fires.
    pub async fn run(&self, cancel: CancelToken) {
        let mut ticker = tokio::time::interval(self.engine.config().cycle_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if cancel.is_cancelled() {
                info!("scheduler stopping");
                return;
            }
            match self.engine.run_cycle(&cancel).await {
                Ok(summary) => info!(
                    rows = summary.total_rows(),
                    delivered_clients = summary.delivered_clients(),
                    relaxed = summary.relaxed_pass,
                    fatal = ?summary.fatal,
                    "scheduled cycle finished"
                ),
                Err(CycleError::Busy) => {
                    warn!("previous cycle still running; deferring this tick");
                }
                Err(err) => error!(error = %err, "scheduled cycle failed"),
            }
        }
    }

    /// On-demand trigger. Returns the synchronous cycle summary, or
    /// [`CycleError::Busy`] when a cycle is already in flight.
    pub async fn trigger(&self) -> Result<CycleSummary, CycleError> {
        self.engine.run_cycle(&CancelToken::new()).await
    }
}
