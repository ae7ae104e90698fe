//! Cron dispatcher (§4.2 "Scheduling"): fires `Trigger` for every
//! non-paused pipeline with a `schedule_cron` set, on each cron
//! occurrence. Grounded in the teacher's event-loop shape
//! (`casparian_worker`'s dispatch loop), generalized from a queue poll to
//! a cron-interval poll.
//!
//! The registration set is never persisted: every tick re-reads
//! `PipelineRepository::list_scheduled` (§6: "fully reconstructable from
//! persisted state on process restart"), so a paused or deleted pipeline
//! simply stops being considered on the next tick.

use crate::Orchestrator;
use chrono::{DateTime, Utc};
use lattice_domain::TriggerType;
use lattice_ids::PipelineId;
use lattice_repository::PipelineRepository;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct CronDispatcher {
    repo: Arc<dyn PipelineRepository>,
    orchestrator: Arc<Orchestrator>,
    poll_interval: Duration,
}

impl CronDispatcher {
    pub fn new(
        repo: Arc<dyn PipelineRepository>,
        orchestrator: Arc<Orchestrator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            repo,
            orchestrator,
            poll_interval,
        }
    }

    /// Run until `token` is cancelled. Each tick, pipelines due since the
    /// last tick's check are fired; a pipeline seen for the first time is
    /// recorded but not fired, so a dispatcher restart never replays a
    /// backlog of missed occurrences.
    pub async fn run(self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        let mut last_checked: HashMap<PipelineId, DateTime<Utc>> = HashMap::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = token.cancelled() => break,
            }

            let pipelines = match self.repo.list_scheduled().await {
                Ok(pipelines) => pipelines,
                Err(err) => {
                    warn!(error = %err, "cron dispatcher failed to list scheduled pipelines");
                    continue;
                }
            };

            let now = Utc::now();
            let mut seen = Vec::with_capacity(pipelines.len());

            for pipeline in pipelines {
                seen.push(pipeline.id.clone());
                let Some(cron_expr) = pipeline.schedule_cron.as_deref() else {
                    continue;
                };
                let schedule = match cron::Schedule::from_str(cron_expr) {
                    Ok(schedule) => schedule,
                    Err(err) => {
                        warn!(pipeline = %pipeline.name, cron = %cron_expr, error = %err, "invalid cron expression");
                        continue;
                    }
                };

                let Some(baseline) = last_checked.get(&pipeline.id).copied() else {
                    last_checked.insert(pipeline.id.clone(), now);
                    continue;
                };

                if schedule.after(&baseline).take_while(|fire| *fire <= now).next().is_some() {
                    let result = self
                        .orchestrator
                        .trigger(
                            &pipeline.created_by,
                            &pipeline.name,
                            BTreeMap::new(),
                            TriggerType::Scheduled,
                        )
                        .await;
                    if let Err(err) = result {
                        warn!(pipeline = %pipeline.name, error = %err, "scheduled trigger failed");
                    }
                }
                last_checked.insert(pipeline.id.clone(), now);
            }

            last_checked.retain(|id, _| seen.contains(id));
        }
    }
}
