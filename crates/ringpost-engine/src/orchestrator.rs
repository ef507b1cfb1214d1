// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job lifecycle: start, cancel, pause, resume and status, plus loop
//! supervision (recovery after restart and graceful shutdown).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ringpost_core::types::now_timestamp;
use ringpost_core::{
    CallAttempt, CampaignRecord, Classification, DialerError, DialerJob, JobStatus,
};
use ringpost_storage::queries::{attempts, jobs};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::DialerContext;
use crate::dispatch::{self, JobLoop};
use crate::recording;
use crate::registry::PortRegistry;
use crate::test_call::{self, TestCall};

/// Note recorded on attempts finalized by an owner's cancel request.
pub const CANCELLED_NOTE: &str = "cancelled by owner";

/// Note recorded on attempts found unresolved after their job had already ended.
pub const ORPHANED_NOTE: &str = "job ended before the call resolved";

struct LoopHandle {
    generation: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the DialerJob state machine and one dispatch loop per active job.
///
/// Cheap to clone; clones share the same loops.
#[derive(Clone)]
pub struct CampaignOrchestrator {
    ctx: Arc<DialerContext>,
    loops: Arc<DashMap<String, LoopHandle>>,
    generation: Arc<AtomicU64>,
    root: CancellationToken,
}

impl CampaignOrchestrator {
    pub fn new(ctx: Arc<DialerContext>) -> Self {
        Self {
            ctx,
            loops: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            root: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &PortRegistry {
        &self.ctx.registry
    }

    pub fn context(&self) -> &Arc<DialerContext> {
        &self.ctx
    }

    /// Start dialing a campaign.
    ///
    /// `max_concurrent_calls` defaults to the number of ports available now
    /// (at least 1).
    pub async fn start(
        &self,
        campaign_id: &str,
        owner_id: &str,
        max_concurrent_calls: Option<u32>,
    ) -> Result<DialerJob, DialerError> {
        let campaign = self.owned_campaign(campaign_id, owner_id).await?;

        if let Some(active) = jobs::active_job_for_campaign(&self.ctx.db, campaign_id).await? {
            return Err(DialerError::AlreadyRunning {
                campaign_id: campaign_id.to_string(),
                job_id: active.id,
            });
        }

        let available = self.ctx.registry.count_available(owner_id).await?;
        if available == 0 {
            return Err(DialerError::InsufficientCapacity {
                requested: max_concurrent_calls.unwrap_or(1).max(1) as usize,
                available: 0,
            });
        }
        let max_concurrent_calls = max_concurrent_calls
            .unwrap_or_else(|| u32::try_from(available).unwrap_or(u32::MAX))
            .max(1);

        let contacts = self.ctx.directory.contacts(&campaign.contact_list_id).await?;
        let now = now_timestamp();
        let job = DialerJob {
            id: uuid::Uuid::new_v4().to_string(),
            campaign_id: campaign_id.to_string(),
            owner_id: owner_id.to_string(),
            status: JobStatus::Starting,
            total_calls: 0,
            completed_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            max_concurrent_calls,
            created_at: now.clone(),
            updated_at: now,
            ended_at: None,
        };
        let job = jobs::create_job(&self.ctx.db, &job, &contacts).await?;

        if let Err(e) = self
            .ctx
            .directory
            .mirror_status(campaign_id, job.status.campaign_status())
            .await
        {
            warn!(campaign_id, error = %e, "campaign status mirror failed");
        }

        info!(
            job_id = %job.id,
            campaign_id,
            owner_id,
            total_calls = job.total_calls,
            max_concurrent_calls,
            "job started"
        );
        self.spawn_loop(&job.id);
        Ok(job)
    }

    /// Cancel a job: stop dispatch, hang up in-flight legs (best effort),
    /// finalize their attempts and force-release their ports.
    pub async fn cancel(&self, job_id: &str, owner_id: &str) -> Result<DialerJob, DialerError> {
        let job = self.owned_job(job_id, owner_id).await?;
        let cancelled = dispatch::transition_and_mirror(&self.ctx, &job, JobStatus::Cancelled).await?;

        // Wait for the loop so no placement can start after the sweep below.
        self.stop_loop(job_id).await;

        let verdict = Classification::gateway_failure(CANCELLED_NOTE);
        for attempt in attempts::unresolved_attempts(&self.ctx.db, job_id).await? {
            if let Some(leg) = attempt.gateway_call_id.as_deref() {
                dispatch::cancel_leg(&self.ctx, leg).await;
            }
            if let Err(e) = dispatch::resolve_attempt(&self.ctx, owner_id, &attempt, &verdict).await {
                warn!(job_id, call_id = %attempt.id, error = %e, "failed to finalize cancelled attempt");
                // The port must not stay busy even if the attempt row could not be written.
                if let Err(e) = self
                    .ctx
                    .registry
                    .release_call(owner_id, attempt.port_number, &attempt.id, None)
                    .await
                {
                    warn!(
                        job_id,
                        call_id = %attempt.id,
                        port_number = attempt.port_number,
                        error = %e,
                        "failed to release cancelled attempt's port, left to recovery"
                    );
                }
            }
        }

        info!(job_id, owner_id, "job cancelled");
        Ok(jobs::get_job(&self.ctx.db, job_id).await?.unwrap_or(cancelled))
    }

    /// Halt new dispatch. In-flight calls keep being polled and released.
    pub async fn pause(&self, job_id: &str, owner_id: &str) -> Result<DialerJob, DialerError> {
        let job = self.owned_job(job_id, owner_id).await?;
        dispatch::transition_and_mirror(&self.ctx, &job, JobStatus::Paused).await
    }

    /// Resume dispatch of a paused job, respawning its loop if needed.
    pub async fn resume(&self, job_id: &str, owner_id: &str) -> Result<DialerJob, DialerError> {
        let job = self.owned_job(job_id, owner_id).await?;
        let resumed = dispatch::transition_and_mirror(&self.ctx, &job, JobStatus::Running).await?;
        if !self.is_looping(job_id) {
            self.spawn_loop(job_id);
        }
        Ok(resumed)
    }

    pub async fn status(&self, job_id: &str, owner_id: &str) -> Result<DialerJob, DialerError> {
        self.owned_job(job_id, owner_id).await
    }

    /// Every attempt of a job, oldest first.
    pub async fn attempts(
        &self,
        job_id: &str,
        owner_id: &str,
    ) -> Result<Vec<CallAttempt>, DialerError> {
        self.owned_job(job_id, owner_id).await?;
        attempts::list_attempts(&self.ctx.db, job_id).await
    }

    /// Place a single test call outside any job.
    pub async fn make_test_call(
        &self,
        owner_id: &str,
        campaign_id: &str,
        phone_number: &str,
    ) -> Result<TestCall, DialerError> {
        let campaign = self.owned_campaign(campaign_id, owner_id).await?;
        test_call::place(&self.ctx, &campaign, phone_number, self.root.child_token()).await
    }

    /// Respawn loops for every non-terminal job. Returns how many were started.
    ///
    /// Attempts still unresolved on terminal jobs (a cancel or completion cut
    /// short by a crash) are finalized as gateway failures first, and their
    /// ports released.
    pub async fn recover(&self) -> Result<usize, DialerError> {
        self.finalize_orphans().await?;

        let mut recovered = 0;
        for job in jobs::list_active_jobs(&self.ctx.db).await? {
            if !self.is_looping(&job.id) {
                self.spawn_loop(&job.id);
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!(count = recovered, "recovered dispatch loops");
        }
        Ok(recovered)
    }

    /// Stop every loop and pending test call without touching job state.
    ///
    /// Jobs stay in their current status and are picked up by [`recover`](Self::recover)
    /// on the next start.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let ids: Vec<String> = self.loops.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.stop_loop(&id).await;
        }
        info!("orchestrator shut down");
    }

    /// Finalize unresolved attempts of terminal jobs. Returns how many were resolved.
    async fn finalize_orphans(&self) -> Result<usize, DialerError> {
        let mut finalized = 0;
        for attempt in attempts::orphaned_attempts(&self.ctx.db).await? {
            let Some(job) = jobs::get_job(&self.ctx.db, &attempt.job_id).await? else {
                continue;
            };
            let verdict = if job.status == JobStatus::Cancelled {
                Classification::gateway_failure(CANCELLED_NOTE)
            } else {
                Classification::gateway_failure(ORPHANED_NOTE)
            };
            if let Some(leg) = attempt.gateway_call_id.as_deref() {
                dispatch::cancel_leg(&self.ctx, leg).await;
            }
            match dispatch::resolve_attempt(&self.ctx, &job.owner_id, &attempt, &verdict).await {
                Ok(true) => finalized += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    job_id = %job.id,
                    call_id = %attempt.id,
                    error = %e,
                    "failed to finalize orphaned attempt"
                ),
            }
        }
        if finalized > 0 {
            warn!(count = finalized, "finalized attempts left unresolved on ended jobs");
        }
        Ok(finalized)
    }

    /// Whether a live loop exists for the job.
    pub fn is_looping(&self, job_id: &str) -> bool {
        self.loops
            .get(job_id)
            .is_some_and(|h| !h.task.is_finished() && !h.token.is_cancelled())
    }

    pub fn active_loops(&self) -> usize {
        self.loops.len()
    }

    fn spawn_loop(&self, job_id: &str) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let job_loop = JobLoop::new(self.ctx.clone(), job_id.to_string(), token.clone());
        let loops = self.loops.clone();
        let key = job_id.to_string();

        let task = tokio::spawn(async move {
            job_loop.run().await;
            loops.remove_if(&key, |_, h| h.generation == generation);
            recording::set_active_jobs(loops.len());
        });

        if let Some(previous) = self.loops.insert(
            job_id.to_string(),
            LoopHandle {
                generation,
                token,
                task,
            },
        ) {
            previous.token.cancel();
        }
        recording::set_active_jobs(self.loops.len());
    }

    async fn stop_loop(&self, job_id: &str) {
        let Some((_, handle)) = self.loops.remove(job_id) else {
            return;
        };
        handle.token.cancel();
        if let Err(e) = handle.task.await {
            warn!(job_id, error = %e, "dispatch loop ended abnormally");
        }
        recording::set_active_jobs(self.loops.len());
    }

    async fn owned_campaign(
        &self,
        campaign_id: &str,
        owner_id: &str,
    ) -> Result<CampaignRecord, DialerError> {
        let campaign = self
            .ctx
            .directory
            .campaign(campaign_id)
            .await?
            .ok_or_else(|| DialerError::NotFound {
                entity: "campaign",
                id: campaign_id.to_string(),
            })?;
        if campaign.owner_id != owner_id {
            return Err(DialerError::NotOwner {
                entity: "campaign",
                id: campaign_id.to_string(),
            });
        }
        Ok(campaign)
    }

    async fn owned_job(&self, job_id: &str, owner_id: &str) -> Result<DialerJob, DialerError> {
        let job = jobs::get_job(&self.ctx.db, job_id)
            .await?
            .ok_or_else(|| DialerError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            })?;
        if job.owner_id != owner_id {
            return Err(DialerError::NotOwner {
                entity: "job",
                id: job_id.to_string(),
            });
        }
        Ok(job)
    }
}
