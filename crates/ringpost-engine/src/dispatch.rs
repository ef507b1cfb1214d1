// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-job dispatch loop.
//!
//! One [`JobLoop`] task drives one job: each tick it polls the job's
//! unresolved attempts, then (while the job is starting or running) reserves
//! ports, claims contacts and originates calls. All in-flight state is read
//! back from persisted attempts, so a restarted loop picks up exactly where
//! the previous one stopped and never re-places an originated call.

use std::sync::Arc;
use std::time::Duration;

use ringpost_core::types::now_timestamp;
use ringpost_core::{
    CallAttempt, CallStatus, CampaignRecord, Classification, Contact, DialerError, DialerJob,
    JobStatus, PortReservation,
};
use ringpost_core::types::{LegState, OriginateRequest};
use ringpost_storage::queries::{attempts, jobs};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::DialerContext;
use crate::recording;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    Continue,
    Stop,
}

pub(crate) struct JobLoop {
    ctx: Arc<DialerContext>,
    job_id: String,
    cancel: CancellationToken,
    campaign: Option<CampaignRecord>,
    starved_since: Option<Instant>,
}

impl JobLoop {
    pub(crate) fn new(ctx: Arc<DialerContext>, job_id: String, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            job_id,
            cancel,
            campaign: None,
            starved_since: None,
        }
    }

    /// Run until the job is terminal or the token is cancelled.
    ///
    /// Cancellation is observed between ticks and before each placement, never
    /// in the middle of an originate.
    pub(crate) async fn run(mut self) {
        let mut interval = tokio::time::interval(self.ctx.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job_id = %self.job_id, "dispatch loop started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(job_id = %self.job_id, "dispatch loop cancelled");
                    break;
                }
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Ok(Tick::Continue) => {}
                Ok(Tick::Stop) => break,
                Err(e) => {
                    warn!(job_id = %self.job_id, error = %e, "dispatch tick failed, retrying next tick");
                }
            }
        }
        info!(job_id = %self.job_id, "dispatch loop stopped");
    }

    pub(crate) async fn tick(&mut self) -> Result<Tick, DialerError> {
        let Some(job) = jobs::get_job(&self.ctx.db, &self.job_id).await? else {
            warn!(job_id = %self.job_id, "job no longer exists");
            return Ok(Tick::Stop);
        };
        if job.status.is_terminal() {
            return Ok(Tick::Stop);
        }

        if self.campaign.is_none() {
            self.campaign = self.ctx.directory.campaign(&job.campaign_id).await?;
        }
        let ceiling = match &self.campaign {
            Some(campaign) => self.ctx.dial_timeout(campaign),
            None => Duration::from_secs(self.ctx.config.dial_timeout_secs),
        };

        let in_flight = self.poll_in_flight(&job, ceiling).await?;
        if self.cancel.is_cancelled() {
            return Ok(Tick::Continue);
        }

        // Cancel or pause may have landed while we were polling.
        let Some(job) = jobs::get_job(&self.ctx.db, &self.job_id).await? else {
            return Ok(Tick::Stop);
        };
        if job.status.is_terminal() {
            return Ok(Tick::Stop);
        }
        if !job.status.is_dispatching() {
            return Ok(Tick::Continue);
        }

        let Some(campaign) = self.campaign.clone() else {
            if in_flight == 0 {
                warn!(job_id = %job.id, campaign_id = %job.campaign_id, "campaign no longer exists");
                finish(&self.ctx, &job, JobStatus::Failed).await?;
                return Ok(Tick::Stop);
            }
            return Ok(Tick::Continue);
        };

        let remaining = jobs::remaining_contacts(&self.ctx.db, &job.id).await? as usize;
        if remaining == 0 && in_flight == 0 {
            finish(&self.ctx, &job, JobStatus::Completed).await?;
            return Ok(Tick::Stop);
        }

        let slots = (job.max_concurrent_calls as usize)
            .saturating_sub(in_flight)
            .min(remaining);
        if slots > 0 {
            let reservations = self
                .ctx
                .allocator
                .reserve(&job.owner_id, slots, &job.campaign_id)
                .await?;

            if reservations.is_empty() && in_flight == 0 {
                let since = *self.starved_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= self.ctx.config.capacity_grace() {
                    warn!(
                        job_id = %job.id,
                        waited_secs = since.elapsed().as_secs(),
                        "no port became available within the capacity grace period"
                    );
                    finish(&self.ctx, &job, JobStatus::Failed).await?;
                    return Ok(Tick::Stop);
                }
                debug!(job_id = %job.id, "no ports available, waiting");
            } else {
                self.starved_since = None;
            }

            self.place_batch(&job, &campaign, reservations).await?;
        } else {
            self.starved_since = None;
        }

        // Leave Starting after the first pass, even one that placed nothing.
        if job.status == JobStatus::Starting {
            transition_and_mirror(&self.ctx, &job, JobStatus::Running).await?;
        }
        Ok(Tick::Continue)
    }

    /// Poll every unresolved attempt once. Returns how many are still in flight.
    async fn poll_in_flight(&self, job: &DialerJob, ceiling: Duration) -> Result<usize, DialerError> {
        let unresolved = attempts::unresolved_attempts(&self.ctx.db, &job.id).await?;
        let mut in_flight = 0;

        for attempt in unresolved {
            if self.cancel.is_cancelled() {
                in_flight += 1;
                continue;
            }

            if attempt_age(&attempt) >= ceiling {
                debug!(job_id = %job.id, call_id = %attempt.id, "dial timeout ceiling reached");
                if let Some(leg) = attempt.gateway_call_id.as_deref() {
                    cancel_leg(&self.ctx, leg).await;
                }
                resolve_attempt(&self.ctx, &job.owner_id, &attempt, &self.ctx.classifier.timed_out())
                    .await?;
                continue;
            }

            // Originate never returned a leg id; only the ceiling can resolve it.
            let Some(leg) = attempt.gateway_call_id.as_deref() else {
                in_flight += 1;
                continue;
            };

            let report = tokio::time::timeout(
                self.ctx.config.gateway_query_timeout(),
                self.ctx.gateway.get_status(leg),
            )
            .await;
            match report {
                Ok(Ok(report)) => match self.ctx.classifier.classify(&report) {
                    Some(classification) => {
                        resolve_attempt(&self.ctx, &job.owner_id, &attempt, &classification).await?;
                    }
                    None => {
                        in_flight += 1;
                        let progress = match report.state {
                            LegState::Ringing => Some(CallStatus::Ringing),
                            LegState::InProgress => Some(CallStatus::Answered),
                            _ => None,
                        };
                        if let Some(status) = progress.filter(|s| *s != attempt.status) {
                            attempts::update_progress(&self.ctx.db, &attempt.id, status).await?;
                        }
                    }
                },
                Ok(Err(e)) => {
                    in_flight += 1;
                    debug!(call_id = %attempt.id, leg, error = %e, "status query failed");
                }
                Err(_) => {
                    in_flight += 1;
                    debug!(call_id = %attempt.id, leg, "status query timed out");
                }
            }
        }
        Ok(in_flight)
    }

    /// Pair reservations with the next contacts and place the calls.
    ///
    /// Any reservation that does not end up carrying a call is released.
    async fn place_batch(
        &self,
        job: &DialerJob,
        campaign: &CampaignRecord,
        reservations: Vec<PortReservation>,
    ) -> Result<usize, DialerError> {
        if reservations.is_empty() {
            return Ok(0);
        }

        let contacts = match jobs::next_contacts(&self.ctx.db, &job.id, reservations.len()).await {
            Ok(contacts) => contacts,
            Err(e) => {
                release_reservations(&self.ctx, &reservations).await;
                return Err(e);
            }
        };

        let mut placed = 0;
        let mut pending = reservations.into_iter();
        for contact in contacts {
            if !self.may_place().await {
                break;
            }
            let Some(reservation) = pending.next() else {
                break;
            };
            match self.place_call(job, campaign, &reservation, &contact).await {
                Ok(true) => placed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(job_id = %job.id, port_number = reservation.port_number, error = %e, "call placement failed");
                }
            }
        }

        let leftover: Vec<_> = pending.collect();
        release_reservations(&self.ctx, &leftover).await;
        Ok(placed)
    }

    /// Re-check the token and the persisted status before each placement.
    async fn may_place(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match jobs::get_job(&self.ctx.db, &self.job_id).await {
            Ok(Some(job)) => job.status.is_dispatching(),
            _ => false,
        }
    }

    /// Create the attempt and originate. Returns `true` if the gateway accepted the call.
    async fn place_call(
        &self,
        job: &DialerJob,
        campaign: &CampaignRecord,
        reservation: &PortReservation,
        contact: &Contact,
    ) -> Result<bool, DialerError> {
        let attempt = CallAttempt {
            id: reservation.call_id.clone(),
            job_id: job.id.clone(),
            port_number: reservation.port_number,
            phone_number: contact.phone_number.clone(),
            gateway_call_id: None,
            status: CallStatus::Initiated,
            outcome: None,
            transfer_requested: false,
            transfer_successful: false,
            duration_seconds: 0,
            started_at: now_timestamp(),
            ended_at: None,
            notes: None,
        };

        let claimed = match attempts::begin_attempt(&self.ctx.db, &attempt, contact.position).await {
            Ok(claimed) => claimed,
            Err(e) => {
                release_reservations(&self.ctx, std::slice::from_ref(reservation)).await;
                return Err(e);
            }
        };
        if !claimed {
            debug!(job_id = %job.id, position = contact.position, "contact already claimed");
            release_reservations(&self.ctx, std::slice::from_ref(reservation)).await;
            return Ok(false);
        }

        let request = OriginateRequest {
            phone_number: contact.phone_number.clone(),
            transfer_number: campaign.transfer_number.clone(),
            greeting_audio_url: campaign.greeting_audio_url.clone(),
            port_number: reservation.port_number,
            campaign_id: job.campaign_id.clone(),
            is_test: false,
        };
        let timeout = self.ctx.config.originate_timeout();
        let error = match tokio::time::timeout(timeout, self.ctx.gateway.originate(&request)).await {
            Ok(Ok(response)) => {
                attempts::set_gateway_call_id(&self.ctx.db, &attempt.id, &response.call_id).await?;
                recording::record_call_placed(false);
                info!(
                    job_id = %job.id,
                    port_number = reservation.port_number,
                    call_id = %attempt.id,
                    gateway_call_id = %response.call_id,
                    "call placed"
                );
                return Ok(true);
            }
            Ok(Err(e)) => e,
            Err(_) => DialerError::Timeout { duration: timeout },
        };

        warn!(
            job_id = %job.id,
            port_number = reservation.port_number,
            call_id = %attempt.id,
            code = error.code(),
            error = %error,
            "originate failed"
        );
        let verdict = Classification::gateway_failure(format!("{}: {error}", error.code()));
        resolve_attempt(&self.ctx, &job.owner_id, &attempt, &verdict).await?;
        Ok(false)
    }
}

/// Finalize an attempt and release its port.
///
/// Finalization is exactly-once; the release is attempted regardless, guarded
/// on the attempt still holding the port. Returns `true` if this call did the
/// finalization.
pub(crate) async fn resolve_attempt(
    ctx: &DialerContext,
    owner_id: &str,
    attempt: &CallAttempt,
    classification: &Classification,
) -> Result<bool, DialerError> {
    let finalized = attempts::finalize_attempt(&ctx.db, &attempt.id, classification).await?;
    if let Some(done) = &finalized {
        recording::record_outcome(classification.outcome);
        info!(
            job_id = %done.job_id,
            call_id = %done.id,
            port_number = done.port_number,
            outcome = %classification.outcome,
            duration_seconds = done.duration_seconds,
            "call attempt resolved"
        );
    }
    ctx.registry
        .release_call(
            owner_id,
            attempt.port_number,
            &attempt.id,
            Some(classification.outcome.call_status()),
        )
        .await?;
    Ok(finalized.is_some())
}

/// Best-effort hangup, bounded by the query timeout.
pub(crate) async fn cancel_leg(ctx: &DialerContext, leg: &str) {
    match tokio::time::timeout(ctx.config.gateway_query_timeout(), ctx.gateway.cancel(leg)).await {
        Ok(Ok(())) => debug!(leg, "call leg cancelled"),
        Ok(Err(e)) => warn!(leg, error = %e, "gateway cancel failed"),
        Err(_) => warn!(leg, "gateway cancel timed out"),
    }
}

pub(crate) async fn release_reservations(ctx: &DialerContext, reservations: &[PortReservation]) {
    for r in reservations {
        if let Err(e) = ctx
            .registry
            .release_call(&r.owner_id, r.port_number, &r.call_id, None)
            .await
        {
            warn!(port_number = r.port_number, call_id = %r.call_id, error = %e, "failed to release unused port");
        }
    }
}

/// Transition a job and mirror the result onto its campaign.
///
/// The mirror is best effort: the job row is authoritative.
pub(crate) async fn transition_and_mirror(
    ctx: &DialerContext,
    job: &DialerJob,
    next: JobStatus,
) -> Result<DialerJob, DialerError> {
    let updated = jobs::transition_job(&ctx.db, &job.id, next).await?;
    info!(job_id = %job.id, from = %job.status, to = %next, "job status changed");
    if let Err(e) = ctx
        .directory
        .mirror_status(&job.campaign_id, next.campaign_status())
        .await
    {
        warn!(campaign_id = %job.campaign_id, error = %e, "campaign status mirror failed");
    }
    Ok(updated)
}

async fn finish(ctx: &DialerContext, job: &DialerJob, status: JobStatus) -> Result<(), DialerError> {
    match transition_and_mirror(ctx, job, status).await {
        Ok(done) => {
            info!(
                job_id = %done.id,
                status = %done.status,
                total = done.total_calls,
                completed = done.completed_calls,
                successful = done.successful_calls,
                failed = done.failed_calls,
                "job finished"
            );
            Ok(())
        }
        // Someone else (cancel) got there first.
        Err(DialerError::InvalidTransition { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Time since the attempt started. Unparseable timestamps count as expired.
fn attempt_age(attempt: &CallAttempt) -> Duration {
    match chrono::DateTime::parse_from_rfc3339(&attempt.started_at) {
        Ok(started) => chrono::Utc::now()
            .signed_duration_since(started)
            .to_std()
            .unwrap_or_default(),
        Err(_) => Duration::MAX,
    }
}
