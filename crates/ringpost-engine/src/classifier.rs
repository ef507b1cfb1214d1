// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic mapping from gateway call reports to canonical outcomes.

use ringpost_core::types::{AmdResult, LegState};
use ringpost_core::{CallOutcome, CallReport, Classification, OutcomeClassifier};

/// DTMF digit that requests a transfer.
pub const TRANSFER_DIGIT: &str = "1";

/// Default classifier driven by the platform's AMD verdict.
///
/// Rules, first match wins, evaluated only on terminal reports:
/// 1. AMD machine: voicemail. Digits are ignored.
/// 2. AMD human, digit `1`, transfer leg answered: transferred.
/// 3. AMD human otherwise: answered without transfer.
/// 4. No answer or busy: no answer.
/// 5. Failed or canceled leg: gateway failure.
///
/// A leg that completed without any AMD verdict was answered by someone and
/// counts as answered without transfer.
///
/// Rule 4 keeps unanswered and busy legs as `noAnswer` rather than folding
/// them into `gatewayFailure`, so reports can tell an unreachable contact from
/// a platform fault. Both still count towards the job's failed calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct AmdOutcomeClassifier;

impl OutcomeClassifier for AmdOutcomeClassifier {
    fn classify(&self, report: &CallReport) -> Option<Classification> {
        if !report.state.is_terminal() {
            return None;
        }

        let verdict = |outcome, transfer_requested, transfer_successful| Classification {
            outcome,
            transfer_requested,
            transfer_successful,
            duration_seconds: report.duration_seconds,
            notes: report.error.clone(),
        };

        let classification = match (report.amd, report.state) {
            (Some(AmdResult::Machine), _) => verdict(CallOutcome::Voicemail, false, false),
            (Some(AmdResult::Human), _) => {
                let requested = report.digit.as_deref() == Some(TRANSFER_DIGIT);
                if requested && report.transfer_answered {
                    verdict(CallOutcome::Transferred, true, true)
                } else {
                    verdict(CallOutcome::AnsweredNoTransfer, requested, false)
                }
            }
            (_, LegState::NoAnswer | LegState::Busy) => verdict(CallOutcome::NoAnswer, false, false),
            (_, LegState::Completed) => verdict(CallOutcome::AnsweredNoTransfer, false, false),
            (_, _) => Classification {
                notes: Some(
                    report
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("call leg ended {}", report.state)),
                ),
                ..verdict(CallOutcome::GatewayFailure, false, false)
            },
        };
        Some(classification)
    }
}
