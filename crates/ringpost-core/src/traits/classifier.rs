// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcome classifier trait.

use crate::types::{CallReport, Classification};

/// Maps raw gateway and AMD signals to a canonical call outcome.
pub trait OutcomeClassifier: Send + Sync + 'static {
    /// Classifies a report. Returns `None` while the call is still in flight.
    fn classify(&self, report: &CallReport) -> Option<Classification>;

    /// Verdict for an attempt whose dial-timeout ceiling expired unresolved.
    fn timed_out(&self) -> Classification {
        Classification::gateway_failure("dial timeout ceiling reached")
    }
}
