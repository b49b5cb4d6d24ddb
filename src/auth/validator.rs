//! Live validation of a cached credential pair.

use std::fmt;

use async_trait::async_trait;

use super::TokenRecord;

/// Result of a live validation probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Upstream accepted the credentials.
    Valid,
    /// Upstream rejected the credentials or the probe could not tell.
    Rejected {
        /// Why the probe did not pass.
        reason: String,
    },
}

impl ProbeOutcome {
    /// Creates a rejected outcome.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`ProbeOutcome::Valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
        }
    }
}

/// Checks a credential pair against the upstream.
///
/// Validation never fails hard: anything short of a clear pass is a
/// [`ProbeOutcome::Rejected`], which makes the cache refresh.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Probes the upstream with `record`.
    async fn validate(&self, record: &TokenRecord) -> ProbeOutcome;
}

/// Validator that accepts every well-formed record without a network call.
///
/// Used when no probe target is known yet, e.g. the standalone `auth` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptWellFormed;

#[async_trait]
impl TokenValidator for AcceptWellFormed {
    async fn validate(&self, record: &TokenRecord) -> ProbeOutcome {
        if record.is_well_formed() {
            ProbeOutcome::Valid
        } else {
            ProbeOutcome::rejected("record has an empty token or cookie")
        }
    }
}
