//! Reuse-or-refresh arbitration for the run's credential pair.
//!
//! [`TokenCache`] is the only reader and writer of the [`TokenStore`]. Every
//! call runs under one async lock, so concurrent callers that all find the
//! record stale share a single refresh: the first mints and persists, the rest
//! load the new record and reuse it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{
    AuthError, Authenticator, ProbeOutcome, TokenRecord, TokenStore, TokenValidator, unix_now,
};

/// Default credential lifetime before a refresh is forced.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Credentials returned by [`TokenCache::acquire`].
#[derive(Debug, Clone)]
pub struct CachedTokens {
    /// The usable record.
    pub record: TokenRecord,
    /// `true` when the authenticator minted this record during the call.
    pub refreshed: bool,
}

/// Owns the cached [`TokenRecord`] and its freshness and validity lifecycle.
pub struct TokenCache {
    store: TokenStore,
    authenticator: Arc<dyn Authenticator>,
    validator: Arc<dyn TokenValidator>,
    ttl: Duration,
    refresh_lock: Mutex<()>,
}

impl TokenCache {
    /// Creates a cache over `store` with the default TTL.
    #[must_use]
    pub fn new(
        store: TokenStore,
        authenticator: Arc<dyn Authenticator>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        Self {
            store,
            authenticator,
            validator,
            ttl: DEFAULT_TOKEN_TTL,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Overrides the freshness TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns a usable credential pair, refreshing it when needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when a refresh is needed and the authenticator fails.
    pub async fn get_valid_tokens(&self) -> Result<TokenRecord, AuthError> {
        self.acquire().await.map(|tokens| tokens.record)
    }

    /// Like [`get_valid_tokens`](Self::get_valid_tokens), also reporting
    /// whether a refresh happened.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when a refresh is needed and the authenticator fails.
    #[instrument(skip(self), fields(store = %self.store.path().display()))]
    pub async fn acquire(&self) -> Result<CachedTokens, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(record) = self.load_candidate() {
            let now = unix_now();
            if record.is_fresh(self.ttl, now) {
                match self.validator.validate(&record).await {
                    ProbeOutcome::Valid => {
                        debug!(issued_at = record.issued_at(), "reusing cached credentials");
                        return Ok(CachedTokens {
                            record,
                            refreshed: false,
                        });
                    }
                    ProbeOutcome::Rejected { reason } => {
                        info!(%reason, "cached credentials failed validation");
                    }
                }
            } else {
                info!(
                    age_secs = record.age(now).as_secs(),
                    ttl_secs = self.ttl.as_secs(),
                    "cached credentials are stale"
                );
            }
        }

        let record = self.refresh().await?;
        Ok(CachedTokens {
            record,
            refreshed: true,
        })
    }

    fn load_candidate(&self) -> Option<TokenRecord> {
        match self.store.load() {
            Ok(Some(record)) if record.is_well_formed() => Some(record),
            Ok(Some(_)) => {
                warn!("persisted credentials are incomplete, ignoring");
                None
            }
            Ok(None) => {
                debug!("no persisted credentials");
                None
            }
            Err(error) => {
                warn!(error = %error, "cannot load persisted credentials, ignoring");
                None
            }
        }
    }

    async fn refresh(&self) -> Result<TokenRecord, AuthError> {
        let minted = self.authenticator.acquire_credentials().await?;
        let record = minted.reissued(unix_now());

        if let Err(error) = self.store.save(&record) {
            warn!(error = %error, "cannot persist refreshed credentials; using them for this run only");
        } else {
            info!(issued_at = record.issued_at(), "refreshed credentials");
        }
        Ok(record)
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("store", &self.store)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
