//! Per-request replay guard.
//!
//! The guard decides, for each request, whether it may proceed:
//!
//! 1. disabled guard: forward untouched
//! 2. action outside the policy: forward, no token consumed
//! 3. token missing or empty: [`NonceRejection::MissingNonce`]
//! 4. token of the wrong length: [`NonceRejection::InvalidNonce`]
//! 5. token still live: [`NonceRejection::NonceExist`]
//! 6. store full: [`NonceRejection::NonceCountExceed`]
//! 7. otherwise the token is recorded and the request accepted
//!
//! Steps 5-7 are a single atomic operation on the [`TokenStore`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use super::error::NonceRejection;
use super::filter::ActionFilter;
use super::store::{InsertOutcome, TokenStore};

/// Request parameter carrying the nonce unless configured otherwise.
pub const DEFAULT_NONCE_PARAM: &str = "api_nonce";

/// Request parameter carrying the action name unless configured otherwise.
pub const DEFAULT_ACTION_PARAM: &str = "api_action";

/// What the guard needs to know about an incoming request.
pub trait NonceRequest {
    /// Action (request category) being invoked, if the request names one.
    fn action(&self) -> Option<&str>;

    /// Value of a named request parameter.
    fn param(&self, name: &str) -> Option<&str>;
}

/// Resolved guard settings, fixed once the guard is built.
#[derive(Debug, Clone)]
pub struct GuardSettings {
    pub enabled: bool,
    /// Exact byte length every nonce must have.
    pub token_length: usize,
    pub ttl: Duration,
    pub max_live_tokens: usize,
    pub filter: ActionFilter,
    pub nonce_param: String,
    pub action_param: String,
    /// Interval of the background purge. `None` relies on lazy eviction only.
    pub sweep_interval: Option<Duration>,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            token_length: 16,
            ttl: Duration::from_secs(1000),
            max_live_tokens: 100_000,
            filter: ActionFilter::match_all(),
            nonce_param: DEFAULT_NONCE_PARAM.to_string(),
            action_param: DEFAULT_ACTION_PARAM.to_string(),
            sweep_interval: Some(Duration::from_secs(60)),
        }
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Guard is disabled; nothing was checked.
    Bypassed,
    /// Action is not subject to nonce checking.
    FilteredOut,
    /// Nonce recorded, request may proceed.
    Accepted,
    Rejected(NonceRejection),
}

impl Decision {
    /// Whether the host should pass the request on.
    #[must_use]
    pub const fn is_forwarded(self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    #[must_use]
    pub const fn rejection(self) -> Option<NonceRejection> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Anti-replay guard owning its token store.
#[derive(Debug)]
pub struct ReplayGuard {
    settings: GuardSettings,
    disabled: AtomicBool,
    store: OnceLock<Arc<TokenStore>>,
}

impl ReplayGuard {
    /// Build a guard. The token store is only created if the guard starts
    /// enabled; otherwise it is created on the first [`enable`](Self::enable).
    #[must_use]
    pub fn new(settings: GuardSettings) -> Self {
        let guard = Self {
            disabled: AtomicBool::new(!settings.enabled),
            settings,
            store: OnceLock::new(),
        };
        if guard.settings.enabled {
            guard.init();
        }
        guard
    }

    fn init(&self) -> &Arc<TokenStore> {
        self.store.get_or_init(|| {
            let store = Arc::new(TokenStore::new(self.settings.ttl));
            tracing::info!(
                token_length = self.settings.token_length,
                ttl_secs = self.settings.ttl.as_secs(),
                max_live_tokens = self.settings.max_live_tokens,
                "nonce guard initialized"
            );
            if let Some(interval) = self.settings.sweep_interval {
                if tokio::runtime::Handle::try_current().is_ok() {
                    // Detached: exits on its own once the store is dropped
                    drop(store.spawn_sweeper(interval));
                } else {
                    tracing::debug!("no tokio runtime, nonce sweeper not started");
                }
            }
            store
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &GuardSettings {
        &self.settings
    }

    /// Token store, if the guard has ever been enabled.
    #[must_use]
    pub fn store(&self) -> Option<&Arc<TokenStore>> {
        self.store.get()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.disabled.load(Ordering::Acquire)
    }

    /// Turn the guard on, creating its store on first use. Calling this on an
    /// enabled guard has no effect.
    pub fn enable(&self) {
        self.init();
        if self.disabled.swap(false, Ordering::AcqRel) {
            tracing::info!("nonce guard enabled");
        }
    }

    /// Turn the guard off. Recorded tokens are kept and keep expiring.
    pub fn disable(&self) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            tracing::info!("nonce guard disabled");
        }
    }

    /// Number of live tokens currently remembered.
    #[must_use]
    pub fn live_tokens(&self) -> usize {
        self.store.get().map_or(0, |store| store.count())
    }

    /// Decide whether `request` may proceed, recording its nonce if accepted.
    pub fn evaluate<R: NonceRequest + ?Sized>(&self, request: &R) -> Decision {
        self.decide(request, Instant::now())
    }

    /// [`evaluate`](Self::evaluate) with an explicit clock reading.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn evaluate_at<R: NonceRequest + ?Sized>(&self, request: &R, now: Instant) -> Decision {
        self.decide(request, now)
    }

    fn decide<R: NonceRequest + ?Sized>(&self, request: &R, now: Instant) -> Decision {
        if !self.is_enabled() {
            return Decision::Bypassed;
        }
        let Some(store) = self.store.get() else {
            return Decision::Bypassed;
        };

        let action = request.action().unwrap_or_default();
        if !self.settings.filter.requires_check(action) {
            return Decision::FilteredOut;
        }

        let decision = match request.param(&self.settings.nonce_param) {
            None | Some("") => Decision::Rejected(NonceRejection::MissingNonce),
            Some(token) if token.len() != self.settings.token_length => {
                Decision::Rejected(NonceRejection::InvalidNonce)
            }
            Some(token) => match store.try_insert_at(
                token,
                self.settings.ttl,
                self.settings.max_live_tokens,
                now,
            ) {
                InsertOutcome::Inserted => Decision::Accepted,
                InsertOutcome::Duplicate => Decision::Rejected(NonceRejection::NonceExist),
                InsertOutcome::AtCapacity => {
                    Decision::Rejected(NonceRejection::NonceCountExceed)
                }
            },
        };

        if let Decision::Rejected(reason) = decision {
            tracing::debug!(action, reason = reason.code(), "nonce rejected");
        }
        decision
    }
}
