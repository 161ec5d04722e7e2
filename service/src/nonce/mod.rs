//! Replay protection based on one-time request nonces.
//!
//! A [`ReplayGuard`] owns a [`TokenStore`] of recently seen nonces and an
//! [`ActionFilter`] selecting which actions must carry one.

pub mod error;
pub mod filter;
pub mod guard;
pub mod store;

pub use error::{Lang, NonceRejection};
pub use filter::{ActionFilter, ActionPattern};
pub use guard::{Decision, GuardSettings, NonceRequest, ReplayGuard};
pub use store::{InsertOutcome, TokenStore};
