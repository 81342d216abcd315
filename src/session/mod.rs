//! Client-side session guard
//!
//! Keeps a long-lived client's view of who is signed in consistent with the
//! server: the stored token is re-verified at startup and periodically,
//! removal in one tab logs out every tab, and pages are checked against the
//! signed-in role before they are shown.

pub mod guard;
pub mod provider;
pub mod store;
pub mod verifier;

pub use guard::{GuardDecision, GuardReason, SessionGuard};
pub use provider::{BackgroundTask, SessionProvider, SessionState, SessionUser, DEFAULT_REVALIDATION_PERIOD};
pub use store::{CredentialEvent, CredentialStore, MemoryCredentialStore, SessionMarker, TabSession};
pub use verifier::{HttpTokenVerifier, TokenVerifier, Verification, VerifiedPayload};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Verification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Verification endpoint answered with status {0}")]
    UnexpectedStatus(u16),
}
