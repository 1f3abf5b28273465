//! HTTP plumbing shared by the tool engine and the adapter.
//!
//! Holds the process-wide credential set, per-spec sessions with their cookie jars, the login
//! flow, the on-disk token cache and helpers for redacting outbound URLs.

pub mod credentials;
pub mod error;
pub mod safety;
pub mod semantics;
pub mod session;
pub mod token_cache;

pub use credentials::CredentialSet;
pub use error::{HttpToolsError, Result};
pub use session::{AuthStatus, LoginOutcome, LoginStatus, Session, SessionConfig, SessionManager};
pub use token_cache::TokenCache;
