pub mod auth;
pub mod client;
pub mod credentials;
pub mod error;
pub mod mirror;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthChallengeCoordinator, ChallengeOutcome, ChallengeReason};
pub use client::RemoteClient;
pub use credentials::{CredentialPrompt, CredentialStore, Credentials};
pub use error::{FieldSyncError, SyncError};
pub use mirror::{BindingState, ItemMirror};
