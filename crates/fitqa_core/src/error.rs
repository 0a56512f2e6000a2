//! crates/fitqa_core/src/error.rs
//!
//! Errors surfaced by the state container to its callers.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Input rejected before any network call.
    #[error("{0}")]
    Validation(String),

    /// A guest tried to use a feature that needs an account.
    #[error("{0}")]
    GuestNotAllowed(String),

    #[error("No active session")]
    NotSignedIn,

    #[error("Question {0} is not loaded")]
    UnknownQuestion(String),

    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),
}

impl StoreError {
    /// Text suitable for an alert on screen.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Validation(msg) | StoreError::GuestNotAllowed(msg) => msg.clone(),
            StoreError::NotSignedIn => "Please sign in or continue as a guest".to_string(),
            StoreError::UnknownQuestion(_) => {
                "That question is no longer available. Pull to refresh.".to_string()
            }
            StoreError::Port(PortError::Auth(msg) | PortError::Provider(msg)) => msg.clone(),
            StoreError::Port(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
