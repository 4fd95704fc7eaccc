mod failure;
mod manager;
mod view;

// Public API of the session subsystem.
pub use failure::{Failure, FailureKind};
pub use manager::{DisposeHandle, SessionManager};
pub use view::{
    Completion, FinishReason, Phase, REDIRECT_DELAY, Redirect, SessionIntent, SessionView,
};
