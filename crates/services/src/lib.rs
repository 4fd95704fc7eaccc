#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod sessions;

pub use exam_core::Clock;

pub use client::{
    ApiConfig, HttpTestClient, NextQuestion, ResumeResponse, StartResponse, TestApi,
};
pub use error::{ApiError, ConfigError, IntentError};
pub use sessions::{
    Completion, DisposeHandle, Failure, FailureKind, FinishReason, Phase, Redirect,
    SessionIntent, SessionManager, SessionView,
};
