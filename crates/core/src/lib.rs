#![forbid(unsafe_code)]

pub mod countdown;
pub mod error;
pub mod model;
pub mod time;

pub use countdown::{Countdown, CountdownState, TickOutcome, TickToken};
pub use error::Error;
pub use time::Clock;
