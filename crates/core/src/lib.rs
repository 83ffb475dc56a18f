#![forbid(unsafe_code)]

pub mod error;
pub mod gate;
pub mod grading;
pub mod lockout;
pub mod model;
pub mod sequencing;
pub mod time;

pub use error::Error;
pub use time::Clock;
