//! Core utilities shared by every engine

pub mod time;

pub use time::{days_between, Clock, FixedClock, SystemClock};
