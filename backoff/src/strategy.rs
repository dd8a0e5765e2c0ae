//! Cool-off schedules usable with [`crate::retry::Retry`].

pub mod exponential;
