//! Data models for the tutoring marketplace core.
//!
//! These models match the frontend JSON contract (camelCase fields) exactly.

mod booking;
mod message;
mod slot;
mod tag;
mod tutor;

pub use booking::*;
pub use message::*;
pub use slot::*;
pub use tag::*;
pub use tutor::*;
