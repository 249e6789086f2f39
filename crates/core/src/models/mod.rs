//! Data models for the studio core

mod calendar;
mod class;
mod instructor;
mod user;

pub use calendar::*;
pub use class::*;
pub use instructor::*;
pub use user::*;
