//! API request handlers

mod deployments;
mod health;
mod messages;
mod workers;

pub use deployments::*;
pub use health::*;
pub use messages::*;
pub use workers::*;
