//! API handlers for the ToolShare backend

mod board;
mod rentals;
mod tools;
mod users;
mod webhooks;

pub use board::*;
pub use rentals::*;
pub use tools::*;
pub use users::*;
pub use webhooks::*;

// Re-export extractors from middleware for handler use
pub use crate::middleware::auth::{AdminUser, AuthenticatedUser, OptionalUser};
