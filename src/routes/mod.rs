//! Route definitions for the ToolShare API

mod board;
mod rentals;
mod tools;
mod users;
mod webhooks;

pub use board::board_routes;
pub use rentals::rental_routes;
pub use tools::tool_routes;
pub use users::user_routes;
pub use webhooks::webhook_routes;
