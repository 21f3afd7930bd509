//! Tool request board domain module
//!
//! Users post requests for tools nobody lists yet; others upvote them.

mod model;
mod service;

pub use model::*;
pub use service::BoardService;
