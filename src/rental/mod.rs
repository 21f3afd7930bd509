//! Rental domain module
//!
//! Contains the rental transaction models, the state-machine service, and
//! the deposit release sweep.

mod model;
mod service;
mod sweep;

pub use model::*;
pub use service::RentalService;
pub use sweep::run_deposit_sweep;
