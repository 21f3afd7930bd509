//! Background sweep for time-triggered deposit releases
//!
//! The claim-window expiry has no driving event, so a scheduled job
//! evaluates it on a fixed interval.

use std::sync::Arc;

use super::RentalService;

/// Run one deposit release pass. Invoked repeatedly by the scheduler in
/// `main`; errors are logged and the next pass retries.
pub async fn run_deposit_sweep(rental_service: Arc<RentalService>) {
    match rental_service.release_due_deposits().await {
        Ok(released) => {
            if !released.is_empty() {
                tracing::info!(count = released.len(), "Deposit sweep released deposits");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Deposit sweep failed");
        }
    }
}
