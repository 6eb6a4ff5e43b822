pub mod checkout;
pub mod delivery;
pub mod enrollment;
pub mod reconciliation;
pub mod tracking_id;
pub mod tracking_log;
