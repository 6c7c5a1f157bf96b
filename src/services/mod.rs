//! Service layer modules.
//!
//! Business operations sit here, between the HTTP routes and the store.

pub mod estimation;

pub use estimation::{EstimationPolicy, EstimationService};
