//! Domain types and DTOs
//!
//! These types define the data structures for bills of quantities and
//! the cost roll-ups built from them.

pub mod boq;
pub mod costing;

pub use boq::*;
pub use costing::*;
