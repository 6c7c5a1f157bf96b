//! Shared HTTP response helpers

mod response;

pub use response::{Created, NoContent};
