// Rewrite passes applied between analysis and execution: instance stripping
// first, then ADQL spatial functions.
pub mod adql;
pub mod instance_stripper;

pub use adql::{rewrite_adql, SpatialDialect};
pub use instance_stripper::{strip_instance_identifiers, StrippedStatement};
