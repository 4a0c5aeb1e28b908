pub mod catalog;
pub mod column;
pub mod job;
pub mod query;
pub mod row;

pub use catalog::*;
pub use column::*;
pub use job::*;
pub use query::*;
pub use row::*;
