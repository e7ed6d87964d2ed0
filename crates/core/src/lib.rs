//! Domain primitives shared by the offsetting pipeline crates.
//!
//! Nothing in here talks to the warehouse: dates, table references, query
//! templates and the subprocess helper are all pure or local-only.

pub mod dates;
pub mod error;
pub mod subprocess;
pub mod table_ref;
pub mod template;
