//! Harvard Art Museums collection explorer: pages classifications and objects
//! out of the public API, splits them into metadata, media and color tables in
//! a local SQLite store, and runs a fixed catalog of analytical queries.

pub mod database;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod utils;
