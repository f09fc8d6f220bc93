//! Listing data shapes shared across the pipeline phases.

pub mod dataset;
pub mod value;

pub use dataset::{Column, Dataset, Row};
pub use value::{parse_datetime, parse_number, InferredType, Value};
