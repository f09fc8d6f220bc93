// Extraction plumbing: polite request pacing and partitioned extraction

pub mod partitioned;
pub mod rate_limiter;

pub use partitioned::PartitionedSource;
pub use rate_limiter::{Limits, RateLimiter};
