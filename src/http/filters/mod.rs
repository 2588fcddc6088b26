//! Built-in filters.

pub mod background;
pub mod cache;
pub mod headers;
pub mod metrics;

pub use background::BackgroundWorkFilter;
pub use cache::CacheStrategyFilter;
pub use headers::DefaultHeadersFilter;
pub use metrics::MetricsFilter;
