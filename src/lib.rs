//! Mentalnav Metrics - trial analysis engine for the mental-navigation dashboard
//!
//! Turns a participant's experiment document into chart-ready timing metrics
//! through a deterministic pipeline: document adaptation → event-to-duration
//! reduction → trial normalization → category filtering and aggregation →
//! presentation jitter → report encoding.
//!
//! ## Modules
//!
//! - **Sources**: list completed participants and load their tables
//! - **Analysis**: durations, signed seconds, error bars and summary statistics
//! - **Export**: xlsx workbook of the raw tables, memoized by content

pub mod aggregate;
pub mod config;
pub mod encoder;
pub mod error;
pub mod export;
pub mod jitter;
pub mod normalizer;
pub mod pipeline;
pub mod reducer;
pub mod schema;
pub mod source;
pub mod types;

pub use config::DashboardConfig;
pub use encoder::MetricsEncoder;
pub use error::PipelineError;
pub use export::ExportCache;
pub use pipeline::{analyze_participant, AnalysisOptions, MetricsProcessor, ParticipantAnalysis};
pub use reducer::EventDurationReducer;
pub use schema::{DocumentAdapter, ParticipantDocument};
pub use source::{DataSource, InMemorySource, JsonDirSource};

/// Crate version embedded in all reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "mentalnav-metrics";
