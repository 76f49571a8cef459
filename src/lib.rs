pub mod aggregate;
pub mod config;
pub mod db;
pub mod filter;
pub mod group;
pub mod models;
pub mod notify;
pub mod paginate;
pub mod permissions;
pub mod pipeline;
pub mod report;
pub mod screens;
pub mod source;

pub use models::{AggregateResult, FieldValue, FilterState, Group, Page, Record, ALL};
pub use pipeline::{compute, Screen, ScreenConfig, ScreenState, View};
pub use source::{DataSource, MutationOp, Query, SourceError};
