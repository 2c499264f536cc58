//! Report rendering.

pub mod generator;
pub mod timefmt;

pub use generator::{generate_json_report, generate_markdown_report, Report, ReportMetadata, ReportOptions};
