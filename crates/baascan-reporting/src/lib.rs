//! Export of match results and compliance reports to text, Markdown, and
//! JSON.

pub mod export;
pub mod types;

pub use export::{ExportError, export_results, render};
pub use types::{ExportFormat, ReportDocument};
