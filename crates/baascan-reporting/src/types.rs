use std::str::FromStr;

use baascan_core::{ComplianceReport, MatchResult};

/// Output format for exported results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn all() -> &'static [ExportFormat] {
        &[ExportFormat::Text, ExportFormat::Markdown, ExportFormat::Json]
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Text => "Text",
            ExportFormat::Markdown => "Markdown",
            ExportFormat::Json => "JSON",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "txt" => Ok(ExportFormat::Text),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!(
                "unknown export format {:?} (expected text, markdown or json)",
                other
            )),
        }
    }
}

/// Everything known about one analyzed document, borrowed for export.
#[derive(Debug, Clone, Copy)]
pub struct ReportDocument<'a> {
    pub filename: &'a str,
    pub terms: &'a [String],
    pub results: &'a [MatchResult],
    pub analysis: Option<&'a ComplianceReport>,
}
