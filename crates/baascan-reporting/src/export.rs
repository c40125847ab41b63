use std::io::Write;
use std::path::Path;

use baascan_core::{
    Category, CategoryReference, ComplianceReport, EmptyResultsError, MatchResult,
    MissingRequirement, export_text,
};
use serde::Serialize;
use thiserror::Error;

use crate::types::{ExportFormat, ReportDocument};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Empty(#[from] EmptyResultsError),
    #[error("Failed to serialize: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to write: {0}")]
    Io(#[from] std::io::Error),
}

/// Render and write `doc` to `path`.
pub fn export_results(
    doc: &ReportDocument<'_>,
    format: ExportFormat,
    path: &Path,
) -> Result<(), ExportError> {
    let content = render(doc, format)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Render `doc` in `format`.
///
/// A document with neither matches nor an analysis has nothing to export and
/// fails with [`EmptyResultsError`].
pub fn render(doc: &ReportDocument<'_>, format: ExportFormat) -> Result<String, ExportError> {
    if doc.results.is_empty() && doc.analysis.is_none() {
        return Err(EmptyResultsError.into());
    }
    Ok(match format {
        ExportFormat::Text => export_plain(doc)?,
        ExportFormat::Markdown => export_markdown(doc),
        ExportFormat::Json => export_json(doc)?,
    })
}

// ── Text ────────────────────────────────────────────────────────────────

fn export_plain(doc: &ReportDocument<'_>) -> Result<String, ExportError> {
    let mut sections = Vec::new();
    if !doc.results.is_empty() {
        sections.push(export_text(doc.results)?);
    }
    if let Some(report) = doc.analysis {
        sections.push(plain_report(report));
    }
    Ok(sections.join("\n\n"))
}

fn plain_report(report: &ComplianceReport) -> String {
    let mut out = String::from("Compliance Analysis\n");
    out.push_str(&"=".repeat(19));
    out.push('\n');

    for (category, refs) in report.category_references.iter() {
        out.push_str(&format!("\n{}\n", category.label()));
        match refs {
            Some(refs) if !refs.is_empty() => {
                for r in refs {
                    out.push_str(&format!("  [{}] {}\n", r.section, r.text));
                }
            }
            _ => out.push_str("  (none found)\n"),
        }
    }

    out.push_str("\nMissing Requirements\n");
    out.push_str(&"-".repeat(20));
    out.push('\n');
    if report.missing_requirements.is_empty() {
        out.push_str("  (none)\n");
    }
    for (i, m) in report.missing_requirements.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, m.requirement));
        out.push_str(&format!("   {}\n", m.description));
        out.push_str(&format!("   Suggested fix: {}\n", m.fix));
    }
    out.trim_end().to_string()
}

// ── Markdown ────────────────────────────────────────────────────────────

fn md_escape(s: &str) -> String {
    s.replace('|', "\\|").replace('*', "\\*")
}

fn blockquote(s: &str) -> String {
    s.lines()
        .map(|l| format!("> {}", md_escape(l)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn export_markdown(doc: &ReportDocument<'_>) -> String {
    let mut out = format!("# BAA Scan: {}\n\n", md_escape(doc.filename));
    if !doc.terms.is_empty() {
        out.push_str(&format!("**Terms:** {}\n\n", md_escape(&doc.terms.join(", "))));
    }

    if !doc.results.is_empty() {
        out.push_str(&format!("## Matches ({})\n\n", doc.results.len()));
        for r in doc.results {
            write_md_match(&mut out, r);
        }
    }

    if let Some(report) = doc.analysis {
        out.push_str("## Compliance Analysis\n\n");
        for (category, refs) in report.category_references.iter() {
            write_md_category(&mut out, category, refs);
        }
        out.push_str("## Missing Requirements\n\n");
        if report.missing_requirements.is_empty() {
            out.push_str("_None identified._\n\n");
        }
        for (i, m) in report.missing_requirements.iter().enumerate() {
            write_md_missing(&mut out, i + 1, m);
        }
    }

    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}

fn write_md_match(out: &mut String, r: &MatchResult) {
    out.push_str(&format!("### Page {}: `{}`\n\n", r.page, r.term));
    out.push_str(&blockquote(&r.context));
    out.push_str("\n\n");
    if !r.summary.is_empty() {
        out.push_str(&format!("**Summary:** {}\n\n", md_escape(&r.summary)));
    }
}

fn write_md_category(
    out: &mut String,
    category: Category,
    refs: Option<&[CategoryReference]>,
) {
    out.push_str(&format!("### {}\n\n", category.label()));
    match refs {
        Some(refs) if !refs.is_empty() => {
            for r in refs {
                out.push_str(&format!("- **{}**: {}\n", md_escape(&r.section), md_escape(&r.text)));
            }
            out.push('\n');
        }
        _ => out.push_str("_None found._\n\n"),
    }
}

fn write_md_missing(out: &mut String, n: usize, m: &MissingRequirement) {
    out.push_str(&format!("{}. **{}**\n", n, md_escape(&m.requirement)));
    out.push_str(&format!("   {}\n", md_escape(&m.description)));
    out.push_str(&format!("   - Suggested fix: {}\n\n", md_escape(&m.fix)));
}

// ── JSON ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    file: &'a str,
    terms: &'a [String],
    results: &'a [MatchResult],
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a ComplianceReport>,
}

fn export_json(doc: &ReportDocument<'_>) -> Result<String, ExportError> {
    let body = JsonExport {
        file: doc.filename,
        terms: doc.terms,
        results: doc.results,
        analysis: doc.analysis,
    };
    Ok(serde_json::to_string_pretty(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use baascan_core::CategoryReferences;

    fn results() -> Vec<MatchResult> {
        vec![
            MatchResult::new(1, "breach", "report breaches within 24 hours,")
                .with_summary("Breaches are reported within a day."),
            MatchResult::new(2, "training", "annual training | refreshers"),
        ]
    }

    fn report() -> ComplianceReport {
        ComplianceReport {
            category_references: CategoryReferences {
                training: Some(vec![CategoryReference {
                    section: "5.2 Training".into(),
                    text: "Workforce members receive annual training.".into(),
                }]),
                ..Default::default()
            },
            missing_requirements: vec![MissingRequirement {
                requirement: "Return or destruction of PHI".into(),
                description: "PHI must be returned or destroyed at termination.".into(),
                fix: "Upon termination, Business Associate shall return or destroy all PHI.".into(),
            }],
        }
    }

    fn doc<'a>(
        results: &'a [MatchResult],
        terms: &'a [String],
        analysis: Option<&'a ComplianceReport>,
    ) -> ReportDocument<'a> {
        ReportDocument {
            filename: "vendor-baa.pdf",
            terms,
            results,
            analysis,
        }
    }

    #[test]
    fn format_parsing() {
        assert_eq!(ExportFormat::from_str("MD"), Ok(ExportFormat::Markdown));
        assert_eq!(ExportFormat::from_str("json"), Ok(ExportFormat::Json));
        assert_eq!(ExportFormat::from_str("txt"), Ok(ExportFormat::Text));
        assert!(ExportFormat::from_str("csv").is_err());
        for f in ExportFormat::all() {
            assert!(!f.extension().is_empty());
        }
    }

    #[test]
    fn text_of_matches_is_the_copy_format() {
        let results = results();
        let out = render(&doc(&results, &[], None), ExportFormat::Text).unwrap();
        assert_eq!(out, export_text(&results).unwrap());
        assert!(out.starts_with("Page 1: report breaches"));
    }

    #[test]
    fn text_appends_analysis() {
        let results = results();
        let report = report();
        let out = render(&doc(&results, &[], Some(&report)), ExportFormat::Text).unwrap();
        assert!(out.contains("\n\nCompliance Analysis\n"));
        assert!(out.contains("  [5.2 Training] Workforce members"));
        assert!(out.contains("Risk Management\n  (none found)"));
        assert!(out.contains("1. Return or destruction of PHI"));
    }

    #[test]
    fn nothing_to_export_is_an_error() {
        let err = render(&doc(&[], &[], None), ExportFormat::Markdown).unwrap_err();
        assert!(matches!(err, ExportError::Empty(_)));
    }

    #[test]
    fn analysis_alone_can_be_exported() {
        let report = report();
        let out = render(&doc(&[], &[], Some(&report)), ExportFormat::Markdown).unwrap();
        assert!(!out.contains("## Matches"));
        assert!(out.contains("## Compliance Analysis"));
    }

    #[test]
    fn markdown_lists_matches_and_categories() {
        let results = results();
        let report = report();
        let terms = vec!["breach".to_string(), "training".to_string()];
        let out = render(&doc(&results, &terms, Some(&report)), ExportFormat::Markdown).unwrap();

        assert!(out.starts_with("# BAA Scan: vendor-baa.pdf\n"));
        assert!(out.contains("**Terms:** breach, training"));
        assert!(out.contains("### Page 1: `breach`\n\n> report breaches within 24 hours,"));
        assert!(out.contains("**Summary:** Breaches are reported within a day."));
        assert!(out.contains("> annual training \\| refreshers"));
        assert!(out.contains("### Training\n\n- **5.2 Training**: Workforce members"));
        assert!(out.contains("### Breach Process\n\n_None found._"));
        assert!(out.contains("1. **Return or destruction of PHI**"));
        assert!(out.ends_with('\n') && !out.ends_with("\n\n"));
    }

    #[test]
    fn json_uses_wire_keys() {
        let results = results();
        let report = report();
        let terms = vec!["breach".to_string()];
        let out = render(&doc(&results, &terms, Some(&report)), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["file"], "vendor-baa.pdf");
        assert_eq!(value["results"][0]["page"], 1);
        assert_eq!(value["results"][1]["summary"], "");
        assert_eq!(
            value["analysis"]["categoryReferences"]["training"][0]["section"],
            "5.2 Training"
        );
        assert!(value["analysis"]["categoryReferences"]["riskManagement"].is_null());
        assert_eq!(
            value["analysis"]["missingRequirements"][0]["requirement"],
            "Return or destruction of PHI"
        );
    }

    #[test]
    fn json_omits_missing_analysis() {
        let results = results();
        let out = render(&doc(&results, &[], None), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(value.get("analysis").is_none());
    }

    #[test]
    fn export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.md");
        let results = results();
        export_results(&doc(&results, &[], None), ExportFormat::Markdown, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("## Matches (2)"));
    }
}
