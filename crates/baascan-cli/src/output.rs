use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use baascan_core::highlight::term_spans;
use baascan_core::{ComplianceReport, MatchResult, ProgressEvent, ProgressFn, StoredFile, TermSet};
use baascan_reporting::ExportFormat;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Spinner, then a bar over the summaries once the match count is known.
pub struct ProgressDisplay {
    bar: ProgressBar,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.green/dim}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

impl ProgressDisplay {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(spinner_style());
        bar.set_message("Loading document...");
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn callback(&self) -> ProgressFn {
        let bar = self.bar.clone();
        Arc::new(move |event| render_progress(&bar, &event))
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn render_progress(bar: &ProgressBar, event: &ProgressEvent) {
    match event {
        ProgressEvent::Extracted { pages } => {
            bar.set_message(format!("Extracted {} pages", pages));
        }
        ProgressEvent::Scanned { matches, terms } => {
            bar.set_style(bar_style());
            bar.set_length(*matches as u64);
            bar.set_position(0);
            bar.set_message(format!("{} matches for {} terms", matches, terms));
        }
        ProgressEvent::Summarizing { page, term, .. } => {
            bar.set_message(format!("Summarizing page {} ({})", page, term));
        }
        ProgressEvent::Summarized { .. } => bar.inc(1),
        ProgressEvent::SummariesComplete { total, failed } => {
            if *failed > 0 {
                bar.println(format!("{} of {} summaries failed", failed, total));
            }
        }
        ProgressEvent::Classifying { chars } => {
            bar.set_style(spinner_style());
            bar.set_message(format!("Analyzing {} characters for compliance", chars));
        }
        ProgressEvent::Classified { .. } => bar.set_message("Analysis complete"),
    }
}

/// Write `context` with every occurrence of the match's term emphasized.
fn write_context(w: &mut dyn Write, m: &MatchResult, color: ColorMode) -> std::io::Result<()> {
    if !color.enabled() {
        return write!(w, "{}", m.context);
    }
    let mut at = 0;
    for span in term_spans(&m.context, &m.term) {
        let hit = &m.context[span.clone()];
        write!(w, "{}{}", &m.context[at..span.start], hit.bold().yellow())?;
        at = span.end;
    }
    write!(w, "{}", &m.context[at..])
}

/// Print every match with its page, term, clause, and summary.
pub fn print_matches(
    w: &mut dyn Write,
    file_name: &str,
    terms: &TermSet,
    results: &[MatchResult],
    color: ColorMode,
) -> std::io::Result<()> {
    let term_list = terms.iter().collect::<Vec<_>>().join(", ");
    if results.is_empty() {
        writeln!(w, "No matches for {} in {}", term_list, file_name)?;
        return Ok(());
    }

    let header = format!(
        "{} matches for {} in {}",
        results.len(),
        term_list,
        file_name
    );
    if color.enabled() {
        writeln!(w, "{}", header.bold())?;
    } else {
        writeln!(w, "{}", header)?;
    }
    writeln!(w)?;

    for (i, m) in results.iter().enumerate() {
        let label = format!("[{}] Page {} - {}", i + 1, m.page, m.term);
        if color.enabled() {
            writeln!(w, "{}", label.bold().cyan())?;
        } else {
            writeln!(w, "{}", label)?;
        }
        write!(w, "    ")?;
        write_context(w, m, color)?;
        writeln!(w)?;
        if !m.summary.is_empty() {
            if color.enabled() {
                writeln!(w, "    {} {}", "Summary:".dimmed(), m.summary)?;
            } else {
                writeln!(w, "    Summary: {}", m.summary)?;
            }
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Print the category references and missing requirements.
pub fn print_report(
    w: &mut dyn Write,
    report: &ComplianceReport,
    color: ColorMode,
) -> std::io::Result<()> {
    for (category, refs) in report.category_references.iter() {
        let refs = refs.unwrap_or_default();
        if refs.is_empty() {
            if color.enabled() {
                writeln!(w, "{} {}", "-".dimmed(), category.label().dimmed())?;
            } else {
                writeln!(w, "- {} (none found)", category.label())?;
            }
            continue;
        }
        if color.enabled() {
            writeln!(
                w,
                "{} {} ({})",
                "+".green(),
                category.label().bold(),
                refs.len()
            )?;
        } else {
            writeln!(w, "+ {} ({})", category.label(), refs.len())?;
        }
        for r in refs {
            writeln!(w, "    [{}] {}", r.section, r.text)?;
        }
    }

    writeln!(w)?;
    if report.missing_requirements.is_empty() {
        if color.enabled() {
            writeln!(w, "{}", "No missing requirements identified.".green())?;
        } else {
            writeln!(w, "No missing requirements identified.")?;
        }
        return Ok(());
    }

    let heading = format!(
        "Missing requirements ({})",
        report.missing_requirements.len()
    );
    if color.enabled() {
        writeln!(w, "{}", heading.red().bold())?;
    } else {
        writeln!(w, "{}", heading)?;
    }
    for (i, m) in report.missing_requirements.iter().enumerate() {
        writeln!(w, "{}. {}", i + 1, m.requirement)?;
        writeln!(w, "   {}", m.description)?;
        if color.enabled() {
            writeln!(w, "   {} {}", "Fix:".green(), m.fix)?;
        } else {
            writeln!(w, "   Fix: {}", m.fix)?;
        }
    }
    Ok(())
}

pub fn print_stored_files(
    w: &mut dyn Write,
    owner: &str,
    files: &[StoredFile],
    color: ColorMode,
) -> std::io::Result<()> {
    if files.is_empty() {
        writeln!(w, "No documents stored for {}", owner)?;
        return Ok(());
    }
    for f in files {
        let size = HumanBytes(f.size).to_string();
        if color.enabled() {
            writeln!(w, "{}  {:>10}", f.name.bold(), size.dimmed())?;
        } else {
            writeln!(w, "{}  {:>10}", f.name, size)?;
        }
    }
    Ok(())
}

pub fn print_exported(
    w: &mut dyn Write,
    format: ExportFormat,
    path: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    let msg = format!("Exported {} to {}", format.label(), path.display());
    if color.enabled() {
        writeln!(w, "{}", msg.green())
    } else {
        writeln!(w, "{}", msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baascan_core::{CategoryReference, CategoryReferences, MissingRequirement};

    const PLAIN: ColorMode = ColorMode(false);

    fn render(f: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn matches_are_numbered_with_summaries() {
        let results = vec![
            MatchResult::new(3, "breach", "notify of any breach,")
                .with_summary("Notice is required."),
            MatchResult::new(4, "breach", "breach logs"),
        ];
        let out = render(|w| {
            print_matches(w, "baa.pdf", &TermSet::parse("breach"), &results, PLAIN)
        });
        assert!(out.starts_with("2 matches for breach in baa.pdf\n"));
        assert!(out.contains(
            "[1] Page 3 - breach\n    notify of any breach,\n    Summary: Notice is required.\n"
        ));
        assert!(out.contains("[2] Page 4 - breach\n    breach logs\n\n"));
    }

    #[test]
    fn no_matches_message() {
        let terms = TermSet::parse("audit|breach");
        let out = render(|w| print_matches(w, "baa.pdf", &terms, &[], PLAIN));
        assert_eq!(out, "No matches for audit, breach in baa.pdf\n");
    }

    #[test]
    fn colored_context_marks_term_words() {
        let m = MatchResult::new(1, "breach", "any Breach shall");
        let out = render(|w| write_context(w, &m, ColorMode(true)));
        let marked = "Breach".bold().yellow().to_string();
        assert_eq!(out, format!("any {} shall", marked));
    }

    #[test]
    fn colored_context_marks_multi_word_terms() {
        let m = MatchResult::new(
            1,
            "business associate",
            "The Business Associate shall notify the business associate's agents",
        );
        let out = render(|w| write_context(w, &m, ColorMode(true)));
        let first = "Business Associate".bold().yellow().to_string();
        let second = "business associate".bold().yellow().to_string();
        assert_eq!(
            out,
            format!("The {} shall notify the {}'s agents", first, second)
        );
    }

    #[test]
    fn report_lists_found_and_missing() {
        let report = ComplianceReport {
            category_references: CategoryReferences {
                breach_process: Some(vec![CategoryReference {
                    section: "4.1".into(),
                    text: "Report within 10 days.".into(),
                }]),
                ..Default::default()
            },
            missing_requirements: vec![MissingRequirement {
                requirement: "Subcontractor assurances".into(),
                description: "Subcontractors must agree to the same terms.".into(),
                fix: "Add a flow-down clause.".into(),
            }],
        };
        let out = render(|w| print_report(w, &report, PLAIN));
        assert!(out.contains("+ Breach Process (1)\n    [4.1] Report within 10 days.\n"));
        assert!(out.contains("- Training (none found)\n"));
        assert!(out.contains("Missing requirements (1)\n1. Subcontractor assurances\n"));
        assert!(out.contains("   Fix: Add a flow-down clause.\n"));
    }

    #[test]
    fn empty_store_listing() {
        let out = render(|w| print_stored_files(w, "u-1", &[], PLAIN));
        assert_eq!(out, "No documents stored for u-1\n");
    }

    #[test]
    fn progress_events_drive_the_bar() {
        let display = ProgressDisplay::new(false);
        let progress = display.callback();
        progress(ProgressEvent::Scanned {
            matches: 3,
            terms: 2,
        });
        progress(ProgressEvent::Summarized {
            index: 0,
            total: 3,
            ok: true,
        });
        assert_eq!(display.bar.length(), Some(3));
        assert_eq!(display.bar.position(), 1);
        display.finish();
    }
}
