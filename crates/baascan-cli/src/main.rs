use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use baascan_core::llm::build_generator;
use baascan_core::upload::content_type_for_path;
use baascan_core::{
    AnalysisSession, BlobStore, Config, Document, LocalBlobStore, Pipeline, Provider,
    SearchOptions, SessionContext, config_file,
};
use baascan_pdf_mupdf::MupdfBackend;
use baascan_reporting::{ExportFormat, ReportDocument, export_results};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;

use output::{ColorMode, ProgressDisplay};

/// BAA Scanner - Find and summarize compliance clauses in Business Associate Agreements
#[derive(Parser, Debug)]
#[command(name = "baascan", version, about, long_about = None)]
struct Cli {
    /// Log progress details to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GeneratorArgs {
    /// Generative backend: openai or gemini
    #[arg(long, value_parser = parse_provider)]
    provider: Option<Provider>,

    /// API base URL for the backend
    #[arg(long)]
    endpoint: Option<String>,

    /// Number of concurrent summary requests
    #[arg(long)]
    workers: Option<usize>,
}

impl GeneratorArgs {
    /// Flags win over the environment and config file.
    fn apply(&self, config: &mut Config) {
        if let Some(provider) = self.provider {
            if provider != config.generator.provider {
                // A key resolved for another provider is useless here.
                config.generator.api_key = std::env::var(provider.api_key_env()).ok();
            }
            config.generator.provider = provider;
        }
        if let Some(ref endpoint) = self.endpoint {
            config.generator.endpoint = Some(endpoint.clone());
        }
        if let Some(workers) = self.workers {
            config.num_workers = workers.max(1);
        }
    }
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Write results to this file
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Export format: text, markdown, or json
    #[arg(long, default_value = "text")]
    format: ExportFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search a PDF for terms and summarize each matching clause
    Analyze {
        /// Path to the PDF to analyze
        file_path: PathBuf,

        /// Terms to search for, separated by '|' (default: configured terms)
        #[arg(short, long)]
        terms: Option<String>,

        /// Publish clause matches without generating summaries
        #[arg(long)]
        no_summaries: bool,

        /// Also run the whole-document compliance analysis
        #[arg(long)]
        classify: bool,

        /// Owner the uploaded document is stored under
        #[arg(long, default_value = "local")]
        owner: String,

        /// Keep the uploaded copy in the store after analysis
        #[arg(long)]
        keep: bool,

        #[command(flatten)]
        generator: GeneratorArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Classify a PDF against the compliance categories
    Classify {
        /// Path to the PDF to classify
        file_path: PathBuf,

        #[arg(long, default_value = "local")]
        owner: String,

        #[arg(long)]
        keep: bool,

        #[command(flatten)]
        generator: GeneratorArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Manage stored documents
    Store {
        /// Owner whose documents to manage
        #[arg(long, default_value = "local")]
        owner: String,

        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand, Debug)]
enum StoreAction {
    /// Validate and store a PDF under a new random name
    Upload { file_path: PathBuf },
    /// List stored documents
    List,
    /// Print the URL a stored document is fetched from
    Url { name: String },
    /// Delete a stored document
    Remove { name: String },
}

fn parse_provider(s: &str) -> Result<Provider, String> {
    Provider::parse(s)
        .ok_or_else(|| format!("unknown provider '{}' (expected openai or gemini)", s))
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "baascan=info" } else { "baascan=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config_file::resolve_config();
    tracing::debug!(?config, "configuration resolved");
    let color = ColorMode(!cli.no_color && std::io::stdout().is_terminal());

    match cli.command {
        Command::Analyze {
            file_path,
            terms,
            no_summaries,
            classify,
            owner,
            keep,
            generator,
            export,
        } => {
            let options = AnalyzeOptions {
                terms,
                summarize: !no_summaries,
                classify,
                owner,
                keep,
            };
            analyze(&file_path, options, &generator, &export, config, color).await
        }
        Command::Classify {
            file_path,
            owner,
            keep,
            generator,
            export,
        } => classify_only(&file_path, &owner, keep, &generator, &export, config, color).await,
        Command::Store { owner, action } => store(&owner, action, config, color).await,
    }
}

struct AnalyzeOptions {
    terms: Option<String>,
    summarize: bool,
    classify: bool,
    owner: String,
    keep: bool,
}

fn build_pipeline(
    config: &Config,
    client: reqwest::Client,
    needs_generator: bool,
) -> anyhow::Result<Pipeline> {
    let pipeline = Pipeline::new(config, Arc::new(MupdfBackend::new()), client.clone());
    if !needs_generator {
        return Ok(pipeline);
    }
    let generator = build_generator(config, client).with_context(|| {
        format!(
            "Generative backend unavailable. Set {} or pass --no-summaries for a scan-only run",
            config.generator.provider.api_key_env()
        )
    })?;
    Ok(pipeline.with_generator(generator))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Sign-out on Ctrl+C cancels whatever the session still has in flight.
fn cancel_on_ctrl_c(ctx: &SessionContext) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling");
            ctx.sign_out();
        }
    });
}

/// Upload `path` to the store and load it back through its public URL.
async fn open_document(
    pipeline: &Pipeline,
    ctx: &SessionContext,
    session: &AnalysisSession,
    store: &LocalBlobStore,
    path: &Path,
    keep: bool,
    progress: &ProgressDisplay,
) -> anyhow::Result<Document> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let name = pipeline
        .upload(ctx, store, &display_name(path), content_type_for_path(path), &bytes)
        .await?;
    let loaded = pipeline
        .load(ctx, session, store, &name, &progress.callback())
        .await;

    if !keep && let Err(e) = store.remove(ctx.owner_id(), &name).await {
        tracing::warn!(name = %name, error = %e, "failed to remove uploaded copy");
    }
    Ok(loaded?)
}

async fn analyze(
    file_path: &Path,
    options: AnalyzeOptions,
    generator: &GeneratorArgs,
    export: &ExportArgs,
    mut config: Config,
    color: ColorMode,
) -> anyhow::Result<()> {
    generator.apply(&mut config);
    let client = reqwest::Client::new();
    let pipeline = build_pipeline(&config, client, options.summarize || options.classify)?;
    let store = LocalBlobStore::new(&config.storage_root);

    let ctx = SessionContext::sign_in(&options.owner);
    cancel_on_ctrl_c(&ctx);
    let session = AnalysisSession::new();
    let progress = ProgressDisplay::new(std::io::stderr().is_terminal());

    let file_name = display_name(file_path);
    let terms = config.parse_terms(options.terms.as_deref().unwrap_or(""));
    let result = async {
        let document = open_document(
            &pipeline,
            &ctx,
            &session,
            &store,
            file_path,
            options.keep,
            &progress,
        )
        .await?;
        let outcome = pipeline
            .search(
                &ctx,
                &session,
                &document,
                &terms,
                SearchOptions {
                    summarize: options.summarize,
                },
                progress.callback(),
            )
            .await?;
        let report = if options.classify {
            Some(
                pipeline
                    .classify(&ctx, &document, &progress.callback())
                    .await?,
            )
        } else {
            None
        };
        Ok::<_, anyhow::Error>((outcome, report))
    }
    .await;
    progress.finish();
    let (outcome, report) = result?;

    let mut stdout = std::io::stdout().lock();
    output::print_matches(&mut stdout, &file_name, &terms, &outcome.results, color)?;
    if let Some(ref report) = report {
        writeln!(stdout)?;
        output::print_report(&mut stdout, report, color)?;
    }

    if let Some(ref path) = export.export {
        let term_list: Vec<String> = terms.iter().map(str::to_string).collect();
        let doc = ReportDocument {
            filename: &file_name,
            terms: &term_list,
            results: &outcome.results,
            analysis: report.as_ref(),
        };
        export_results(&doc, export.format, path)?;
        output::print_exported(&mut stdout, export.format, path, color)?;
    }
    Ok(())
}

async fn classify_only(
    file_path: &Path,
    owner: &str,
    keep: bool,
    generator: &GeneratorArgs,
    export: &ExportArgs,
    mut config: Config,
    color: ColorMode,
) -> anyhow::Result<()> {
    generator.apply(&mut config);
    let client = reqwest::Client::new();
    let pipeline = build_pipeline(&config, client, true)?;
    let store = LocalBlobStore::new(&config.storage_root);

    let ctx = SessionContext::sign_in(owner);
    cancel_on_ctrl_c(&ctx);
    let session = AnalysisSession::new();
    let progress = ProgressDisplay::new(std::io::stderr().is_terminal());

    let file_name = display_name(file_path);
    let result = async {
        let document = open_document(
            &pipeline,
            &ctx,
            &session,
            &store,
            file_path,
            keep,
            &progress,
        )
        .await?;
        Ok::<_, anyhow::Error>(
            pipeline
                .classify(&ctx, &document, &progress.callback())
                .await?,
        )
    }
    .await;
    progress.finish();
    let report = result?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "Compliance analysis of {}", file_name)?;
    writeln!(stdout)?;
    output::print_report(&mut stdout, &report, color)?;

    if let Some(ref path) = export.export {
        let doc = ReportDocument {
            filename: &file_name,
            terms: &[],
            results: &[],
            analysis: Some(&report),
        };
        export_results(&doc, export.format, path)?;
        output::print_exported(&mut stdout, export.format, path, color)?;
    }
    Ok(())
}

async fn store(
    owner: &str,
    action: StoreAction,
    config: Config,
    color: ColorMode,
) -> anyhow::Result<()> {
    let store = LocalBlobStore::new(&config.storage_root);
    let mut stdout = std::io::stdout().lock();

    match action {
        StoreAction::Upload { file_path } => {
            let pipeline = build_pipeline(&config, reqwest::Client::new(), false)?;
            let ctx = SessionContext::sign_in(owner);
            let bytes = std::fs::read(&file_path)
                .with_context(|| format!("Failed to read {}", file_path.display()))?;
            let name = pipeline
                .upload(
                    &ctx,
                    &store,
                    &display_name(&file_path),
                    content_type_for_path(&file_path),
                    &bytes,
                )
                .await?;
            writeln!(stdout, "{}", name)?;
        }
        StoreAction::List => {
            let files = store.list(owner).await?;
            output::print_stored_files(&mut stdout, owner, &files, color)?;
        }
        StoreAction::Url { name } => {
            writeln!(stdout, "{}", store.public_url(owner, &name)?)?;
        }
        StoreAction::Remove { name } => {
            store.remove(owner, &name).await?;
            writeln!(stdout, "Removed {}", name)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "baascan",
            "analyze",
            "baa.pdf",
            "--terms",
            "breach|audit",
            "--no-summaries",
            "--export",
            "out.md",
            "--format",
            "markdown",
            "--provider",
            "gemini",
        ])
        .unwrap();
        match cli.command {
            Command::Analyze {
                terms,
                no_summaries,
                classify,
                generator,
                export,
                owner,
                ..
            } => {
                assert_eq!(terms.as_deref(), Some("breach|audit"));
                assert!(no_summaries);
                assert!(!classify);
                assert_eq!(generator.provider, Some(Provider::Gemini));
                assert_eq!(export.format, ExportFormat::Markdown);
                assert_eq!(owner, "local");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = Cli::try_parse_from(["baascan", "classify", "baa.pdf", "--provider", "nope"]);
        assert!(err.is_err());
    }

    #[test]
    fn store_subcommands_parse() {
        let cli = Cli::try_parse_from(["baascan", "store", "--owner", "u-1", "url", "123.pdf"])
            .unwrap();
        match cli.command {
            Command::Store {
                owner,
                action: StoreAction::Url { name },
            } => {
                assert_eq!(owner, "u-1");
                assert_eq!(name, "123.pdf");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        let args = GeneratorArgs {
            provider: None,
            endpoint: Some("http://localhost:8080/v1".into()),
            workers: Some(0),
        };
        args.apply(&mut config);
        assert_eq!(config.generator.endpoint(), "http://localhost:8080/v1");
        assert_eq!(config.num_workers, 1);
    }
}
