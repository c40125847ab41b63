use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::llm::Provider;
use crate::scanner::BoundaryPolicy;
use crate::terms::TermSet;
use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub generator: Option<GeneratorSection>,
    pub scan: Option<ScanSection>,
    pub concurrency: Option<ConcurrencySection>,
    pub storage: Option<StorageSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorSection {
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub summary_model: Option<String>,
    pub classify_model: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSection {
    pub default_terms: Option<Vec<String>>,
    pub term_delimiter: Option<String>,
    pub clause_delimiter: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencySection {
    pub num_workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    pub root: Option<String>,
    pub max_upload_mb: Option<u64>,
}

/// Platform config directory path: `<config_dir>/baascan/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("baascan").join("config.toml"))
}

/// Load config by cascading CWD `.baascan.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".baascan.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), "loaded config file");
            Some(config)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Field-level overlay: `overlay` wins when it has a value.
fn pick<S, T>(base: &Option<S>, overlay: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bg, og) = (&base.generator, &overlay.generator);
    let (bs, os) = (&base.scan, &overlay.scan);
    let (bc, oc) = (&base.concurrency, &overlay.concurrency);
    let (bst, ost) = (&base.storage, &overlay.storage);

    ConfigFile {
        generator: Some(GeneratorSection {
            provider: pick(bg, og, |g| g.provider.clone()),
            endpoint: pick(bg, og, |g| g.endpoint.clone()),
            api_key: pick(bg, og, |g| g.api_key.clone()),
            summary_model: pick(bg, og, |g| g.summary_model.clone()),
            classify_model: pick(bg, og, |g| g.classify_model.clone()),
            temperature: pick(bg, og, |g| g.temperature),
        }),
        scan: Some(ScanSection {
            default_terms: pick(bs, os, |s| s.default_terms.clone()),
            term_delimiter: pick(bs, os, |s| s.term_delimiter.clone()),
            clause_delimiter: pick(bs, os, |s| s.clause_delimiter.clone()),
        }),
        concurrency: Some(ConcurrencySection {
            num_workers: pick(bc, oc, |c| c.num_workers),
            timeout_secs: pick(bc, oc, |c| c.timeout_secs),
            requests_per_minute: pick(bc, oc, |c| c.requests_per_minute),
        }),
        storage: Some(StorageSection {
            root: pick(bst, ost, |s| s.root.clone()),
            max_upload_mb: pick(bst, ost, |s| s.max_upload_mb),
        }),
    }
}

/// A delimiter setting must be exactly one character.
fn single_char(key: &str, value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => {
            tracing::warn!(key, value, "delimiter must be a single character, ignoring");
            None
        }
    }
}

/// Apply file values on top of `config`.
pub fn apply_file(config: &mut Config, file: &ConfigFile) {
    if let Some(g) = &file.generator {
        if let Some(provider) = &g.provider {
            match Provider::parse(provider) {
                Some(p) => config.generator.provider = p,
                None => {
                    tracing::warn!(provider = %provider, "unknown provider in config, ignoring")
                }
            }
        }
        if g.endpoint.is_some() {
            config.generator.endpoint = g.endpoint.clone();
        }
        if g.api_key.is_some() {
            config.generator.api_key = g.api_key.clone();
        }
        if g.summary_model.is_some() {
            config.generator.summary_model = g.summary_model.clone();
        }
        if g.classify_model.is_some() {
            config.generator.classify_model = g.classify_model.clone();
        }
        if g.temperature.is_some() {
            config.generator.temperature = g.temperature;
        }
    }

    if let Some(s) = &file.scan {
        if let Some(c) = s
            .term_delimiter
            .as_deref()
            .and_then(|v| single_char("term_delimiter", v))
        {
            config.term_delimiter = c;
        }
        if let Some(c) = s
            .clause_delimiter
            .as_deref()
            .and_then(|v| single_char("clause_delimiter", v))
        {
            config.boundary = BoundaryPolicy { delimiter: c };
        }
        if let Some(terms) = &s.default_terms {
            let terms = TermSet::from_terms(terms.iter().map(String::as_str));
            if !terms.is_empty() {
                config.default_terms = terms;
            }
        }
    }

    if let Some(c) = &file.concurrency {
        if let Some(n) = c.num_workers {
            config.num_workers = n.max(1);
        }
        if let Some(t) = c.timeout_secs {
            config.timeout_secs = t;
        }
        if let Some(r) = c.requests_per_minute {
            config.requests_per_minute = r.max(1);
        }
    }

    if let Some(s) = &file.storage {
        if let Some(root) = &s.root {
            config.storage_root = PathBuf::from(root);
        }
        if let Some(mb) = s.max_upload_mb {
            config.max_upload_bytes = mb.saturating_mul(1024 * 1024);
        }
    }
}

/// Apply environment overrides on top of `config`.
///
/// `lookup` is `std::env::var` in production; tests pass a map.
pub fn apply_env(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(provider) = lookup("BAASCAN_PROVIDER") {
        match Provider::parse(&provider) {
            Some(p) => config.generator.provider = p,
            None => tracing::warn!(provider = %provider, "unknown BAASCAN_PROVIDER, ignoring"),
        }
    }
    if let Some(endpoint) = lookup("BAASCAN_ENDPOINT") {
        config.generator.endpoint = Some(endpoint);
    }
    // The key variable depends on the provider chosen above.
    if let Some(key) = lookup(config.generator.provider.api_key_env()) {
        config.generator.api_key = Some(key);
    }
    if let Some(root) = lookup("BAASCAN_STORAGE_ROOT") {
        config.storage_root = PathBuf::from(root);
    }
}

/// Defaults, then the config file cascade, then the process environment.
pub fn resolve_config() -> Config {
    let mut config = Config::default();
    apply_file(&mut config, &load_config());
    apply_env(&mut config, |k| std::env::var(k).ok());
    config
}
