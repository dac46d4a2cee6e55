use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::{AppConfig, DEFAULT_CONFIG_FILENAME, DEFAULT_DB_PATH, load_config};

pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub home_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        let home_dir = env::var_os("HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Ok(Self { cwd, home_dir })
    }
}

/// Effective settings for one invocation.
#[derive(Debug, Clone)]
pub struct ResolvedRuntime {
    pub db_path: PathBuf,
    pub db_source: ValueSource,
    pub config_path: PathBuf,
    pub config_source: ValueSource,
    pub config: AppConfig,
    pub github_token: Option<String>,
}

impl ResolvedRuntime {
    pub fn diagnostics(&self) -> String {
        let repo = self
            .config
            .repo_target()
            .map(|target| target.slug())
            .unwrap_or_else(|error| format!("<invalid: {error}>"));
        format!(
            "db_path={} ({})\nconfig_path={} ({})\nforum_url={}\nforum_id={}\npage_offsets={:?}\nrepo={}\nlabels={}\ngithub_token={}",
            normalize_for_display(&self.db_path),
            self.db_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            self.config.forum_url(),
            self.config.forum_id(),
            self.config.page_offsets(),
            repo,
            self.config.labels().join(","),
            if self.github_token.is_some() {
                "set"
            } else {
                "missing"
            }
        )
    }

    pub fn require_github_token(&self) -> Result<&str> {
        match self.github_token.as_deref() {
            Some(token) => Ok(token),
            None => bail!("{TOKEN_ENV} is not set; export it or add it to .env"),
        }
    }
}

pub fn resolve_runtime(
    context: &ResolutionContext,
    overrides: &RuntimeOverrides,
) -> Result<ResolvedRuntime> {
    resolve_runtime_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_runtime_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &RuntimeOverrides,
    lookup_env: F,
) -> Result<ResolvedRuntime>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| {
        lookup_env(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(context, path), ValueSource::Flag)
    } else if let Some(value) = lookup("SNEG2GITHUB_CONFIG") {
        (absolutize(context, Path::new(&value)), ValueSource::Env)
    } else {
        (
            context.cwd.join(DEFAULT_CONFIG_FILENAME),
            ValueSource::Default,
        )
    };
    if config_source != ValueSource::Default && !config_path.exists() {
        bail!("config file not found: {}", normalize_for_display(&config_path));
    }
    let config = load_config(&config_path)?;

    let (db_path, db_source) = if let Some(path) = overrides.db.as_deref() {
        (absolutize(context, path), ValueSource::Flag)
    } else if let Some(value) = lookup("SNEG2GITHUB_DB") {
        (absolutize(context, Path::new(&value)), ValueSource::Env)
    } else if let Some(value) = config.db_path.as_deref() {
        (absolutize(context, Path::new(value)), ValueSource::Config)
    } else {
        (
            absolutize(context, Path::new(DEFAULT_DB_PATH)),
            ValueSource::Default,
        )
    };

    Ok(ResolvedRuntime {
        db_path,
        db_source,
        config_path,
        config_source,
        config,
        github_token: lookup(TOKEN_ENV),
    })
}

/// Expand a leading `~` against the home directory, then anchor relative paths at cwd.
fn absolutize(context: &ResolutionContext, path: &Path) -> PathBuf {
    let expanded = match (path.strip_prefix("~"), context.home_dir.as_deref()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        context.cwd.join(expanded)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
