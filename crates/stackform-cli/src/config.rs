//! App file loader
//!
//! Loads `stackform.yaml` and applies folding overrides.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use stackform_core::authoring::{compile_app, parse_app_yaml};
use stackform_core::App;

pub const DEFAULT_APP_FILE: &str = "stackform.yaml";
pub const APP_FILE_ENV: &str = "STACKFORM_APP";
pub const FOLD_ENV: &str = "STACKFORM_FOLD";

pub struct ConfigLoader {
    app_file: PathBuf,
    fold_override: Option<bool>,
}

impl ConfigLoader {
    pub fn new(app_file: impl Into<PathBuf>) -> Self {
        Self {
            app_file: app_file.into(),
            fold_override: None,
        }
    }

    /// Create loader from command line flags and the environment
    ///
    /// App file resolution order:
    /// 1. `--file`
    /// 2. STACKFORM_APP environment variable
    /// 3. `./stackform.yaml`
    ///
    /// Folding: `--no-fold` wins over STACKFORM_FOLD, which wins over
    /// `settings.fold` in the file.
    pub fn from_env(file: Option<PathBuf>, no_fold: bool) -> Result<Self> {
        Self::from_sources(
            file,
            std::env::var(APP_FILE_ENV).ok(),
            std::env::var(FOLD_ENV).ok(),
            no_fold,
        )
    }

    fn from_sources(
        file: Option<PathBuf>,
        env_file: Option<String>,
        env_fold: Option<String>,
        no_fold: bool,
    ) -> Result<Self> {
        let app_file = file
            .or_else(|| env_file.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_APP_FILE));

        let fold_override = if no_fold {
            Some(false)
        } else {
            env_fold
                .as_deref()
                .map(parse_flag)
                .transpose()
                .with_context(|| format!("Invalid {}", FOLD_ENV))?
        };

        Ok(Self {
            app_file,
            fold_override,
        })
    }

    pub fn app_file(&self) -> &Path {
        &self.app_file
    }

    pub fn fold_override(&self) -> Option<bool> {
        self.fold_override
    }

    /// Read, parse and compile the app file
    pub fn load(&self) -> Result<App> {
        let path = &self.app_file;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut dto = parse_app_yaml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if let Some(fold) = self.fold_override {
            dto.settings.fold = fold;
        }

        info!(
            file = %path.display(),
            stacks = dto.stacks.len(),
            fold = dto.settings.fold,
            "loaded app"
        );
        compile_app(&dto).with_context(|| format!("Failed to compile {}", path.display()))
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("expected true or false, found '{}'", other),
    }
}
