//! Shared context for running CLI commands.

use std::{
    env,
    path::{Path, PathBuf},
    process::ExitCode,
};

use fdx_config::{Config, IndexingSettings};
use fdx_index::{EntryScanner, IndexRoot, Registry};

/// Command execution context built once per CLI invocation.
pub struct CommandContext {
    /// Current working directory.
    pub cwd: PathBuf,
    /// Configuration discovered from the working directory.
    pub config: Config,
    /// Catalog of indexed roots.
    pub registry: Registry,
}

impl CommandContext {
    /// Loads the current directory, configuration and registry.
    pub fn load() -> Result<Self, ExitCode> {
        let cwd = current_dir_or_failure()?;
        let config = load_config_or_failure(&cwd)?;
        let registry = Registry::open_default().map_err(|e| {
            eprintln!("error: failed to open registry: {e}");
            ExitCode::FAILURE
        })?;
        Ok(Self {
            cwd,
            config,
            registry,
        })
    }

    /// Makes a path absolute against the working directory.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Resolves a directory argument to a canonical root.
    pub fn resolve_root(&self, dir: &Path) -> Result<PathBuf, ExitCode> {
        EntryScanner::resolve_root(&self.absolute(dir)).map_err(|e| {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        })
    }

    /// Returns the configuration that applies inside `root`.
    ///
    /// Files are discovered from the root itself, so a tree indexed from
    /// elsewhere still picks up its own `.fdx.toml`.
    pub fn config_for(&self, root: &Path) -> Result<Config, ExitCode> {
        if root == self.cwd {
            return Ok(self.config.clone());
        }
        load_config_or_failure(root)
    }

    /// Returns the indexing settings a registered root should be built with now.
    ///
    /// Content indexing is chosen per root at index time and carried forward.
    pub fn effective_settings(&self, root: &IndexRoot) -> Result<IndexingSettings, ExitCode> {
        let mut settings = self.config_for(&root.root_path)?.indexing;
        settings.content = root.settings.content;
        Ok(settings)
    }

    /// Finds the registered roots a search runs against.
    ///
    /// An explicit root must be registered. Otherwise the innermost root
    /// containing the working directory is used, and every registered root when
    /// none contains it or `all` is set.
    pub fn search_roots(
        &self,
        explicit: Option<&Path>,
        all: bool,
    ) -> Result<Vec<IndexRoot>, ExitCode> {
        if let Some(dir) = explicit {
            let root = self.resolve_root(dir)?;
            return match self.registry.get(&root) {
                Some(indexed) => Ok(vec![indexed]),
                None => {
                    eprintln!("error: {} is not indexed", root.display());
                    eprintln!("Run 'fdx index {}' first.", root.display());
                    Err(ExitCode::FAILURE)
                }
            };
        }

        if !all {
            let cwd = self.cwd.canonicalize().unwrap_or_else(|_| self.cwd.clone());
            if let Some(root) = self.registry.lookup_containing(&cwd) {
                return Ok(vec![root]);
            }
        }

        let roots = self.registry.list();
        if roots.is_empty() {
            eprintln!("error: nothing is indexed yet");
            eprintln!("Run 'fdx index <dir>' first.");
            return Err(ExitCode::FAILURE);
        }
        Ok(roots)
    }
}

/// Returns the current working directory or exits with a consistent error.
fn current_dir_or_failure() -> Result<PathBuf, ExitCode> {
    env::current_dir().map_err(|e| {
        eprintln!("error: could not determine current directory: {e}");
        ExitCode::FAILURE
    })
}

/// Loads configuration from the provided directory or exits with an error.
fn load_config_or_failure(cwd: &Path) -> Result<Config, ExitCode> {
    Config::load(cwd).map_err(|e| {
        eprintln!("error: failed to load configuration: {e}");
        ExitCode::FAILURE
    })
}
