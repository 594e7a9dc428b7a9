use std::path::{Path, PathBuf};
use std::{env, fs};

use recon_core::{DocumentContext, EngineConfig, Session};

use crate::document::SqliteDocument;
use crate::error::{Result, StoreError};

pub const CONFIG_FILE: &str = "recon.toml";

/// Default base directory for all recon storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".recon")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Sanitize a document name for use as a filename.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Directory holding the engine config and one database per document.
///
/// Layout:
/// ```text
/// ~/.recon/
/// ├── recon.toml
/// └── documents/
///     ├── <document>.db
///     └── ...
/// ```
#[derive(Clone, Debug)]
pub struct Workspace {
    base: PathBuf,
}

impl Workspace {
    /// Open the workspace, creating directories as needed.
    /// `base_dir`: override the base directory (for testing).
    pub fn open(base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        let documents = base.join("documents");
        fs::create_dir_all(&documents).map_err(|source| StoreError::Io {
            path: documents.clone(),
            source,
        })?;
        Ok(Self { base })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn document_path(&self, name: &str) -> Result<PathBuf> {
        let stem = sanitize_name(name);
        if stem.is_empty() {
            return Err(StoreError::InvalidData(format!(
                "'{name}' is not a usable document name"
            )));
        }
        Ok(self.base.join("documents").join(format!("{stem}.db")))
    }

    pub fn open_document(&self, name: &str) -> Result<SqliteDocument> {
        let path = self.document_path(name)?;
        tracing::debug!(path = %path.display(), "opening document");
        SqliteDocument::open(&path)
    }

    /// Engine config from `recon.toml`. A missing file means defaults.
    pub fn load_config(&self) -> Result<EngineConfig> {
        let path = self.base.join(CONFIG_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(EngineConfig::default());
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        toml::from_str(&content).map_err(|e| StoreError::Config {
            path,
            message: e.to_string(),
        })
    }

    /// Session over the named document with its persisted bindings loaded.
    pub fn open_session(&self, name: &str) -> Result<Session<SqliteDocument>> {
        let config = self.load_config()?;
        let document = self.open_document(name)?;
        let identity = document.load_bindings()?;
        tracing::debug!(bindings = identity.len(), "loaded bindings");
        Ok(Session::with_context(
            DocumentContext::with_identity(document, identity),
            config,
        ))
    }

    /// Persist the session's bindings into its document.
    pub fn save_session(&self, session: &Session<SqliteDocument>) -> Result<()> {
        session.document().save_bindings(session.identity())
    }
}
