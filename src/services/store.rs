//! File-based portfolio persistence.
//!
//! One JSON document per strategy under the data directory. Saves go through
//! a temporary file and a rename so a crash mid-write leaves the previous
//! checkpoint intact.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::types::Portfolio;

/// Default data directory
pub const DATA_DIR: &str = ".paperstrike";

const EXTENSION: &str = "json";

/// Durable store for strategy portfolios.
#[derive(Debug, Clone)]
pub struct PortfolioStore {
    dir: PathBuf,
}

impl PortfolioStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a strategy.
    fn path_for(&self, strategy: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(strategy), EXTENSION))
    }

    /// Write a portfolio, replacing any previous checkpoint atomically.
    pub fn save(&self, portfolio: &Portfolio) -> Result<(), EngineError> {
        let path = self.path_for(portfolio.strategy());
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));

        let content = serde_json::to_string_pretty(portfolio)?;
        fs::write(&tmp, content)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!("Saved portfolio {} to {:?}", portfolio.strategy(), path);
        Ok(())
    }

    /// Load one strategy's portfolio, `None` if it was never saved.
    pub fn load(&self, strategy: &str) -> Result<Option<Portfolio>, EngineError> {
        let path = self.path_for(strategy);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Load every saved portfolio, ordered by strategy.
    ///
    /// A corrupt file is an error; leftover temporary files are ignored.
    pub fn load_all(&self) -> Result<Vec<Portfolio>, EngineError> {
        let mut portfolios = Vec::new();

        for entry in fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
                    warn!("Ignoring incomplete checkpoint {:?}", path);
                }
                continue;
            }

            let content = fs::read_to_string(&path)?;
            let portfolio: Portfolio = serde_json::from_str(&content).map_err(|e| {
                EngineError::Persistence(format!("failed to parse {:?}: {}", path, e))
            })?;
            portfolios.push(portfolio);
        }

        portfolios.sort_by(|a, b| a.strategy().cmp(b.strategy()));
        Ok(portfolios)
    }

    /// Delete a strategy's checkpoint.
    pub fn remove(&self, strategy: &str) -> Result<(), EngineError> {
        let path = self.path_for(strategy);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Filesystem-safe stem for a strategy name. Bytes outside `[A-Za-z0-9_-]`
/// become `%XX`, so distinct names never share a file.
fn file_stem(strategy: &str) -> String {
    let mut stem = String::with_capacity(strategy.len());
    for byte in strategy.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}
