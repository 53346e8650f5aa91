use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::subtitle_processor::render_placeholder;

// @module: Artifact sink for rendered subtitles and placeholder documents

// @const: Shown while a job is still translating
pub const PROCESSING_MESSAGE: &str = "Translating subtitles. Please wait 1 minute and try again.";

// @const: Shown after a job failed
pub const FAILURE_MESSAGE: &str = "An error occurred while generating your subtitle. We will try again.";

// @const: Shown when no source subtitle exists
pub const NOT_FOUND_MESSAGE: &str = "No subtitles found on OpenSubtitles";

/// Placeholder kinds written before or instead of a translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Processing,
    Failure,
    NotFound,
}

impl Placeholder {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Processing => PROCESSING_MESSAGE,
            Self::Failure => FAILURE_MESSAGE,
            Self::NotFound => NOT_FOUND_MESSAGE,
        }
    }

    /// One-cue SRT document for this placeholder
    pub fn render(&self) -> String {
        render_placeholder(self.message())
    }
}

// @struct: Relative location of an artifact below the store root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactLocator(String);

impl ArtifactLocator {
    pub fn new(path: impl Into<String>) -> Self {
        ArtifactLocator(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sink for rendered subtitles, read by an external delivery layer.
///
/// Methods are blocking: the final write runs inside the store transaction
/// on a blocking thread.
pub trait ArtifactStore: Send + Sync + fmt::Debug {
    /// Replace the document at `locator`; readers see old or new, never a mix
    fn write(&self, locator: &ArtifactLocator, content: &str) -> Result<()>;

    /// Current document at `locator`, if any
    fn read(&self, locator: &ArtifactLocator) -> Result<Option<String>>;

    /// Write a placeholder document
    fn write_placeholder(&self, locator: &ArtifactLocator, placeholder: Placeholder) -> Result<()> {
        self.write(locator, &placeholder.render())
    }
}

// @struct: File system artifact store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    // @field: Directory all locators are relative to
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FsArtifactStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // @returns: Absolute path of a locator
    pub fn resolve(&self, locator: &ArtifactLocator) -> PathBuf {
        self.root.join(locator.as_str())
    }

    fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write(&self, locator: &ArtifactLocator, content: &str) -> Result<()> {
        let path = self.resolve(locator);
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Artifact path has no parent: {:?}", path))?;
        Self::ensure_dir(parent)?;

        // Same directory as the target so the rename stays on one file system
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
        temp.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write artifact: {:?}", path))?;
        temp.persist(&path)
            .with_context(|| format!("Failed to move artifact into place: {:?}", path))?;

        debug!("Wrote artifact {} ({} bytes)", locator, content.len());
        Ok(())
    }

    fn read(&self, locator: &ArtifactLocator) -> Result<Option<String>> {
        let path = self.resolve(locator);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact: {:?}", path))?;
        Ok(Some(content))
    }
}
