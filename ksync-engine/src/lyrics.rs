//! Lyric sheet loading and cleanup
//!
//! Raw lyric text arrives with decoration the sync flow does not want:
//! blank separator lines and bracketed section markers like `[Chorus]`.
//! A `LyricSheet` splits and cleans the text once; the line sequence is
//! immutable after that.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Ordered, index-addressable lyric lines for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricSheet {
    lines: Vec<String>,
}

impl LyricSheet {
    /// Split raw lyric text into displayable lines.
    ///
    /// Trims surrounding whitespace, drops blank lines, and drops lines
    /// that are nothing but a bracketed section marker (`[Verse 1]`,
    /// `{Chorus}`). Parenthesized text is kept; it is usually sung.
    pub fn from_text(raw: &str) -> Self {
        let lines = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !is_section_marker(line))
            .map(str::to_string)
            .collect();
        Self { lines }
    }

    /// Load and clean a lyric file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::Lyrics(format!("failed to read {}: {}", path.display(), e))
        })?;
        let sheet = Self::from_text(&raw);
        debug!("Loaded {} lyric lines from {}", sheet.len(), path.display());
        Ok(sheet)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// A line consisting solely of one bracketed marker, e.g. `[Chorus]`.
fn is_section_marker(line: &str) -> bool {
    let first = line.chars().next();
    let last = line.chars().last();
    matches!(
        (first, last),
        (Some('['), Some(']')) | (Some('{'), Some('}'))
    )
}
