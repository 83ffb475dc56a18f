use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MediaError {
    #[error("media location cannot be empty")]
    Empty,

    #[error("media URL is invalid: {0}")]
    InvalidUrl(String),
}

/// Where an illustration attached to a question lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum MediaUri {
    FilePath(PathBuf),
    Url(Url),
}

impl MediaUri {
    /// # Errors
    ///
    /// Returns `MediaError::Empty` for an empty path.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, MediaError> {
        let p = path.into();
        if p.as_os_str().is_empty() {
            return Err(MediaError::Empty);
        }
        Ok(MediaUri::FilePath(p))
    }

    /// # Errors
    ///
    /// Returns `MediaError` if the string is blank or not a valid URL.
    pub fn from_url(url: impl AsRef<str>) -> Result<Self, MediaError> {
        let s = url.as_ref().trim();
        if s.is_empty() {
            return Err(MediaError::Empty);
        }
        let u = Url::parse(s).map_err(|e| MediaError::InvalidUrl(e.to_string()))?;
        Ok(MediaUri::Url(u))
    }

    /// Parse either an absolute URL or a file path.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Empty` for blank input.
    pub fn parse(raw: &str) -> Result<Self, MediaError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(MediaError::Empty);
        }
        match Url::parse(s) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(MediaUri::Url(u)),
            _ => Self::from_file(s),
        }
    }

    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            MediaUri::FilePath(p) => Some(p.as_path()),
            MediaUri::Url(_) => None,
        }
    }

    #[must_use]
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            MediaUri::Url(u) => Some(u),
            MediaUri::FilePath(_) => None,
        }
    }
}

/// Optional media shown alongside a question prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionMedia {
    pub uri: MediaUri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

impl QuestionMedia {
    #[must_use]
    pub fn new(uri: MediaUri, alt_text: Option<String>) -> Self {
        let alt_text = alt_text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self { uri, alt_text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distinguishes_urls_from_paths() {
        let url = MediaUri::parse("https://example.org/map.png").unwrap();
        assert!(url.as_url().is_some());

        let path = MediaUri::parse("assets/bastille.jpg").unwrap();
        assert_eq!(path.as_path(), Some(Path::new("assets/bastille.jpg")));
    }

    #[test]
    fn blank_media_is_rejected() {
        assert_eq!(MediaUri::parse("   ").unwrap_err(), MediaError::Empty);
        assert_eq!(MediaUri::from_file("").unwrap_err(), MediaError::Empty);
    }

    #[test]
    fn blank_alt_text_is_dropped() {
        let media = QuestionMedia::new(MediaUri::from_file("a.png").unwrap(), Some("  ".into()));
        assert!(media.alt_text.is_none());
    }
}
