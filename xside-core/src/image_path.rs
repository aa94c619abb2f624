//! Relative storage paths for image assets.

use std::fmt;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative POSIX path identifying an image.
///
/// The same string is used as the blob-store key and as the path of the
/// cached copy below the media root, so it must never escape that root.
///
/// # Examples
///
/// ```
/// use xside_core::ImagePath;
///
/// let path = ImagePath::new("images/Client1/TestItem1/banner.jpg")?;
/// assert_eq!(path.file_name(), Some("banner.jpg"));
/// assert!(ImagePath::new("../etc/passwd").is_err());
/// # Ok::<(), xside_core::ImagePathError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImagePath(String);

/// Reasons an image path is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImagePathError {
    /// The path was empty.
    #[error("image path is empty")]
    Empty,
    /// The path started at the filesystem root.
    #[error("image path {path:?} must be relative")]
    Absolute {
        /// Rejected path.
        path: String,
    },
    /// The path contained an empty, `.` or `..` segment, or a backslash.
    #[error("image path {path:?} contains invalid segment {segment:?}")]
    InvalidSegment {
        /// Rejected path.
        path: String,
        /// Offending segment.
        segment: String,
    },
}

impl ImagePath {
    /// Validate and wrap a relative image path.
    pub fn new(raw: impl Into<String>) -> Result<Self, ImagePathError> {
        let path = raw.into();
        if path.is_empty() {
            return Err(ImagePathError::Empty);
        }
        if path.starts_with('/') {
            return Err(ImagePathError::Absolute { path });
        }
        let invalid = path
            .split('/')
            .find(|segment| is_invalid_segment(segment))
            .map(str::to_owned);
        if let Some(segment) = invalid {
            return Err(ImagePathError::InvalidSegment { path, segment });
        }
        Ok(Self(path))
    }

    /// Borrow the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Borrow the path as a UTF-8 filesystem path.
    #[must_use]
    pub fn as_utf8_path(&self) -> &Utf8Path {
        Utf8Path::new(&self.0)
    }

    /// Final segment of the path.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.0.rsplit('/').next()
    }
}

fn is_invalid_segment(segment: &str) -> bool {
    matches!(segment, "" | "." | "..") || segment.contains('\\')
}

impl TryFrom<String> for ImagePath {
    type Error = ImagePathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ImagePath {
    type Error = ImagePathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImagePath> for String {
    fn from(value: ImagePath) -> Self {
        value.0
    }
}

impl AsRef<str> for ImagePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("banner.jpg")]
    #[case("images/Client1/Test 6/whatsapp.png")]
    #[case("a/b/c/d.webp")]
    fn accepts_relative_paths(#[case] raw: &str) {
        let path = ImagePath::new(raw).expect("valid path");
        assert_eq!(path.as_str(), raw);
    }

    #[rstest]
    fn rejects_empty() {
        assert_eq!(ImagePath::new(""), Err(ImagePathError::Empty));
    }

    #[rstest]
    fn rejects_absolute() {
        assert!(matches!(
            ImagePath::new("/images/a.png"),
            Err(ImagePathError::Absolute { .. })
        ));
    }

    #[rstest]
    #[case("images/../secret.png", "..")]
    #[case("./images/a.png", ".")]
    #[case("images//a.png", "")]
    #[case("images/", "")]
    #[case("images\\a.png", "images\\a.png")]
    fn rejects_invalid_segments(#[case] raw: &str, #[case] segment: &str) {
        match ImagePath::new(raw) {
            Err(ImagePathError::InvalidSegment { segment: found, .. }) => {
                assert_eq!(found, segment);
            }
            other => panic!("expected invalid segment, got {other:?}"),
        }
    }

    #[rstest]
    fn deserialisation_validates() {
        let ok: Result<Vec<ImagePath>, _> = serde_json::from_str(r#"["a/b.png", "c.png"]"#);
        assert_eq!(ok.map(|paths| paths.len()).ok(), Some(2));
        let err: Result<Vec<ImagePath>, _> = serde_json::from_str(r#"["../b.png"]"#);
        assert!(err.is_err());
    }

    #[rstest]
    fn exposes_file_name() {
        let path = ImagePath::new("images/x/banner.jpg").expect("valid");
        assert_eq!(path.file_name(), Some("banner.jpg"));
        assert_eq!(path.as_utf8_path().parent().map(Utf8Path::as_str), Some("images/x"));
    }
}
