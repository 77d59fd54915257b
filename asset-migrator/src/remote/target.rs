//! Deterministic mapping from asset filenames to remote object names.

use crate::{MigrationError, Result};
use std::fmt;

/// Characters that would otherwise introduce extra path segments
const PATH_SEPARATORS: [char; 2] = ['/', '\\'];

/// Replacement for every path separator
const SEPARATOR_ESCAPE: char = '_';

/// Image formats the remote accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Heic,
    Jpeg,
    Png,
}

impl ImageFormat {
    const SUFFIXES: [(&'static str, ImageFormat); 3] = [
        (".heic", ImageFormat::Heic),
        (".jpg", ImageFormat::Jpeg),
        (".png", ImageFormat::Png),
    ];

    /// Match the end of a name, case-insensitively. A name that is nothing
    /// but the suffix, such as `.jpg`, still matches.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(*suffix))
            .map(|(_, format)| *format)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Heic => "image/heic",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// Where an asset lives on the remote.
///
/// The remote name is the filename with path separators escaped, so it always
/// forms exactly one path segment under the base endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    filename: String,
    remote_name: String,
    format: ImageFormat,
}

impl UploadTarget {
    /// Derive the target for a filename.
    ///
    /// Fails with `UnsupportedFormat` for empty names and for names that do
    /// not end in `.heic`, `.jpg` or `.png`.
    pub fn for_filename(filename: &str) -> Result<Self> {
        if filename.is_empty() {
            return Err(MigrationError::UnsupportedFormat(
                "empty filename".to_string(),
            ));
        }

        let remote_name = escape_separators(filename);
        let format = ImageFormat::from_name(&remote_name)
            .ok_or_else(|| MigrationError::UnsupportedFormat(filename.to_string()))?;

        Ok(Self {
            filename: filename.to_string(),
            remote_name,
            format,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.remote_name)
    }
}

fn escape_separators(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if PATH_SEPARATORS.contains(&c) {
                SEPARATOR_ESCAPE
            } else {
                c
            }
        })
        .collect()
}
