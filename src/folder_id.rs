//! Parsing of Drive folder references given by URL or raw ID.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, SyncError};

static FOLDER_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)")
        .expect("Invalid folder URL regex")
});

static OPEN_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/open\?id=([a-zA-Z0-9_-]+)")
        .expect("Invalid open URL regex")
});

/// Valid Google Drive ID pattern (alphanumeric, underscore, hyphen).
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// Extract a folder ID from a Drive folder URL or validate a raw ID.
///
/// Accepted forms:
/// - `https://drive.google.com/drive/folders/<ID>`
/// - `https://drive.google.com/drive/u/0/folders/<ID>`
/// - `https://drive.google.com/open?id=<ID>`
/// - Raw ID string
///
/// # Examples
///
/// ```
/// use docsync::folder_id::parse_folder_id;
///
/// let id = parse_folder_id("https://drive.google.com/drive/folders/1abc123").unwrap();
/// assert_eq!(id, "1abc123");
///
/// let id = parse_folder_id("1abc123").unwrap();
/// assert_eq!(id, "1abc123");
/// ```
pub fn parse_folder_id(input: &str) -> Result<String> {
    let trimmed = input.trim();

    for regex in [&*FOLDER_URL_REGEX, &*OPEN_URL_REGEX] {
        if let Some(id) = regex.captures(trimmed).and_then(|c| c.get(1)) {
            return Ok(id.as_str().to_string());
        }
    }

    if ID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(SyncError::InvalidFolderId(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_url() {
        let url = "https://drive.google.com/drive/folders/1abc123XYZ";
        assert_eq!(parse_folder_id(url).unwrap(), "1abc123XYZ");
    }

    #[test]
    fn test_folder_url_with_user() {
        let url = "https://drive.google.com/drive/u/2/folders/1abc123XYZ";
        assert_eq!(parse_folder_id(url).unwrap(), "1abc123XYZ");
    }

    #[test]
    fn test_raw_id() {
        assert_eq!(parse_folder_id("abc-123_XYZ").unwrap(), "abc-123_XYZ");
        assert_eq!(parse_folder_id("root").unwrap(), "root");
    }

    #[test]
    fn test_invalid() {
        assert!(parse_folder_id("https://example.com/folder/123").is_err());
        assert!(parse_folder_id("Reports/Q1").is_err());
        assert!(parse_folder_id("").is_err());
        assert!(parse_folder_id("   ").is_err());
    }
}
