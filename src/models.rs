//! Data models for Google Drive API responses and local credential files.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::convert::sanitize_name;
use crate::error::{Result, SyncError};

/// MIME type of a native Google Doc.
pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";

/// MIME type of a Drive folder.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Metadata for a file or folder in Google Drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// A Google Doc found during a scan, tied to the folder it was found in.
///
/// Rebuilt on every scan; only `modified_time` outlives the run, through the
/// state store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub name: String,
    /// File name stem of the exports, `Summary` for `Summary.md`.
    pub export_name: String,
    pub modified_time: DateTime<Utc>,
    /// Drive folder the document lives in; exports are uploaded here.
    pub folder_id: String,
    /// Local directory used when uploading fails.
    pub local_dir: PathBuf,
}

impl Document {
    pub fn from_metadata(
        metadata: FileMetadata,
        folder_id: &str,
        local_dir: PathBuf,
    ) -> Result<Self> {
        let modified_time = metadata
            .modified_time
            .ok_or_else(|| SyncError::MissingModifiedTime(metadata.name.clone()))?;

        Ok(Self {
            id: metadata.id,
            export_name: sanitize_name(&metadata.name),
            name: metadata.name,
            modified_time,
            folder_id: folder_id.to_string(),
            local_dir,
        })
    }
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileMetadata>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth client secrets as downloaded from the Cloud console.
///
/// The console nests the actual values under `installed` (desktop apps) or
/// `web`.
#[derive(Debug, Deserialize)]
pub struct ClientSecretsFile {
    pub installed: Option<ClientSecrets>,
    pub web: Option<ClientSecrets>,
}

impl ClientSecretsFile {
    pub fn into_secrets(self) -> Option<ClientSecrets> {
        self.installed.or(self.web)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: Option<String>,
}

/// Cached user token, in the layout written by Google's client libraries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUserToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_metadata_deserialize() {
        let json = r#"{
            "id": "abc123",
            "name": "Summary",
            "mimeType": "application/vnd.google-apps.document",
            "modifiedTime": "2023-10-26T10:00:00.000Z",
            "parents": ["folder1"]
        }"#;

        let metadata: FileMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.id, "abc123");
        assert_eq!(metadata.name, "Summary");
        assert_eq!(metadata.mime_type.as_deref(), Some(GOOGLE_DOC_MIME));
        assert_eq!(
            metadata.modified_time.unwrap().to_rfc3339(),
            "2023-10-26T10:00:00+00:00"
        );
        assert_eq!(metadata.parents, vec!["folder1".to_string()]);
    }

    #[test]
    fn test_document_requires_modified_time() {
        let metadata = FileMetadata {
            id: "abc123".to_string(),
            name: "Summary".to_string(),
            mime_type: Some(GOOGLE_DOC_MIME.to_string()),
            modified_time: None,
            parents: Vec::new(),
        };

        let err = Document::from_metadata(metadata, "folder1", PathBuf::from("/tmp")).unwrap_err();
        assert!(matches!(err, SyncError::MissingModifiedTime(name) if name == "Summary"));
    }

    #[test]
    fn test_client_secrets_prefers_installed() {
        let json = r#"{"installed": {"client_id": "cid", "client_secret": "secret"}}"#;
        let file: ClientSecretsFile = serde_json::from_str(json).unwrap();
        let secrets = file.into_secrets().unwrap();
        assert_eq!(secrets.client_id, "cid");
        assert_eq!(secrets.token_uri, None);
    }
}
