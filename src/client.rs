//! Google Drive API client.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::convert::ExportFormat;
use crate::error::{Result, SyncError};
use crate::models::{ApiErrorResponse, FileListResponse, FileMetadata, FOLDER_MIME, GOOGLE_DOC_MIME};
use crate::service::DriveService;

/// Base URL for Google Drive API v3.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields requested for every file.
const FILE_FIELDS: &str = "id, name, mimeType, modifiedTime, parents";

/// Client for the Drive API, on My Drive or a single Shared Drive.
pub struct DriveClient {
    drive_id: Option<String>,
    auth: Authenticator,
    http: Client,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Create a new DriveClient.
    ///
    /// # Arguments
    /// * `auth` - Authenticator for obtaining access tokens
    /// * `drive_id` - Shared Drive to search; `None` searches the user's drives
    pub fn new(auth: Authenticator, drive_id: Option<String>) -> Self {
        Self {
            drive_id,
            auth,
            http: Client::new(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
        }
    }

    /// Point the client at different API endpoints, e.g. a mock server.
    pub fn with_base_urls(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    /// Folder ID that root-relative paths start from.
    fn root_id(&self) -> &str {
        self.drive_id.as_deref().unwrap_or("root")
    }

    /// Query files using Google Drive query syntax, following every page.
    pub async fn query_files(&self, query: &str) -> Result<Vec<FileMetadata>> {
        let token = self.auth.get_access_token().await?;
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/files", self.api_base))
                .bearer_auth(&token)
                .query(&[
                    ("q", query),
                    ("includeItemsFromAllDrives", "true"),
                    ("supportsAllDrives", "true"),
                    ("spaces", "drive"),
                    ("fields", fields.as_str()),
                ]);

            if let Some(ref drive_id) = self.drive_id {
                request = request.query(&[("driveId", drive_id.as_str()), ("corpora", "drive")]);
            }

            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = check_status(request.send().await?).await?;
            let list_response: FileListResponse = response.json().await?;
            all_files.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// List non-trashed children of a folder with the given MIME type.
    pub async fn list_children(&self, parent_id: &str, mime_type: &str) -> Result<Vec<FileMetadata>> {
        let query = format!(
            "'{}' in parents and mimeType = '{}' and trashed = false",
            escape_query(parent_id),
            mime_type
        );
        self.query_files(&query).await
    }

    /// Find a folder by name directly inside `parent_id`.
    ///
    /// When several folders share the name, the first one returned wins.
    pub async fn find_folder(&self, name: &str, parent_id: &str) -> Result<Option<FileMetadata>> {
        let query = format!(
            "name = '{}' and '{}' in parents and mimeType = '{}' and trashed = false",
            escape_query(name),
            escape_query(parent_id),
            FOLDER_MIME
        );
        let folders = self.query_files(&query).await?;
        if folders.len() > 1 {
            warn!(
                name,
                count = folders.len(),
                "multiple folders share this name, using {}",
                folders[0].id
            );
        }
        Ok(folders.into_iter().next())
    }

    /// Find a file by name and MIME type in a folder.
    ///
    /// Other files that merely share the name are ignored.
    pub async fn find_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
    ) -> Result<Option<FileMetadata>> {
        let query = format!(
            "name = '{}' and '{}' in parents and mimeType = '{}' and trashed = false",
            escape_query(name),
            escape_query(parent_id),
            escape_query(mime_type)
        );
        let files = self.query_files(&query).await?;
        Ok(files.into_iter().last())
    }

    /// Walk a slash-delimited path from the drive root down to a folder ID.
    pub async fn resolve_path(&self, path: &str) -> Result<String> {
        let mut parent_id = self.root_id().to_string();

        for part in path.split('/').filter(|p| !p.is_empty()) {
            let folder = self.find_folder(part, &parent_id).await?.ok_or_else(|| {
                SyncError::FolderNotFound(format!("'{}' in path '{}'", part, path))
            })?;
            debug!(part, id = %folder.id, "resolved path segment");
            parent_id = folder.id;
        }

        Ok(parent_id)
    }

    /// Export a Google Workspace file to `mime_type`.
    pub async fn export_file(&self, file_id: &str, mime_type: &str) -> Result<Vec<u8>> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .get(format!("{}/files/{}/export", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("mimeType", mime_type)])
            .send()
            .await?;

        let response = check_status(response).await?;

        let mut content = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            content.extend_from_slice(&chunk?);
        }

        Ok(content)
    }

    /// Upload bytes as a file in a folder.
    ///
    /// An existing export with the same name and type is updated in place,
    /// keeping its ID and revision history. Otherwise a new file is created.
    pub async fn upload_file(
        &self,
        parent_id: &str,
        filename: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<FileMetadata> {
        let existing = self.find_file(filename, parent_id, mime_type).await?;
        let token = self.auth.get_access_token().await?;

        // files.update rejects `parents`; the file already sits in the folder.
        let metadata = match existing {
            Some(_) => serde_json::json!({ "name": filename }),
            None => serde_json::json!({
                "name": filename,
                "parents": [parent_id]
            }),
        };

        let metadata_part = Part::text(metadata.to_string()).mime_str("application/json")?;

        let file_part = Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str(mime_type)?;

        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        let request = match existing {
            Some(file) => {
                debug!(filename, id = %file.id, "updating existing file");
                self.http
                    .patch(format!("{}/files/{}", self.upload_base, file.id))
            }
            None => self.http.post(format!("{}/files", self.upload_base)),
        };

        let response = request
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .multipart(form)
            .send()
            .await?;

        let metadata: FileMetadata = check_status(response).await?.json().await?;
        Ok(metadata)
    }
}

#[async_trait]
impl DriveService for DriveClient {
    async fn resolve_folder(&self, path: &str) -> Result<String> {
        self.resolve_path(path).await
    }

    async fn list_documents(&self, folder_id: &str) -> Result<Vec<FileMetadata>> {
        self.list_children(folder_id, GOOGLE_DOC_MIME).await
    }

    async fn list_subfolders(&self, folder_id: &str) -> Result<Vec<FileMetadata>> {
        self.list_children(folder_id, FOLDER_MIME).await
    }

    async fn export(&self, file_id: &str, format: ExportFormat) -> Result<Vec<u8>> {
        self.export_file(file_id, format.mime_type()).await
    }

    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        format: ExportFormat,
        content: Vec<u8>,
    ) -> Result<FileMetadata> {
        self.upload_file(folder_id, name, format.mime_type(), content)
            .await
    }
}

/// Pass successful responses through; turn the rest into `ApiError`.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    Err(api_error(status.as_u16(), error_body))
}

/// Build an `ApiError`, preferring the message from Google's error body.
fn api_error(status: u16, body: String) -> SyncError {
    match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(parsed) => SyncError::ApiError {
            status: parsed.error.code,
            message: parsed.error.message,
        },
        Err(_) => SyncError::ApiError {
            status,
            message: body,
        },
    }
}

/// Escape a value for use inside a single-quoted Drive query string.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
