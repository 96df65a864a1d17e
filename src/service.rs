//! The Drive operations the sync pipeline depends on.

use async_trait::async_trait;

use crate::convert::ExportFormat;
use crate::error::Result;
use crate::models::FileMetadata;

/// An authenticated Drive backend.
///
/// [`crate::DriveClient`] talks to the real API; tests provide in-memory
/// implementations.
#[async_trait]
pub trait DriveService: Send + Sync {
    /// Resolve a slash-delimited folder path, starting at the root of the drive,
    /// to a folder ID.
    async fn resolve_folder(&self, path: &str) -> Result<String>;

    /// List Google Docs directly inside a folder.
    async fn list_documents(&self, folder_id: &str) -> Result<Vec<FileMetadata>>;

    /// List folders directly inside a folder.
    async fn list_subfolders(&self, folder_id: &str) -> Result<Vec<FileMetadata>>;

    /// Export a Google Doc in the given format.
    async fn export(&self, file_id: &str, format: ExportFormat) -> Result<Vec<u8>>;

    /// Upload `content` as `name` into a folder, replacing a file of the same name.
    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        format: ExportFormat,
        content: Vec<u8>,
    ) -> Result<FileMetadata>;
}
