//! Export of Google Docs to Markdown and PDF artifacts.

use tracing::debug;

use crate::error::Result;
use crate::models::Document;
use crate::service::DriveService;

/// Formats every changed document is exported to, in export order.
pub const EXPORT_FORMATS: [ExportFormat; 2] = [ExportFormat::Markdown, ExportFormat::Pdf];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Markdown,
    Pdf,
}

impl ExportFormat {
    /// MIME type passed to the Drive export endpoint.
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown",
            ExportFormat::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Pdf => "pdf",
        }
    }

    /// Output file name for a sanitized stem, e.g. `Summary.md`.
    pub fn file_name(self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Markdown => write!(f, "markdown"),
            ExportFormat::Pdf => write!(f, "pdf"),
        }
    }
}

/// An exported document, ready to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub format: ExportFormat,
    pub content: Vec<u8>,
}

/// Make a Drive title safe to use as a local file or directory name.
///
/// Keeps letters, digits, spaces, `-` and `_`, then trims surrounding spaces.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let trimmed = cleaned.trim();

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Export a document to every format in [`EXPORT_FORMATS`].
///
/// Stops at the first failed export; the caller skips the document.
pub async fn convert<S: DriveService + ?Sized>(
    service: &S,
    document: &Document,
) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::with_capacity(EXPORT_FORMATS.len());

    for format in EXPORT_FORMATS {
        let content = service.export(&document.id, format).await?;
        debug!(
            document = %document.name,
            %format,
            bytes = content.len(),
            "exported document"
        );
        artifacts.push(Artifact {
            file_name: format.file_name(&document.export_name),
            format,
            content,
        });
    }

    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Summary"), "Summary");
        assert_eq!(sanitize_name("Q1 / Q2: plan?"), "Q1  Q2 plan");
        assert_eq!(sanitize_name("  notes_v2-final  "), "notes_v2-final");
        assert_eq!(sanitize_name("Résumé"), "Résumé");
    }

    #[test]
    fn test_sanitize_name_empty() {
        assert_eq!(sanitize_name("???"), "untitled");
        assert_eq!(sanitize_name(""), "untitled");
    }

    #[test]
    fn test_file_names() {
        assert_eq!(ExportFormat::Markdown.file_name("Summary"), "Summary.md");
        assert_eq!(ExportFormat::Pdf.file_name(&sanitize_name("a/b")), "ab.pdf");
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(ExportFormat::Markdown.mime_type(), "text/markdown");
        assert_eq!(ExportFormat::Pdf.mime_type(), "application/pdf");
    }
}
