//! Upload of artifacts, with a local fallback when the upload fails.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::convert::{Artifact, ExportFormat};
use crate::error::Result;
use crate::service::DriveService;

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Uploaded {
        file_id: String,
    },
    WrittenLocally {
        path: PathBuf,
        /// The previous file, renamed with a `.bak` suffix.
        backup: Option<PathBuf>,
    },
}

/// What writing an artifact locally would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPlan {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
}

/// Only Markdown output is backed up before being replaced. PDFs are
/// overwritten in place.
pub fn keeps_backup(format: ExportFormat) -> bool {
    format == ExportFormat::Markdown
}

/// `<path>.bak`, keeping the original extension.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Describe the local fallback write for an artifact without touching disk.
pub fn plan_fallback(local_dir: &Path, file_name: &str, format: ExportFormat) -> FallbackPlan {
    let path = local_dir.join(file_name);
    let backup = (keeps_backup(format) && path.exists()).then(|| backup_path(&path));
    FallbackPlan { path, backup }
}

/// Write an artifact into `local_dir`, backing up an existing Markdown file.
///
/// An existing `.bak` is replaced; only one generation is kept.
pub fn write_fallback(local_dir: &Path, artifact: &Artifact) -> Result<FallbackPlan> {
    fs::create_dir_all(local_dir)?;

    let plan = plan_fallback(local_dir, &artifact.file_name, artifact.format);
    if let Some(backup) = &plan.backup {
        if backup.exists() {
            fs::remove_file(backup)?;
        }
        fs::rename(&plan.path, backup)?;
        info!(from = %plan.path.display(), to = %backup.display(), "backed up previous export");
    }

    fs::write(&plan.path, &artifact.content)?;
    Ok(plan)
}

/// Upload an artifact into the Drive folder, falling back to `local_dir`.
///
/// Upload errors are not distinguished: any failure triggers the local
/// write. An error is returned only when the local write fails too.
pub async fn deliver<S: DriveService + ?Sized>(
    service: &S,
    folder_id: &str,
    local_dir: &Path,
    artifact: &Artifact,
) -> Result<Delivery> {
    match service
        .upload(
            folder_id,
            &artifact.file_name,
            artifact.format,
            artifact.content.clone(),
        )
        .await
    {
        Ok(metadata) => {
            info!(file = %artifact.file_name, id = %metadata.id, "uploaded");
            Ok(Delivery::Uploaded {
                file_id: metadata.id,
            })
        }
        Err(e) => {
            warn!(
                file = %artifact.file_name,
                error = %e,
                "upload failed, writing to {}",
                local_dir.display()
            );
            let plan = write_fallback(local_dir, artifact)?;
            info!(path = %plan.path.display(), "wrote local fallback");
            Ok(Delivery::WrittenLocally {
                path: plan.path,
                backup: plan.backup,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact(name: &str, format: ExportFormat, content: &str) -> Artifact {
        Artifact {
            file_name: name.to_string(),
            format,
            content: content.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/out/Summary.md")),
            PathBuf::from("/out/Summary.md.bak")
        );
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("a").join("b");

        let plan = write_fallback(&local, &artifact("Doc.md", ExportFormat::Markdown, "# new")).unwrap();

        assert_eq!(plan.path, local.join("Doc.md"));
        assert_eq!(plan.backup, None);
        assert_eq!(fs::read_to_string(local.join("Doc.md")).unwrap(), "# new");
    }

    #[test]
    fn test_markdown_is_backed_up() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Doc.md"), "# old").unwrap();
        fs::write(dir.path().join("Doc.md.bak"), "# older").unwrap();

        let plan = write_fallback(dir.path(), &artifact("Doc.md", ExportFormat::Markdown, "# new")).unwrap();

        assert_eq!(plan.backup, Some(dir.path().join("Doc.md.bak")));
        assert_eq!(fs::read_to_string(dir.path().join("Doc.md")).unwrap(), "# new");
        assert_eq!(fs::read_to_string(dir.path().join("Doc.md.bak")).unwrap(), "# old");
    }

    #[test]
    fn test_pdf_is_overwritten_without_backup() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Doc.pdf"), "old").unwrap();

        let plan = write_fallback(dir.path(), &artifact("Doc.pdf", ExportFormat::Pdf, "new")).unwrap();

        assert_eq!(plan.backup, None);
        assert!(!dir.path().join("Doc.pdf.bak").exists());
        assert_eq!(fs::read_to_string(dir.path().join("Doc.pdf")).unwrap(), "new");
    }

    #[test]
    fn test_plan_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("missing");

        let plan = plan_fallback(&local, "Doc.md", ExportFormat::Markdown);

        assert_eq!(plan.path, local.join("Doc.md"));
        assert!(!local.exists());
    }
}
