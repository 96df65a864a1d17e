//! The sync pipeline: scan folders, detect changes, convert, deliver, record.
//!
//! Documents are processed one at a time. Failures stay contained to the
//! document (or folder) they happen in; only a failure to persist sync state
//! aborts the run.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::config::{DirectoryMapping, FolderRef};
use crate::convert::{convert, sanitize_name, ExportFormat, EXPORT_FORMATS};
use crate::deliver::{deliver, plan_fallback, Delivery, FallbackPlan};
use crate::detect::{detect, Change};
use crate::error::Result;
use crate::models::Document;
use crate::service::DriveService;
use crate::state::StateStore;

/// Runs sync passes against a Drive backend and a state store.
pub struct Syncer<'a, S: DriveService + ?Sized, T: StateStore> {
    service: &'a S,
    store: &'a mut T,
    dry_run: bool,
    /// Documents already handled in this run, whichever mapping reached them.
    seen: HashSet<String>,
}

/// One export a dry run would have produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedExport {
    pub file_name: String,
    pub format: ExportFormat,
    pub fallback: FallbackPlan,
}

/// What a real run would do for a changed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub document_id: String,
    pub document_name: String,
    pub change: Change,
    pub folder_id: String,
    pub local_dir: PathBuf,
    /// The fallback directory does not exist yet.
    pub creates_dir: bool,
    pub exports: Vec<PlannedExport>,
}

impl PlannedAction {
    fn for_document(document: &Document, change: Change) -> Self {
        let exports = EXPORT_FORMATS
            .iter()
            .map(|&format| {
                let file_name = format.file_name(&document.export_name);
                let fallback = plan_fallback(&document.local_dir, &file_name, format);
                PlannedExport {
                    file_name,
                    format,
                    fallback,
                }
            })
            .collect();

        Self {
            document_id: document.id.clone(),
            document_name: document.name.clone(),
            change,
            folder_id: document.folder_id.clone(),
            local_dir: document.local_dir.clone(),
            creates_dir: !document.local_dir.exists(),
            exports,
        }
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self.change {
            Change::New => "new".to_string(),
            Change::Modified { previous } => format!("modified since {}", previous.to_rfc3339()),
            Change::Unchanged => "unchanged".to_string(),
        };
        let names: Vec<&str> = self.exports.iter().map(|e| e.file_name.as_str()).collect();

        writeln!(
            f,
            "Would convert {} ({}) to {}",
            self.document_name,
            reason,
            names.join(", ")
        )?;
        write!(f, "  Would upload to Drive folder {}", self.folder_id)?;
        if self.creates_dir {
            write!(
                f,
                "\n  On upload failure would create directory {}",
                self.local_dir.display()
            )?;
        }
        for export in &self.exports {
            write!(
                f,
                "\n  On upload failure would write {}",
                export.fallback.path.display()
            )?;
            if let Some(backup) = &export.fallback.backup {
                write!(f, " (backing up existing file to {})", backup.display())?;
            }
        }
        Ok(())
    }
}

/// Counters and messages from one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub scanned: usize,
    pub unchanged: usize,
    /// Documents exported successfully.
    pub converted: usize,
    /// Documents fully delivered and recorded in the state store.
    pub synced: usize,
    pub uploaded: usize,
    pub written_locally: usize,
    pub failures: Vec<String>,
    pub planned: Vec<PlannedAction>,
}

impl SyncReport {
    fn fail(&mut self, message: String) {
        error!("{}", message);
        self.failures.push(message);
    }

    /// Fold another pass into this one, e.g. a running total for `--interval`.
    ///
    /// Plans describe a single pass and are not carried over.
    pub fn merge(&mut self, other: SyncReport) {
        self.scanned += other.scanned;
        self.unchanged += other.unchanged;
        self.converted += other.converted;
        self.synced += other.synced;
        self.uploaded += other.uploaded;
        self.written_locally += other.written_locally;
        self.failures.extend(other.failures);
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} scanned, {} unchanged, {} converted, {} uploaded, {} written locally, {} failed",
            self.scanned,
            self.unchanged,
            self.converted,
            self.uploaded,
            self.written_locally,
            self.failures.len()
        )?;
        if !self.planned.is_empty() {
            write!(f, ", {} planned (dry run)", self.planned.len())?;
        }
        Ok(())
    }
}

impl<'a, S: DriveService + ?Sized, T: StateStore> Syncer<'a, S, T> {
    pub fn new(service: &'a S, store: &'a mut T, dry_run: bool) -> Self {
        Self {
            service,
            store,
            dry_run,
            seen: HashSet::new(),
        }
    }

    /// Sync every configured folder once.
    ///
    /// Returns `Err` only when sync state cannot be persisted.
    pub async fn run(&mut self, mappings: &[DirectoryMapping]) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for mapping in mappings {
            let folder_id = match &mapping.folder {
                FolderRef::Id(id) => id.clone(),
                FolderRef::Path(path) => {
                    info!(path = %path, "resolving folder path");
                    match self.service.resolve_folder(path).await {
                        Ok(id) => id,
                        Err(e) => {
                            report.fail(format!("Failed to resolve folder {}: {}", path, e));
                            continue;
                        }
                    }
                }
            };

            info!(
                name = %mapping.name,
                id = %folder_id,
                local = %mapping.local_dir.display(),
                "scanning folder"
            );
            self.scan_folder(&folder_id, mapping.local_dir.clone(), &mut report)
                .await?;
        }

        info!("{}", report);
        Ok(report)
    }

    /// Walk a folder tree depth-first, documents before subfolders.
    ///
    /// Subfolders fall back to `local_dir/<sanitized subfolder name>`.
    pub async fn scan_folder(
        &mut self,
        folder_id: &str,
        local_dir: PathBuf,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut pending = vec![(folder_id.to_string(), local_dir)];

        while let Some((folder_id, local_dir)) = pending.pop() {
            debug!(id = %folder_id, local = %local_dir.display(), "listing folder");

            let documents = match self.service.list_documents(&folder_id).await {
                Ok(documents) => documents,
                Err(e) => {
                    report.fail(format!("Error scanning folder {}: {}", folder_id, e));
                    continue;
                }
            };

            let mut parsed = Vec::with_capacity(documents.len());
            for metadata in documents {
                report.scanned += 1;
                match Document::from_metadata(metadata, &folder_id, local_dir.clone()) {
                    Ok(document) => parsed.push(document),
                    Err(e) => report.fail(format!("Skipping document: {}", e)),
                }
            }
            disambiguate_export_names(&mut parsed);

            for document in &parsed {
                self.process_document(document, report).await?;
            }

            let subfolders = match self.service.list_subfolders(&folder_id).await {
                Ok(subfolders) => subfolders,
                Err(e) => {
                    report.fail(format!("Error listing subfolders of {}: {}", folder_id, e));
                    continue;
                }
            };

            for folder in subfolders.into_iter().rev() {
                let sub_dir = local_dir.join(sanitize_name(&folder.name));
                pending.push((folder.id, sub_dir));
            }
        }

        Ok(())
    }

    async fn process_document(&mut self, document: &Document, report: &mut SyncReport) -> Result<()> {
        // Overlapping mappings or several parents can surface a document twice.
        if !self.seen.insert(document.id.clone()) {
            debug!(document = %document.name, id = %document.id, "already handled in this run");
            return Ok(());
        }

        let change = detect(document.modified_time, self.store.get(&document.id));

        match change {
            Change::Unchanged => {
                debug!(document = %document.name, "unchanged");
                report.unchanged += 1;
                return Ok(());
            }
            Change::New => {
                info!(document = %document.name, modified = %document.modified_time, "new document");
            }
            Change::Modified { previous } => {
                info!(
                    document = %document.name,
                    modified = %document.modified_time,
                    previous = %previous,
                    "document changed"
                );
            }
        }

        if self.dry_run {
            let plan = PlannedAction::for_document(document, change);
            info!("{}", plan);
            report.planned.push(plan);
            return Ok(());
        }

        let artifacts = match convert(self.service, document).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                report.fail(format!("Failed to convert {}: {}", document.name, e));
                return Ok(());
            }
        };
        report.converted += 1;

        for artifact in &artifacts {
            match deliver(
                self.service,
                &document.folder_id,
                &document.local_dir,
                artifact,
            )
            .await
            {
                Ok(Delivery::Uploaded { .. }) => report.uploaded += 1,
                Ok(Delivery::WrittenLocally { .. }) => report.written_locally += 1,
                Err(e) => {
                    report.fail(format!(
                        "Failed to write {} locally: {}",
                        artifact.file_name, e
                    ));
                    return Ok(());
                }
            }
        }

        self.store.record(&document.id, document.modified_time);
        self.store.persist()?;
        report.synced += 1;
        Ok(())
    }
}

/// Give documents whose titles sanitize to the same name in one folder
/// distinct export names, so one export never replaces another.
///
/// A document whose title already equals the sanitized name keeps it when
/// it is the only one; the others get a short ID suffix, e.g. `Plan (1a2b3c4d)`. The result does not
/// depend on listing order.
fn disambiguate_export_names(documents: &mut [Document]) {
    // export name -> (documents using it, documents titled exactly that)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for document in documents.iter() {
        let entry = counts.entry(document.export_name.clone()).or_default();
        entry.0 += 1;
        if document.name == document.export_name {
            entry.1 += 1;
        }
    }

    for document in documents.iter_mut() {
        let (users, exact) = counts[&document.export_name];
        if users < 2 || (exact == 1 && document.name == document.export_name) {
            continue;
        }
        let short_id: String = document.id.chars().take(8).collect();
        let renamed = format!("{} ({})", document.export_name, short_id);
        warn!(
            document = %document.name,
            id = %document.id,
            export_name = %renamed,
            "another document in this folder exports to the same name"
        );
        document.export_name = renamed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::Path;

    fn document(local_dir: &Path) -> Document {
        Document {
            id: "doc1".to_string(),
            name: "Summary".to_string(),
            export_name: "Summary".to_string(),
            modified_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            folder_id: "folder1".to_string(),
            local_dir: local_dir.to_path_buf(),
        }
    }

    #[test]
    fn test_plan_lists_both_exports() {
        let dir = tempfile::TempDir::new().unwrap();
        let plan = PlannedAction::for_document(&document(dir.path()), Change::New);

        let names: Vec<&str> = plan.exports.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["Summary.md", "Summary.pdf"]);
        assert!(!plan.creates_dir);

        let text = plan.to_string();
        assert!(text.contains("Would convert Summary (new) to Summary.md, Summary.pdf"));
        assert!(text.contains("Would upload to Drive folder folder1"));
        assert!(!text.contains("backing up"));
    }

    #[test]
    fn test_plan_mentions_backup_and_missing_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("Summary.md"), "old").unwrap();

        let plan = PlannedAction::for_document(&document(dir.path()), Change::New);
        assert!(plan.to_string().contains("Summary.md.bak"));

        let missing = dir.path().join("missing");
        let plan = PlannedAction::for_document(&document(&missing), Change::New);
        assert!(plan.creates_dir);
        assert!(plan.to_string().contains("would create directory"));
    }

    #[test]
    fn test_report_display() {
        let report = SyncReport {
            scanned: 3,
            unchanged: 1,
            converted: 2,
            synced: 2,
            uploaded: 3,
            written_locally: 1,
            failures: vec!["boom".to_string()],
            planned: Vec::new(),
        };
        assert_eq!(
            report.to_string(),
            "3 scanned, 1 unchanged, 2 converted, 3 uploaded, 1 written locally, 1 failed"
        );
    }

    #[test]
    fn test_merge_sums_passes() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut total = SyncReport::default();
        total.merge(SyncReport {
            scanned: 2,
            converted: 1,
            uploaded: 2,
            failures: vec!["first".to_string()],
            ..SyncReport::default()
        });
        total.merge(SyncReport {
            scanned: 2,
            unchanged: 2,
            planned: vec![PlannedAction::for_document(&document(dir.path()), Change::New)],
            ..SyncReport::default()
        });

        assert_eq!(total.scanned, 4);
        assert_eq!(total.unchanged, 2);
        assert_eq!(total.uploaded, 2);
        assert_eq!(total.failures, vec!["first".to_string()]);
        assert!(total.planned.is_empty());
    }

    fn titled(id: &str, name: &str) -> Document {
        let metadata = crate::models::FileMetadata {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: None,
            modified_time: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
            parents: Vec::new(),
        };
        Document::from_metadata(metadata, "folder1", std::path::PathBuf::from("out")).unwrap()
    }

    #[test]
    fn test_colliding_titles_get_distinct_export_names() {
        let mut documents = vec![
            titled("1a2b3c4d5e6f", "Plan?"),
            titled("9z8y7x6w5v", "Plan"),
            titled("0000", "Notes"),
        ];
        disambiguate_export_names(&mut documents);

        let names: Vec<&str> = documents.iter().map(|d| d.export_name.as_str()).collect();
        assert_eq!(names, vec!["Plan (1a2b3c4d)", "Plan", "Notes"]);
    }

    #[test]
    fn test_collision_without_exact_title_suffixes_all() {
        let mut documents = vec![titled("aaaa", "Plan?"), titled("bbbb", "Plan!")];
        disambiguate_export_names(&mut documents);

        let names: Vec<&str> = documents.iter().map(|d| d.export_name.as_str()).collect();
        assert_eq!(names, vec!["Plan (aaaa)", "Plan (bbbb)"]);
    }

    #[test]
    fn test_identical_titles_are_suffixed() {
        let mut documents = vec![titled("aaaa", "Plan"), titled("bbbb", "Plan")];
        disambiguate_export_names(&mut documents);

        let names: Vec<&str> = documents.iter().map(|d| d.export_name.as_str()).collect();
        assert_eq!(names, vec!["Plan (aaaa)", "Plan (bbbb)"]);
    }
}
