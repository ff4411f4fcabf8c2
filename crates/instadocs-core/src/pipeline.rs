// The list -> filter -> describe -> sort -> recreate pipeline
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::gdocs;
use crate::models::{Bookmark, CopyReport, DocInfo, DownloadReport, PlannedBookmark};
use crate::providers::{BookmarkService, DocumentService};
use crate::title::{
    docx_file_name, synthesize_content, synthesize_description, synthesize_title, TitleStyle,
};
use crate::{Error, Result};

/// Knobs for `copy`
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub title_style: TitleStyle,
    /// Pause between bookmark creations
    pub delay: Duration,
    /// Plan only; nothing is created
    pub dry_run: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            title_style: TitleStyle::default(),
            delay: Duration::from_millis(1000),
            dry_run: false,
        }
    }
}

/// Google Docs found in a folder, with their metadata
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub docs: Vec<DocInfo>,
    /// Bookmarks that looked like docs but couldn't be described
    pub skipped: Vec<(String, String)>,
}

pub struct Pipeline {
    bookmarks: Box<dyn BookmarkService>,
    documents: Box<dyn DocumentService>,
}

impl Pipeline {
    pub fn new(bookmarks: Box<dyn BookmarkService>, documents: Box<dyn DocumentService>) -> Self {
        Self {
            bookmarks,
            documents,
        }
    }

    async fn resolve_folder(&self, name: &str) -> Result<u64> {
        self.bookmarks
            .folder_id(name)
            .await?
            .ok_or_else(|| Error::FolderNotFound(name.to_string()))
    }

    /// Bookmarks in `folder` that point at Google Docs
    pub async fn google_doc_bookmarks(&self, folder: &str) -> Result<Vec<Bookmark>> {
        let folder_id = self.resolve_folder(folder).await?;
        let all = self.bookmarks.list_bookmarks(folder_id).await?;
        let total = all.len();

        let docs: Vec<Bookmark> = all
            .into_iter()
            .filter(|b| gdocs::is_google_doc(&b.url))
            .collect();
        info!(
            "Folder '{}': {} bookmarks, {} Google Docs",
            folder,
            total,
            docs.len()
        );
        Ok(docs)
    }

    /// List, filter, and fetch Drive metadata for every doc in `folder`.
    ///
    /// One unreadable doc (deleted, not shared with us) is logged and skipped
    /// rather than failing the whole run.
    pub async fn collect(&self, folder: &str) -> Result<Collected> {
        let mut collected = Collected::default();

        for bookmark in self.google_doc_bookmarks(folder).await? {
            let Some(doc_id) = gdocs::doc_id(&bookmark.url) else {
                warn!("No document id in {}, skipping", bookmark.url);
                let reason = Error::NotAGoogleDoc(bookmark.url.clone()).to_string();
                collected.skipped.push((bookmark.url.clone(), reason));
                continue;
            };

            match self.documents.metadata(doc_id).await {
                Ok(metadata) => {
                    let doc = DocInfo::from_parts(doc_id, &bookmark, metadata);
                    info!("Got {} - {} {}", doc.title, doc.owner, doc.date_label());
                    collected.docs.push(doc);
                }
                Err(e) => {
                    warn!("Error retrieving metadata for {}: {}", bookmark.url, e);
                    collected.skipped.push((bookmark.url.clone(), e.to_string()));
                }
            }
        }

        Ok(collected)
    }

    /// Collect and sort by article date
    pub async fn sorted_docs(&self, folder: &str) -> Result<Collected> {
        let mut collected = self.collect(folder).await?;
        sort_by_date(&mut collected.docs);
        Ok(collected)
    }

    /// Recreate the Google Docs of `source` in `target`, oldest first
    pub async fn copy(&self, source: &str, target: &str, options: &CopyOptions) -> Result<CopyReport> {
        if source == target {
            return Err(Error::ConfigError(
                "target folder must differ from the source folder".into(),
            ));
        }

        let collected = self.sorted_docs(source).await?;
        let planned = plan(&collected.docs, options.title_style);

        let mut report = CopyReport {
            source_folder: source.to_string(),
            target_folder: target.to_string(),
            target_folder_id: None,
            created_folder: false,
            dry_run: options.dry_run,
            found: collected.docs.len() + collected.skipped.len(),
            skipped: collected.skipped.len(),
            planned,
            added: 0,
        };

        let existing = self.bookmarks.folder_id(target).await?;
        report.target_folder_id = existing;

        if options.dry_run {
            info!(
                "Dry run: would add {} bookmarks to '{}'",
                report.planned.len(),
                target
            );
            return Ok(report);
        }

        if report.planned.is_empty() {
            info!("No Google Docs to copy from '{}'", source);
            return Ok(report);
        }

        let target_id = match existing {
            Some(id) => id,
            None => {
                let id = self.bookmarks.create_folder(target).await?;
                info!("Created folder '{}' ({})", target, id);
                report.created_folder = true;
                id
            }
        };
        report.target_folder_id = Some(target_id);

        // Instapaper keeps one bookmark per URL, so adding moves rather than copies
        warn!(
            "Instapaper deduplicates by URL: {} bookmarks will move from '{}' to '{}'",
            report.planned.len(),
            source,
            target
        );

        let count = report.planned.len();
        for (i, bookmark) in report.planned.iter().enumerate() {
            info!("Adding {}", bookmark.title);
            if let Err(e) = self.bookmarks.add_bookmark(target_id, bookmark).await {
                warn!("Stopped after {} of {} bookmarks", i, count);
                return Err(e);
            }
            report.added += 1;

            // Instapaper ingests adds asynchronously and can reorder them
            if i + 1 < count && !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
        }

        info!("Added {} bookmarks to '{}'", report.added, target);
        Ok(report)
    }

    /// Export every Google Doc in `folder` to `dir` as .docx, named after the bookmark
    pub async fn download(&self, folder: &str, dir: &Path) -> Result<DownloadReport> {
        tokio::fs::create_dir_all(dir).await?;

        let mut report = DownloadReport::default();
        let mut used_names: HashSet<String> = HashSet::new();

        for bookmark in self.google_doc_bookmarks(folder).await? {
            info!("Got {}", bookmark.title);

            let Some(doc_id) = gdocs::doc_id(&bookmark.url) else {
                let reason = Error::NotAGoogleDoc(bookmark.url.clone()).to_string();
                report.failed.push((bookmark.url.clone(), reason));
                continue;
            };

            let dest = unique_path(dir, &docx_file_name(&bookmark.title), &mut used_names);
            match self.documents.export_docx(doc_id, &dest).await {
                Ok(bytes) => {
                    debug!("Wrote {} bytes to {}", bytes, dest.display());
                    report.saved.push(dest);
                }
                Err(e) => {
                    warn!("Error downloading {}: {}", bookmark.url, e);
                    report.failed.push((bookmark.url.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

/// Oldest first; docs without a date go last. Stable, so ties keep folder order.
pub fn sort_by_date(docs: &mut [DocInfo]) {
    docs.sort_by_key(|d| (d.modified.is_none(), d.modified));
}

/// The bookmarks `copy` will create, in order
pub fn plan(docs: &[DocInfo], style: TitleStyle) -> Vec<PlannedBookmark> {
    docs.iter()
        .map(|doc| PlannedBookmark {
            url: doc.url.clone(),
            title: synthesize_title(doc, style),
            description: synthesize_description(doc),
            content: synthesize_content(doc),
        })
        .collect()
}

/// `dir/name`, with " (2)", " (3)"... before the extension on collisions
fn unique_path(dir: &Path, file_name: &str, used: &mut HashSet<String>) -> PathBuf {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{}", ext)),
        None => (file_name.to_string(), String::new()),
    };

    let mut candidate = file_name.to_string();
    let mut n = 2;
    while used.contains(&candidate) || dir.join(&candidate).exists() {
        candidate = format!("{} ({}){}", stem, n, ext);
        n += 1;
    }
    used.insert(candidate.clone());
    dir.join(candidate)
}
