use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use instadocs_core::models::{Bookmark, DocMetadata, PlannedBookmark};
use instadocs_core::{
    BookmarkService, CopyOptions, DocumentService, Error, Exporter, Pipeline, Result, TitleStyle,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory Instapaper: folders by title, bookmarks by folder id.
/// Clones share state so the test can inspect what the pipeline did.
#[derive(Clone, Default)]
struct FakeInstapaper {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    folders: HashMap<String, u64>,
    bookmarks: HashMap<u64, Vec<Bookmark>>,
    next_id: u64,
}

impl FakeInstapaper {
    fn with_folder(self, name: &str, id: u64, bookmarks: Vec<Bookmark>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.folders.insert(name.to_string(), id);
            state.bookmarks.insert(id, bookmarks);
            state.next_id = state.next_id.max(id + 1);
        }
        self
    }

    fn titles_in(&self, name: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let id = state.folders[name];
        state.bookmarks[&id].iter().map(|b| b.title.clone()).collect()
    }
}

#[async_trait]
impl BookmarkService for FakeInstapaper {
    async fn folder_id(&self, name: &str) -> Result<Option<u64>> {
        Ok(self.state.lock().unwrap().folders.get(name).copied())
    }

    async fn list_bookmarks(&self, folder_id: u64) -> Result<Vec<Bookmark>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .bookmarks
            .get(&folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_folder(&self, name: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.folders.insert(name.to_string(), id);
        state.bookmarks.insert(id, Vec::new());
        Ok(id)
    }

    async fn add_bookmark(&self, folder_id: u64, bookmark: &PlannedBookmark) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        // Instapaper keeps one bookmark per URL: adding moves it
        for list in state.bookmarks.values_mut() {
            list.retain(|b| b.url != bookmark.url);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.bookmarks.entry(folder_id).or_default().push(Bookmark {
            id,
            url: bookmark.url.clone(),
            title: bookmark.title.clone(),
            saved_at: 0,
        });
        Ok(())
    }
}

struct FakeDrive {
    docs: HashMap<String, DocMetadata>,
}

#[async_trait]
impl DocumentService for FakeDrive {
    async fn metadata(&self, doc_id: &str) -> Result<DocMetadata> {
        self.docs
            .get(doc_id)
            .cloned()
            .ok_or_else(|| Error::AuthError(format!("no access to {}", doc_id)))
    }

    async fn export_docx(&self, doc_id: &str, dest: &Path) -> Result<u64> {
        let body = format!("docx for {}", doc_id);
        std::fs::write(dest, &body)?;
        Ok(body.len() as u64)
    }
}

fn doc_url(id: &str) -> String {
    format!("https://docs.google.com/document/d/{}/edit?usp=sharing", id)
}

fn bookmark(id: u64, url: String, title: &str) -> Bookmark {
    Bookmark {
        id,
        url,
        title: title.to_string(),
        saved_at: 1_700_000_000 + id as i64,
    }
}

fn drive() -> FakeDrive {
    let meta = |title: &str, owner: &str, month: u32| DocMetadata {
        title: title.to_string(),
        owner: owner.to_string(),
        modified: Some(Utc.with_ymd_and_hms(2023, month, 15, 12, 0, 0).unwrap()),
    };

    FakeDrive {
        docs: [
            ("spring".to_string(), meta("Spring memo", "Ada", 4)),
            ("winter".to_string(), meta("Winter memo", "Grace", 1)),
            ("autumn".to_string(), meta("Autumn memo", "Ada", 10)),
        ]
        .into_iter()
        .collect(),
    }
}

fn inbox() -> Vec<Bookmark> {
    vec![
        bookmark(1, doc_url("autumn"), "Untitled document"),
        bookmark(2, "https://news.example.com/story".to_string(), "A story"),
        bookmark(3, doc_url("spring"), "Memo"),
        bookmark(4, doc_url("private"), "Locked doc"),
        bookmark(5, doc_url("winter"), "Another memo"),
    ]
}

#[tokio::test]
async fn test_copy_recreates_docs_in_date_order() {
    let instapaper = FakeInstapaper::default().with_folder("Inbox", 10, inbox());
    let pipeline = Pipeline::new(Box::new(instapaper.clone()), Box::new(drive()));

    let options = CopyOptions {
        title_style: TitleStyle::Full,
        delay: Duration::ZERO,
        dry_run: false,
    };
    let report = pipeline.copy("Inbox", "Inbox by date", &options).await.unwrap();

    assert!(report.created_folder);
    assert_eq!(report.found, 4);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.added, 3);

    assert_eq!(
        instapaper.titles_in("Inbox by date"),
        vec![
            "Winter memo - Grace - 2023-01-15",
            "Spring memo - Ada - 2023-04-15",
            "Autumn memo - Ada - 2023-10-15",
        ]
    );

    // Moved, not copied: only the non-doc and the unreadable doc stay behind
    assert_eq!(instapaper.titles_in("Inbox"), vec!["A story", "Locked doc"]);
}

#[tokio::test]
async fn test_second_run_into_new_folder_empties_previous_one() {
    let instapaper = FakeInstapaper::default().with_folder("Inbox", 10, inbox());
    let pipeline = Pipeline::new(Box::new(instapaper.clone()), Box::new(drive()));
    let options = CopyOptions {
        delay: Duration::ZERO,
        ..CopyOptions::default()
    };

    pipeline.copy("Inbox", "Sorted-1", &options).await.unwrap();
    let report = pipeline.copy("Sorted-1", "Sorted-2", &options).await.unwrap();

    assert_eq!(report.added, 3);
    assert!(instapaper.titles_in("Sorted-1").is_empty());
    assert_eq!(instapaper.titles_in("Sorted-2").len(), 3);
}

#[tokio::test]
async fn test_list_and_export_sorted_docs() {
    let instapaper = FakeInstapaper::default().with_folder("Inbox", 10, inbox());
    let pipeline = Pipeline::new(Box::new(instapaper), Box::new(drive()));

    let collected = pipeline.sorted_docs("Inbox").await.unwrap();
    let titles: Vec<_> = collected.docs.iter().map(|d| d.title.as_str()).collect();
    assert_eq!(titles, vec!["Winter memo", "Spring memo", "Autumn memo"]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.md");
    Exporter::export_to_file(&collected.docs, &path).unwrap();
    let md = std::fs::read_to_string(&path).unwrap();
    assert!(md.contains("Total documents: 3"));
    assert!(md.find("Winter memo").unwrap() < md.find("Autumn memo").unwrap());
}

#[tokio::test]
async fn test_download_exports_every_doc() {
    let instapaper = FakeInstapaper::default().with_folder("Inbox", 10, inbox());
    let pipeline = Pipeline::new(Box::new(instapaper), Box::new(drive()));

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("exports");
    let report = pipeline.download("Inbox", &out).await.unwrap();

    // Export doesn't need metadata, so even the locked doc gets a file here
    assert_eq!(report.saved.len(), 4);
    assert!(report.failed.is_empty());
    assert_eq!(
        std::fs::read_to_string(out.join("Memo.docx")).unwrap(),
        "docx for spring"
    );
}
