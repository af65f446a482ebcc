use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use server::models::taxonomy::SelectionIds;
use server::services::sheets::{SheetCache, SheetSource, SheetsError};
use server::services::taxonomy::{TaxonomyError, TaxonomyService};

/// Sheet source backed by fixed tab contents.
struct Workbook {
    tabs: HashMap<String, Vec<Vec<String>>>,
    calls: AtomicUsize,
}

#[async_trait]
impl SheetSource for Workbook {
    async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tabs.get(range).cloned().unwrap_or_default())
    }
}

fn tab(data: &[&[&str]]) -> Vec<Vec<String>> {
    data.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

fn workbook() -> Arc<Workbook> {
    let mut tabs = HashMap::new();
    tabs.insert(
        "Grades!A:Z".to_string(),
        tab(&[
            &["id", "name", "code", "sort_order", "is_active"],
            &["g9", "Grade 9", "", "1", "1"],
            &["g10", "Grade 10", "", "2", "1"],
        ]),
    );
    tabs.insert(
        "Subjects!A:Z".to_string(),
        tab(&[
            &["id", "grade_id", "name", "code", "sort_order", "is_active"],
            &["s-chem", "g9", "Chemistry", "CHEM", "1", "1"],
            &["s-hist", "g10", "History", "", "1", "1"],
        ]),
    );
    tabs.insert(
        "Chapters!A:Z".to_string(),
        tab(&[
            &["id", "subject_id", "name", "number", "sort_order", "is_active"],
            &["ch-3", "s-chem", "Atoms and Molecules", "3", "1", "1"],
        ]),
    );
    tabs.insert(
        "Topics!A:Z".to_string(),
        tab(&[
            &["id", "chapter_id", "name", "sort_order", "is_active"],
            &["t-atoms", "ch-3", "Atoms", "1", "1"],
        ]),
    );
    tabs.insert(
        "Subtopics!A:Z".to_string(),
        tab(&[
            &["id", "topic_id", "name", "sort_order", "is_active"],
            &["st-as", "t-atoms", "Atomic Structure", "1", "1"],
        ]),
    );
    tabs.insert(
        "ArtStyles!A:Z".to_string(),
        tab(&[
            &["id", "name", "sort_order", "is_active"],
            &["a-3d", "3D", "1", "1"],
        ]),
    );
    Arc::new(Workbook {
        tabs,
        calls: AtomicUsize::new(0),
    })
}

fn service(source: Arc<Workbook>) -> TaxonomyService {
    let sheets = Arc::new(SheetCache::new(source, Duration::from_secs(60)));
    TaxonomyService::new(sheets, Duration::from_secs(60))
}

fn full_selection() -> SelectionIds {
    SelectionIds {
        grade_id: "g9".into(),
        subject_id: "s-chem".into(),
        chapter_id: "ch-3".into(),
        topic_id: "t-atoms".into(),
        subtopic_id: "st-as".into(),
        art_style_id: "a-3d".into(),
    }
}

mod hierarchy {
    use super::*;

    #[tokio::test]
    async fn drill_down_follows_parent_links() {
        let svc = service(workbook());

        let grades = svc.grades().await.unwrap();
        assert_eq!(grades.len(), 2);

        let subjects = svc.subjects("g9").await.unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].name, "Chemistry");

        let chapters = svc.chapters("s-chem").await.unwrap();
        assert_eq!(chapters[0].number.as_deref(), Some("3"));

        let topics = svc.topics("ch-3").await.unwrap();
        let subtopics = svc.subtopics(&topics[0].id).await.unwrap();
        assert_eq!(subtopics[0].name, "Atomic Structure");
    }

    #[tokio::test]
    async fn selection_across_grades_is_rejected() {
        let svc = service(workbook());

        let mut ids = full_selection();
        ids.subject_id = "s-hist".into(); // belongs to g10
        assert!(matches!(
            svc.resolve_selection(&ids).await,
            Err(TaxonomyError::InvalidSelection)
        ));
    }
}

mod titles {
    use super::*;

    #[tokio::test]
    async fn end_to_end_title_generation() {
        let svc = service(workbook());

        let selection = svc.resolve_selection(&full_selection()).await.unwrap();
        assert_eq!(
            TaxonomyService::generate_title(&selection),
            "Atomic_Structure_Grade_9_CHEM_3_3D_V1"
        );
    }

    #[tokio::test]
    async fn folder_path_mirrors_the_selection() {
        let svc = service(workbook());

        let selection = svc.resolve_selection(&full_selection()).await.unwrap();
        assert_eq!(
            TaxonomyService::folder_segments(&selection),
            vec!["Grade 9", "Chemistry", "3", "Atoms", "Atomic Structure", "3D"]
        );
    }
}

mod caching {
    use super::*;

    #[tokio::test]
    async fn repeated_reads_do_not_refetch() {
        let source = workbook();
        let svc = service(source.clone());

        svc.grades().await.unwrap();
        let after_first = source.calls.load(Ordering::SeqCst);
        svc.subjects("g9").await.unwrap();
        svc.art_styles().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test]
    async fn refresh_bypasses_both_cache_layers_next_load() {
        let source = workbook();
        // Zero sheet TTL so the forced reload reaches the source.
        let sheets = Arc::new(SheetCache::new(source.clone(), Duration::ZERO));
        let svc = TaxonomyService::new(sheets, Duration::from_secs(600));

        svc.grades().await.unwrap();
        let before = source.calls.load(Ordering::SeqCst);
        svc.refresh().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), before + 6);
    }
}
