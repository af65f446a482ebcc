use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use common::cache::{Clock, SystemClock, TtlCell};

use crate::models::taxonomy::SelectionIds;

use super::sheets::{Row, SheetCache, SheetsError};

#[derive(Debug, thiserror::Error)]
pub enum TaxonomyError {
    /// The six ids do not form a connected path through the hierarchy.
    #[error("invalid taxonomy selection")]
    InvalidSelection,
    #[error(transparent)]
    Sheets(#[from] SheetsError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Grade {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Subject {
    pub id: String,
    pub grade_id: String,
    pub name: String,
    pub code: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Chapter {
    pub id: String,
    pub subject_id: String,
    pub name: String,
    pub number: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Topic {
    pub id: String,
    pub chapter_id: String,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Subtopic {
    pub id: String,
    pub topic_id: String,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ArtStyle {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
}

/// A fully-resolved, internally consistent selection chain.
#[derive(Debug, Clone)]
pub struct Selection {
    pub grade: Grade,
    pub subject: Subject,
    pub chapter: Chapter,
    pub topic: Topic,
    pub subtopic: Subtopic,
    pub art_style: ArtStyle,
}

/// The six collections loaded together; replaced wholesale on refresh.
struct Bundle {
    grades: Vec<Grade>,
    subjects: Vec<Subject>,
    chapters: Vec<Chapter>,
    topics: Vec<Topic>,
    subtopics: Vec<Subtopic>,
    art_styles: Vec<ArtStyle>,
}

/// Tokens kept uppercase by the title caser.
const ACRONYMS: &[&str] = &[
    "AI", "ML", "NLP", "CV", "RL", "GAN", "LLM", "RAG", "SQL", "API", "HTTP", "GPU", "CPU",
    "UPSC", "SSC", "CBSE", "NCERT", "IIT", "JEE", "NEET", "DNA", "RNA", "3D", "2D",
];

fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

/// A row is active when its `is_active` column is truthy or absent
/// entirely. A present-but-blank cell counts as inactive.
fn row_is_active(row: &Row) -> bool {
    match row.get("is_active") {
        Some(v) => is_truthy(v),
        None => true,
    }
}

fn field(row: &Row, key: &str) -> String {
    row.get(key).map(|v| v.trim().to_string()).unwrap_or_default()
}

fn optional_field(row: &Row, key: &str) -> Option<String> {
    let v = field(row, key);
    (!v.is_empty()).then_some(v)
}

fn sort_order(row: &Row) -> i64 {
    let raw = field(row, "sort_order");
    raw.parse::<i64>()
        .or_else(|_| raw.parse::<f64>().map(|f| f as i64))
        .unwrap_or(0)
}

fn sorted<T>(mut items: Vec<T>, key: impl Fn(&T) -> i64) -> Vec<T> {
    // Stable sort keeps the sheet's row order among equal sort_orders.
    items.sort_by_key(|item| key(item));
    items
}

/// Title Case that preserves acronyms and tokens already ALL CAPS.
fn smart_title_case(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    let clean: String = token.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if !clean.is_empty() && ACRONYMS.contains(&clean.to_ascii_uppercase().as_str()) {
        return token.to_uppercase();
    }
    if !clean.is_empty()
        && clean
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return token.to_string();
    }
    let lower = token.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// TTL-cached hierarchical lookup over the six taxonomy tabs.
///
/// The bundle is loaded as a unit and replaced atomically; accessors only
/// ever see a complete hierarchy. All records are read-only derived state,
/// never written back to the sheet.
pub struct TaxonomyService {
    sheets: Arc<SheetCache>,
    cache: TtlCell<Bundle>,
}

impl TaxonomyService {
    pub fn new(sheets: Arc<SheetCache>, ttl: Duration) -> Self {
        Self::with_clock(sheets, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(sheets: Arc<SheetCache>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sheets,
            cache: TtlCell::with_clock(ttl, clock),
        }
    }

    async fn load(&self, force: bool) -> Result<Arc<Bundle>, SheetsError> {
        if !force && let Some(bundle) = self.cache.get() {
            return Ok(bundle);
        }

        let (grades_r, subjects_r, chapters_r, topics_r, subtopics_r, art_styles_r) = futures::try_join!(
            self.sheets.read_tab("Grades"),
            self.sheets.read_tab("Subjects"),
            self.sheets.read_tab("Chapters"),
            self.sheets.read_tab("Topics"),
            self.sheets.read_tab("Subtopics"),
            self.sheets.read_tab("ArtStyles"),
        )?;

        // Keep original casing from the sheet; only trim.
        let grades = sorted(
            grades_r
                .iter()
                .filter(|r| row_is_active(r))
                .map(|r| Grade {
                    id: field(r, "id"),
                    name: field(r, "name"),
                    code: optional_field(r, "code"),
                    sort_order: sort_order(r),
                })
                .collect(),
            |g: &Grade| g.sort_order,
        );

        let subjects = sorted(
            subjects_r
                .iter()
                .filter(|r| row_is_active(r))
                .map(|r| Subject {
                    id: field(r, "id"),
                    grade_id: field(r, "grade_id"),
                    name: field(r, "name"),
                    code: optional_field(r, "code"),
                    sort_order: sort_order(r),
                })
                .collect(),
            |s: &Subject| s.sort_order,
        );

        let chapters = sorted(
            chapters_r
                .iter()
                .filter(|r| row_is_active(r))
                .map(|r| Chapter {
                    id: field(r, "id"),
                    subject_id: field(r, "subject_id"),
                    name: field(r, "name"),
                    number: optional_field(r, "number"),
                    sort_order: sort_order(r),
                })
                .collect(),
            |c: &Chapter| c.sort_order,
        );

        let topics = sorted(
            topics_r
                .iter()
                .filter(|r| row_is_active(r))
                .map(|r| Topic {
                    id: field(r, "id"),
                    chapter_id: field(r, "chapter_id"),
                    name: field(r, "name"),
                    sort_order: sort_order(r),
                })
                .collect(),
            |t: &Topic| t.sort_order,
        );

        let subtopics = sorted(
            subtopics_r
                .iter()
                .filter(|r| row_is_active(r))
                .map(|r| Subtopic {
                    id: field(r, "id"),
                    topic_id: field(r, "topic_id"),
                    name: field(r, "name"),
                    sort_order: sort_order(r),
                })
                .collect(),
            |s: &Subtopic| s.sort_order,
        );

        let art_styles = sorted(
            art_styles_r
                .iter()
                .filter(|r| row_is_active(r))
                .map(|r| ArtStyle {
                    id: field(r, "id"),
                    name: field(r, "name"),
                    sort_order: sort_order(r),
                })
                .collect(),
            |a: &ArtStyle| a.sort_order,
        );

        Ok(self.cache.put(Bundle {
            grades,
            subjects,
            chapters,
            topics,
            subtopics,
            art_styles,
        }))
    }

    pub async fn grades(&self) -> Result<Vec<Grade>, SheetsError> {
        Ok(self.load(false).await?.grades.clone())
    }

    pub async fn subjects(&self, grade_id: &str) -> Result<Vec<Subject>, SheetsError> {
        Ok(self
            .load(false)
            .await?
            .subjects
            .iter()
            .filter(|s| s.grade_id == grade_id)
            .cloned()
            .collect())
    }

    pub async fn chapters(&self, subject_id: &str) -> Result<Vec<Chapter>, SheetsError> {
        Ok(self
            .load(false)
            .await?
            .chapters
            .iter()
            .filter(|c| c.subject_id == subject_id)
            .cloned()
            .collect())
    }

    pub async fn topics(&self, chapter_id: &str) -> Result<Vec<Topic>, SheetsError> {
        Ok(self
            .load(false)
            .await?
            .topics
            .iter()
            .filter(|t| t.chapter_id == chapter_id)
            .cloned()
            .collect())
    }

    pub async fn subtopics(&self, topic_id: &str) -> Result<Vec<Subtopic>, SheetsError> {
        Ok(self
            .load(false)
            .await?
            .subtopics
            .iter()
            .filter(|s| s.topic_id == topic_id)
            .cloned()
            .collect())
    }

    pub async fn art_styles(&self) -> Result<Vec<ArtStyle>, SheetsError> {
        Ok(self.load(false).await?.art_styles.clone())
    }

    /// Resolves a full id chain, verifying each child's parent link against
    /// the id already resolved one level up. Six independently valid ids
    /// that do not connect are rejected.
    pub async fn resolve_selection(&self, ids: &SelectionIds) -> Result<Selection, TaxonomyError> {
        let bundle = self.load(false).await?;

        let grade = bundle.grades.iter().find(|g| g.id == ids.grade_id);
        let subject = bundle
            .subjects
            .iter()
            .find(|s| s.id == ids.subject_id && s.grade_id == ids.grade_id);
        let chapter = bundle
            .chapters
            .iter()
            .find(|c| c.id == ids.chapter_id && c.subject_id == ids.subject_id);
        let topic = bundle
            .topics
            .iter()
            .find(|t| t.id == ids.topic_id && t.chapter_id == ids.chapter_id);
        let subtopic = bundle
            .subtopics
            .iter()
            .find(|s| s.id == ids.subtopic_id && s.topic_id == ids.topic_id);
        let art_style = bundle.art_styles.iter().find(|a| a.id == ids.art_style_id);

        match (grade, subject, chapter, topic, subtopic, art_style) {
            (Some(g), Some(s), Some(c), Some(t), Some(st), Some(a)) => Ok(Selection {
                grade: g.clone(),
                subject: s.clone(),
                chapter: c.clone(),
                topic: t.clone(),
                subtopic: st.clone(),
                art_style: a.clone(),
            }),
            _ => Err(TaxonomyError::InvalidSelection),
        }
    }

    /// Unconditionally reloads the bundle, ignoring the TTL.
    pub async fn refresh(&self) -> Result<(), SheetsError> {
        self.cache.clear();
        self.load(true).await?;
        Ok(())
    }

    /// Composes `subtopic_grade_subjectCodeOrName_chapterNo_artStyle_V1`
    /// with whitespace normalized to underscores and acronym-safe casing.
    pub fn generate_title(selection: &Selection) -> String {
        let subject_part = selection
            .subject
            .code
            .clone()
            .unwrap_or_else(|| selection.subject.name.clone());
        let chapter_no = selection.chapter.number.clone().unwrap_or_default();

        let raw = [
            selection.subtopic.name.as_str(),
            selection.grade.name.as_str(),
            subject_part.as_str(),
            chapter_no.as_str(),
            selection.art_style.name.as_str(),
            "V1",
        ]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_");

        let underscored: String = raw
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();

        let mut collapsed = String::with_capacity(underscored.len());
        for c in underscored.chars() {
            if c == '_' && collapsed.ends_with('_') {
                continue;
            }
            collapsed.push(c);
        }

        collapsed
            .split('_')
            .map(smart_title_case)
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Drive folder segments, keeping the sheet's original casing.
    pub fn folder_segments(selection: &Selection) -> Vec<String> {
        vec![
            selection.grade.name.clone(),
            selection.subject.name.clone(),
            selection
                .chapter
                .number
                .clone()
                .unwrap_or_else(|| selection.chapter.name.clone()),
            selection.topic.name.clone(),
            selection.subtopic.name.clone(),
            selection.art_style.name.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use common::cache::ManualClock;

    use crate::services::sheets::SheetSource;

    use super::*;

    struct FixtureSource {
        tabs: Mutex<HashMap<String, Vec<Vec<String>>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SheetSource for FixtureSource {
        async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .tabs
                .lock()
                .unwrap()
                .get(range)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn fixture() -> Arc<FixtureSource> {
        let mut tabs = HashMap::new();
        tabs.insert(
            "Grades!A:Z".to_string(),
            rows(&[
                &["id", "name", "code", "sort_order", "is_active"],
                &["g10", "Grade 10", "", "2", "1"],
                &["g9", "Grade 9", "", "1", "true"],
                &["g11", "Grade 11", "", "3", "0"],
                &["g12", "Grade 12", "", "4", ""],
            ]),
        );
        tabs.insert(
            "Subjects!A:Z".to_string(),
            rows(&[
                &["id", "grade_id", "name", "code", "sort_order", "is_active"],
                &["s1", "g9", "Chemistry", "CHEM", "1", "yes"],
                &["s2", "g9", "physics", "", "2", "y"],
                &["s3", "g10", "Biology", "BIO", "1", "1"],
            ]),
        );
        tabs.insert(
            "Chapters!A:Z".to_string(),
            rows(&[
                &["id", "subject_id", "name", "number", "sort_order", "is_active"],
                &["c3", "s1", "Atoms and Molecules", "3", "3", "1"],
                &["c1", "s1", "Matter", "", "1", "1"],
            ]),
        );
        tabs.insert(
            "Topics!A:Z".to_string(),
            rows(&[
                &["id", "chapter_id", "name", "sort_order", "is_active"],
                &["t1", "c3", "Atoms", "1", "1"],
            ]),
        );
        tabs.insert(
            "Subtopics!A:Z".to_string(),
            rows(&[
                &["id", "topic_id", "name", "sort_order", "is_active"],
                &["st1", "t1", "Atomic Structure", "1", "1"],
            ]),
        );
        // No is_active column at all: every row counts as active.
        tabs.insert(
            "ArtStyles!A:Z".to_string(),
            rows(&[
                &["id", "name", "sort_order"],
                &["a2", "2D", "2"],
                &["a1", "3D", "1"],
            ]),
        );
        Arc::new(FixtureSource {
            tabs: Mutex::new(tabs),
            calls: AtomicUsize::new(0),
        })
    }

    fn service(source: Arc<FixtureSource>) -> TaxonomyService {
        let sheets = Arc::new(SheetCache::new(source, Duration::ZERO));
        TaxonomyService::new(sheets, Duration::from_secs(60))
    }

    fn ids() -> SelectionIds {
        SelectionIds {
            grade_id: "g9".into(),
            subject_id: "s1".into(),
            chapter_id: "c3".into(),
            topic_id: "t1".into(),
            subtopic_id: "st1".into(),
            art_style_id: "a1".into(),
        }
    }

    #[tokio::test]
    async fn inactive_and_blank_rows_are_filtered() {
        let svc = service(fixture());
        let grades = svc.grades().await.unwrap();
        let ids: Vec<&str> = grades.iter().map(|g| g.id.as_str()).collect();
        // g11 is explicitly inactive; g12 has a blank is_active cell.
        assert_eq!(ids, vec!["g9", "g10"]);
    }

    #[tokio::test]
    async fn missing_is_active_column_keeps_rows() {
        let svc = service(fixture());
        let styles = svc.art_styles().await.unwrap();
        assert_eq!(styles.len(), 2);
    }

    #[tokio::test]
    async fn collections_sort_by_sort_order() {
        let svc = service(fixture());
        let styles = svc.art_styles().await.unwrap();
        let names: Vec<&str> = styles.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["3D", "2D"]);
    }

    #[tokio::test]
    async fn subjects_join_on_the_grade_id() {
        let svc = service(fixture());
        let subjects = svc.subjects("g9").await.unwrap();
        let ids: Vec<&str> = subjects.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert!(svc.subjects("g404").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_selection_accepts_a_connected_chain() {
        let svc = service(fixture());
        let sel = svc.resolve_selection(&ids()).await.unwrap();
        assert_eq!(sel.grade.name, "Grade 9");
        assert_eq!(sel.subject.code.as_deref(), Some("CHEM"));
        assert_eq!(sel.chapter.number.as_deref(), Some("3"));
        assert_eq!(sel.art_style.name, "3D");
    }

    #[tokio::test]
    async fn resolve_selection_rejects_a_broken_link() {
        let svc = service(fixture());

        // s3 exists but belongs to g10, not g9.
        let mut broken = ids();
        broken.subject_id = "s3".into();
        assert!(matches!(
            svc.resolve_selection(&broken).await,
            Err(TaxonomyError::InvalidSelection)
        ));

        let mut unknown = ids();
        unknown.art_style_id = "a404".into();
        assert!(matches!(
            svc.resolve_selection(&unknown).await,
            Err(TaxonomyError::InvalidSelection)
        ));
    }

    #[tokio::test]
    async fn generated_title_preserves_acronyms() {
        let svc = service(fixture());
        let sel = svc.resolve_selection(&ids()).await.unwrap();
        assert_eq!(
            TaxonomyService::generate_title(&sel),
            "Atomic_Structure_Grade_9_CHEM_3_3D_V1"
        );
    }

    #[tokio::test]
    async fn title_falls_back_to_subject_name_and_skips_missing_chapter_number() {
        let svc = service(fixture());
        let mut sel = svc.resolve_selection(&ids()).await.unwrap();
        sel.subject.code = None;
        sel.subject.name = "physics".into();
        sel.chapter.number = None;
        assert_eq!(
            TaxonomyService::generate_title(&sel),
            "Atomic_Structure_Grade_9_Physics_3D_V1"
        );
    }

    #[test]
    fn title_casing_rules() {
        assert_eq!(smart_title_case("chemistry"), "Chemistry");
        assert_eq!(smart_title_case("3d"), "3D");
        assert_eq!(smart_title_case("ncert"), "NCERT");
        assert_eq!(smart_title_case("CHEM"), "CHEM");
        assert_eq!(smart_title_case("9"), "9");
        assert_eq!(smart_title_case("mIxEd"), "Mixed");
        assert_eq!(smart_title_case(""), "");
    }

    #[tokio::test]
    async fn bundle_cache_honors_its_ttl() {
        let source = fixture();
        let clock = Arc::new(ManualClock::new());
        let sheets = Arc::new(SheetCache::with_clock(
            source.clone(),
            Duration::ZERO,
            clock.clone(),
        ));
        let svc = TaxonomyService::with_clock(sheets, Duration::from_secs(60), clock.clone());

        svc.grades().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 6);

        svc.art_styles().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 6, "served from cache");

        clock.advance(Duration::from_secs(61));
        svc.grades().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn refresh_reloads_regardless_of_ttl() {
        let source = fixture();
        let sheets = Arc::new(SheetCache::new(source.clone(), Duration::ZERO));
        let svc = TaxonomyService::new(sheets, Duration::from_secs(600));

        svc.grades().await.unwrap();
        svc.refresh().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn folder_segments_follow_the_hierarchy() {
        let svc = service(fixture());
        let sel = svc.resolve_selection(&ids()).await.unwrap();
        assert_eq!(
            TaxonomyService::folder_segments(&sel),
            vec!["Grade 9", "Chemistry", "3", "Atoms", "Atomic Structure", "3D"]
        );
    }
}
