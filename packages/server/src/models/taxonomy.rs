use serde::{Deserialize, Serialize};

/// Full selection chain sent to title generation.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct SelectionIds {
    pub grade_id: String,
    pub subject_id: String,
    pub chapter_id: String,
    pub topic_id: String,
    pub subtopic_id: String,
    pub art_style_id: String,
}

/// Parent-id query parameter for subject listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct SubjectsQuery {
    pub grade_id: Option<String>,
}

/// Parent-id query parameter for chapter listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct ChaptersQuery {
    pub subject_id: Option<String>,
}

/// Parent-id query parameter for topic listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct TopicsQuery {
    pub chapter_id: Option<String>,
}

/// Parent-id query parameter for subtopic listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct SubtopicsQuery {
    pub topic_id: Option<String>,
}

/// Generated title preview.
#[derive(Serialize, utoipa::ToSchema)]
pub struct TitleResponse {
    #[schema(example = "Atomic_Structure_Grade_9_CHEM_3_3D_V1")]
    pub title: String,
}
