use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A managed media item. Approval state is always present; review state is
/// absent until a review cycle starts (all `review_*` columns null).
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub title: String,
    /// One of: photo, video, document, vector.
    pub asset_type: String,
    /// Ordered list of tag strings.
    pub tags: Json,

    /// Display URL; never empty once persisted.
    pub thumb: String,
    /// Optional legacy alias for `thumb`.
    pub url: Option<String>,

    pub drive_file_id: Option<String>,
    pub drive_folder_id: Option<String>,
    pub drive_web_view_link: Option<String>,
    pub drive_web_content_link: Option<String>,
    pub mime_type: Option<String>,

    pub uploaded_by: String,
    /// Role of the uploader at creation time. Immutable.
    pub uploader_role: String,
    pub created_at: DateTimeUtc,

    pub downloads: i64,
    pub views: i64,

    // Free-form taxonomy snapshot taken at upload time.
    pub grade: Option<String>,
    pub stream: Option<String>,
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub topic: Option<String>,
    pub subtopic: Option<String>,
    pub art_style: Option<String>,
    pub version: Option<String>,
    pub code: Option<String>,
    pub folder_path: Option<String>,

    /// "yellow" or "green". Green iff both approver fields are set.
    pub approval_status: String,
    pub approved_by_email: Option<String>,
    pub approved_at: Option<DateTimeUtc>,

    /// "allotted", "commented" or "passed"; null means no review cycle yet.
    pub review_status: Option<String>,
    pub review_assigned_to: Option<String>,
    pub review_assigned_to_name: Option<String>,
    pub review_comment: Option<String>,
    pub review_reviewed_by: Option<String>,
    pub review_reviewed_by_name: Option<String>,
    pub review_reviewed_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
