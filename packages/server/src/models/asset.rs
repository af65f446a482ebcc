use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::asset;
use crate::error::AppError;
use crate::models::auth::Role;

/// Kind of managed media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Photo,
    Video,
    Document,
    Vector,
}

impl AssetType {
    pub const fn as_str(self) -> &'static str {
        match self {
            AssetType::Photo => "photo",
            AssetType::Video => "video",
            AssetType::Document => "document",
            AssetType::Vector => "vector",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "photo" => Some(AssetType::Photo),
            "video" => Some(AssetType::Video),
            "document" => Some(AssetType::Document),
            "vector" => Some(AssetType::Vector),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Yellow,
    Green,
}

impl ApprovalStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Yellow => "yellow",
            ApprovalStatus::Green => "green",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yellow" => Some(ApprovalStatus::Yellow),
            "green" => Some(ApprovalStatus::Green),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Allotted,
    Commented,
    Passed,
}

impl ReviewStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Allotted => "allotted",
            ReviewStatus::Commented => "commented",
            ReviewStatus::Passed => "passed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allotted" => Some(ReviewStatus::Allotted),
            "commented" => Some(ReviewStatus::Commented),
            "passed" => Some(ReviewStatus::Passed),
        _ => None,
        }
    }
}

/// Approval gate state. Green always carries approver identity and time;
/// yellow never does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Approval {
    pub status: ApprovalStatus,
    pub approved_by_email: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Approval {
    pub fn yellow() -> Self {
        Self {
            status: ApprovalStatus::Yellow,
            approved_by_email: None,
            approved_at: None,
        }
    }

    pub fn green(approver_email: &str, at: DateTime<Utc>) -> Self {
        Self {
            status: ApprovalStatus::Green,
            approved_by_email: Some(approver_email.to_string()),
            approved_at: Some(at),
        }
    }

    pub fn from_model(model: &asset::Model) -> Self {
        match ApprovalStatus::parse(&model.approval_status) {
            Some(ApprovalStatus::Green) => Self {
                status: ApprovalStatus::Green,
                approved_by_email: model.approved_by_email.clone(),
                approved_at: model.approved_at,
            },
            // Unknown stored values degrade to the default state.
            _ => Self::yellow(),
        }
    }
}

/// A review cycle. Absent entirely until an admin upload or assign creates
/// it; once present it never goes away. Transitions are intentionally not
/// gated on the current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Review {
    pub status: ReviewStatus,
    pub assigned_to: Option<String>,
    pub assigned_to_name: Option<String>,
    pub comment: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_by_name: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Review {
    /// Initial state for an admin-authored upload: allotted, nothing else.
    pub fn allotted() -> Self {
        Self {
            status: ReviewStatus::Allotted,
            assigned_to: None,
            assigned_to_name: None,
            comment: None,
            reviewed_by: None,
            reviewed_by_name: None,
            reviewed_at: None,
        }
    }

    /// Admin assignment. Resets status to allotted and replaces the
    /// assignee, leaving any earlier comment/reviewer fields in place.
    pub fn assigned(
        prev: Option<Review>,
        assigned_to: Option<String>,
        assigned_to_name: Option<String>,
    ) -> Self {
        let mut review = prev.unwrap_or_else(Review::allotted);
        review.status = ReviewStatus::Allotted;
        review.assigned_to = assigned_to;
        review.assigned_to_name = assigned_to_name;
        review
    }

    /// SME comment. Records the comment and the reviewer identity.
    pub fn commented(
        prev: Option<Review>,
        comment: Option<String>,
        reviewer_email: &str,
        reviewer_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Self {
        let mut review = prev.unwrap_or_else(Review::allotted);
        review.status = ReviewStatus::Commented;
        review.comment = comment;
        review.reviewed_by = Some(reviewer_email.to_string());
        review.reviewed_by_name = reviewer_name.map(str::to_string);
        review.reviewed_at = Some(at);
        review
    }

    /// SME pass. Records the reviewer identity; the comment is untouched.
    pub fn passed(
        prev: Option<Review>,
        reviewer_email: &str,
        reviewer_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Self {
        let mut review = prev.unwrap_or_else(Review::allotted);
        review.status = ReviewStatus::Passed;
        review.reviewed_by = Some(reviewer_email.to_string());
        review.reviewed_by_name = reviewer_name.map(str::to_string);
        review.reviewed_at = Some(at);
        review
    }

    /// Reconstructs the tagged review value from the flat columns. `None`
    /// when no review cycle has started.
    pub fn from_model(model: &asset::Model) -> Option<Self> {
        let status = ReviewStatus::parse(model.review_status.as_deref()?)?;
        Some(Self {
            status,
            assigned_to: model.review_assigned_to.clone(),
            assigned_to_name: model.review_assigned_to_name.clone(),
            comment: model.review_comment.clone(),
            reviewed_by: model.review_reviewed_by.clone(),
            reviewed_by_name: model.review_reviewed_by_name.clone(),
            reviewed_at: model.review_reviewed_at,
        })
    }
}

/// Writes a review value into the asset's flat columns.
pub fn write_review(am: &mut asset::ActiveModel, review: &Review) {
    use sea_orm::Set;
    am.review_status = Set(Some(review.status.as_str().to_string()));
    am.review_assigned_to = Set(review.assigned_to.clone());
    am.review_assigned_to_name = Set(review.assigned_to_name.clone());
    am.review_comment = Set(review.comment.clone());
    am.review_reviewed_by = Set(review.reviewed_by.clone());
    am.review_reviewed_by_name = Set(review.reviewed_by_name.clone());
    am.review_reviewed_at = Set(review.reviewed_at);
}

/// Writes an approval value into the asset's flat columns.
pub fn write_approval(am: &mut asset::ActiveModel, approval: &Approval) {
    use sea_orm::Set;
    am.approval_status = Set(approval.status.as_str().to_string());
    am.approved_by_email = Set(approval.approved_by_email.clone());
    am.approved_at = Set(approval.approved_at);
}

/// Converts the stored JSON tag array back into a string list.
pub fn tags_from_json(tags: &serde_json::Value) -> Vec<String> {
    tags.as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Prefixes relative links with the configured public base URL.
pub fn absolutize(base: &str, link: &str) -> String {
    let lower = link.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || base.is_empty() {
        return link.to_string();
    }
    if link.starts_with('/') {
        format!("{base}{link}")
    } else {
        format!("{base}/{link}")
    }
}

/// Response DTO for a single asset. Drive internals are not exposed; the
/// thumbnail prefers the Drive CDN link whenever a Drive file exists.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AssetResponse {
    pub id: Uuid,
    #[schema(example = "Atomic_Structure_Grade_9_CHEM_3_3D_V1")]
    pub title: String,
    pub asset_type: AssetType,
    pub tags: Vec<String>,
    pub thumb: String,
    pub url: String,
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
    pub uploaded_by: String,
    pub uploader_role: Role,
    pub created_at: DateTime<Utc>,
    pub downloads: i64,
    pub views: i64,
    pub approval: Approval,
    pub review: Option<Review>,
}

impl AssetResponse {
    pub fn from_model(model: asset::Model, base: &str) -> Self {
        let approval = Approval::from_model(&model);
        let review = Review::from_model(&model);

        let cdn_thumb = model
            .drive_file_id
            .as_deref()
            .map(crate::services::drive::cdn_thumb_url);
        let thumb_candidate = cdn_thumb
            .or_else(|| (!model.thumb.is_empty()).then(|| model.thumb.clone()))
            .or_else(|| model.url.clone())
            .unwrap_or_default();
        let url = model.url.clone().unwrap_or_else(|| thumb_candidate.clone());

        Self {
            id: model.id,
            asset_type: AssetType::parse(&model.asset_type).unwrap_or(AssetType::Photo),
            tags: tags_from_json(&model.tags),
            thumb: absolutize(base, &thumb_candidate),
            url: absolutize(base, &url),
            grade: model.grade,
            stream: model.stream,
            subject: model.subject,
            chapter: model.chapter,
            topic: model.topic,
            subtopic: model.subtopic,
            art_style: model.art_style,
            version: model.version,
            code: model.code,
            folder_path: model.folder_path,
            uploaded_by: model.uploaded_by,
            uploader_role: Role::parse(&model.uploader_role).unwrap_or(Role::User),
            created_at: model.created_at,
            downloads: model.downloads,
            views: model.views,
            title: model.title,
            approval,
            review,
        }
    }
}

/// Response DTO for asset listings.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AssetListResponse {
    pub items: Vec<AssetResponse>,
}

/// Wrapper for single-asset responses.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AssetItemResponse {
    pub item: AssetResponse,
}

/// Query parameters for asset listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct AssetListQuery {
    /// Case-insensitive substring matched against title, tags and uploader.
    pub q: Option<String>,
}

/// Metadata accompanying an upload, sent as the `meta` multipart field.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct CreateAssetMeta {
    pub title: Option<String>,
    pub asset_type: Option<String>,
    pub tags: Vec<String>,
    pub grade: Option<String>,
    pub stream: Option<String>,
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub topic: Option<String>,
    pub subtopic: Option<String>,
    pub art_style: Option<String>,
    pub version: Option<String>,
    pub code: Option<String>,
}

impl CreateAssetMeta {
    /// All six taxonomy fields are required on upload.
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("grade", &self.grade),
            ("subject", &self.subject),
            ("chapter", &self.chapter),
            ("topic", &self.topic),
            ("subtopic", &self.subtopic),
            ("art_style", &self.art_style),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.as_deref().is_none_or(|s| s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing fields: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// Request body for the admin assign action.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct AssignRequest {
    /// SME email to assign the review to.
    pub assigned_to: Option<String>,
    pub assigned_to_name: Option<String>,
}

/// Request body for the SME comment action.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CommentRequest {
    pub comment: Option<String>,
}

/// Request body for the approval toggle.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct ApprovalRequest {
    /// "yellow" or "green"; anything else is rejected.
    #[schema(example = "green")]
    pub status: String,
}

/// Query parameters for asset deletion.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct DeleteAssetQuery {
    /// "portal" (default) removes only the record; "permanent" also
    /// best-effort deletes the Drive file.
    pub mode: Option<String>,
}

/// Remote outcome of a permanent delete.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DriveDeletionOutcome {
    /// Whether the Drive file is gone (deleted now or already absent).
    pub deleted: bool,
    /// Failure detail when the remote delete did not succeed.
    pub error: Option<String>,
}

/// Response for asset deletion.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DeleteAssetResponse {
    pub ok: bool,
    /// Number of local records removed.
    pub deleted: u64,
    /// Present only for permanent mode on Drive-backed assets.
    pub drive: Option<DriveDeletionOutcome>,
}
