use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr};
use sea_orm::*;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::instrument;
use uuid::Uuid;

use crate::entity::asset;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::asset::*;
use crate::models::auth::Role;
use crate::models::shared::{OkResponse, escape_like};
use crate::services::drive::DeleteOutcome;
use crate::state::AppState;
use crate::utils::filename::{download_name, sanitize_upload_name};

/// Uploads are images only, capped at 10 MB.
const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

pub fn upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(12 * 1024 * 1024) // file cap plus multipart overhead
}

fn link_base(state: &AppState) -> &str {
    state.config.server.public_base_url.trim_end_matches('/')
}

async fn find_asset<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<asset::Model, AppError> {
    asset::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Asset not found".into()))
}

fn parse_asset_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation("Invalid asset ID".into()))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Assets",
    operation_id = "listAssets",
    summary = "List assets",
    description = "Returns assets newest-first. `q` is matched case-insensitively against \
        title, tags and uploader email. SMEs only see admin-authored assets.",
    params(AssetListQuery),
    responses(
        (status = 200, description = "Asset list", body = AssetListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_assets(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AssetListQuery>,
) -> Result<Json<AssetListResponse>, AppError> {
    let mut select = asset::Entity::find();

    if let Some(ref q) = query.q {
        let term = escape_like(q.trim());
        if !term.is_empty() {
            let pattern = format!("%{}%", term.to_lowercase());
            select = select.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(asset::Column::Title)))
                            .like(LikeExpr::new(pattern.clone()).escape('\\')),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(asset::Column::UploadedBy)))
                            .like(LikeExpr::new(pattern.clone()).escape('\\')),
                    )
                    .add(Expr::cust_with_values(
                        "LOWER(CAST(tags AS TEXT)) LIKE ?",
                        [pattern],
                    )),
            );
        }
    }

    if auth_user.role == Role::Sme {
        select = select.filter(asset::Column::UploaderRole.eq(Role::Admin.as_str()));
    }

    let models = select
        .order_by_desc(asset::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let base = link_base(&state).to_string();
    Ok(Json(AssetListResponse {
        items: models
            .into_iter()
            .map(|m| AssetResponse::from_model(m, &base))
            .collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Assets",
    operation_id = "createAsset",
    summary = "Upload a new asset",
    description = "Admin only. Multipart body with a `file` image field and a `meta` JSON \
        field. The six taxonomy fields are required; the file lands in the matching Drive \
        folder path and the record defaults to review status `allotted`.",
    request_body(content_type = "multipart/form-data", description = "Image file plus metadata"),
    responses(
        (status = 201, description = "Asset created", body = AssetItemResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 502, description = "Drive failure (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, multipart), fields(uploader = %auth_user.email))]
pub async fn create_asset(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_role(&[Role::Admin])?;

    let mut file: Option<(String, Option<String>, std::path::PathBuf)> = None;
    let mut meta: Option<CreateAssetMeta> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let original_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
                let content_type = field.content_type().map(str::to_string);
                if !content_type.as_deref().unwrap_or_default().starts_with("image/") {
                    return Err(AppError::Validation("Only image files are allowed".into()));
                }
                let temp_path = stream_field_to_temp(field).await?;
                file = Some((original_name, content_type, temp_path));
            }
            Some("meta") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read meta: {e}")))?;
                meta = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| AppError::Validation(format!("Invalid meta JSON: {e}")))?,
                );
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let (original_name, content_type, temp_path) =
        file.ok_or_else(|| AppError::Validation("file required".into()))?;
    let meta = meta.unwrap_or_default();

    let result = create_from_upload(
        &state,
        &auth_user,
        meta,
        &original_name,
        content_type.as_deref(),
        &temp_path,
    )
    .await;

    // Best effort.
    let _ = tokio::fs::remove_file(&temp_path).await;

    let model = result?;
    let base = link_base(&state).to_string();
    Ok((
        StatusCode::CREATED,
        Json(AssetItemResponse {
            item: AssetResponse::from_model(model, &base),
        }),
    ))
}

async fn create_from_upload(
    state: &AppState,
    auth_user: &AuthUser,
    meta: CreateAssetMeta,
    original_name: &str,
    content_type: Option<&str>,
    temp_path: &std::path::Path,
) -> Result<asset::Model, AppError> {
    meta.validate()?;

    let segments: Vec<String> = [
        &meta.grade,
        &meta.subject,
        &meta.chapter,
        &meta.topic,
        &meta.subtopic,
        &meta.art_style,
    ]
    .iter()
    .map(|s| s.as_deref().unwrap_or_default().trim().to_string())
    .collect();

    tracing::debug!(path = %segments.join(" / "), "building Drive folder path");
    let folder_id = state.drive.ensure_folder_path(&segments).await?;

    let upload = state
        .drive
        .upload_file(
            &folder_id,
            temp_path,
            Some(&sanitize_upload_name(original_name)),
            content_type,
        )
        .await?;
    tracing::debug!(
        file_id = %upload.file_id,
        folder_id = %folder_id,
        mime_type = %upload.mime_type,
        "uploaded to Drive"
    );

    let asset_type = match meta.asset_type.as_deref() {
        None | Some("") => AssetType::Photo,
        Some(raw) => AssetType::parse(raw)
            .ok_or_else(|| AppError::Validation(format!("Unknown asset type: {raw}")))?,
    };

    let title = meta
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| meta.subtopic.clone())
        .unwrap_or_else(|| "Untitled".to_string());

    let thumb = upload.public_thumb_url.clone();
    let now = Utc::now();

    let mut record = asset::ActiveModel {
        id: Set(Uuid::now_v7()),
        title: Set(title),
        asset_type: Set(asset_type.as_str().to_string()),
        tags: Set(serde_json::json!(meta.tags)),
        thumb: Set(thumb.clone()),
        url: Set(Some(thumb)),
        drive_file_id: Set(Some(upload.file_id.clone())),
        drive_folder_id: Set(Some(folder_id)),
        drive_web_view_link: Set(upload.web_view_link.clone()),
        drive_web_content_link: Set(upload.web_content_link.clone()),
        mime_type: Set(Some(upload.mime_type.clone())),
        uploaded_by: Set(auth_user.email.clone()),
        uploader_role: Set(auth_user.role.as_str().to_string()),
        created_at: Set(now),
        downloads: Set(0),
        views: Set(0),
        grade: Set(meta.grade),
        stream: Set(meta.stream),
        subject: Set(meta.subject),
        chapter: Set(meta.chapter),
        topic: Set(meta.topic),
        subtopic: Set(meta.subtopic),
        art_style: Set(meta.art_style),
        version: Set(meta.version),
        code: Set(meta.code),
        folder_path: Set(Some(segments.join("/"))),
        ..Default::default()
    };
    write_approval(&mut record, &Approval::yellow());
    // Admin uploads enter review immediately; anything else starts with no
    // review cycle at all.
    if auth_user.role == Role::Admin {
        write_review(&mut record, &Review::allotted());
    }

    Ok(record.insert(&state.db).await?)
}

/// Query parameters for the file endpoint.
#[derive(serde::Deserialize, utoipa::IntoParams)]
pub struct FileQuery {
    /// Pass `1` to force a download (attachment disposition).
    pub download: Option<String>,
    /// Short alias for `download`.
    pub dl: Option<String>,
}

#[utoipa::path(
    get,
    path = "/{id}/file",
    tag = "Assets",
    operation_id = "getAssetFile",
    summary = "Stream or redirect to the asset content",
    description = "Drive-backed assets are streamed (bumping the download counter); other \
        assets redirect to their stored absolute URL.",
    params(("id" = String, Path, description = "Asset ID"), FileQuery),
    responses(
        (status = 200, description = "File content"),
        (status = 307, description = "Redirect to the stored URL"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Asset or file not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, _auth_user, query), fields(asset_id = %id))]
pub async fn get_asset_file(
    // Requires a session; any role may fetch content.
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Response, AppError> {
    let id = parse_asset_id(&id)?;
    let model = find_asset(&state.db, id).await?;

    let force_download = query.download.as_deref() == Some("1")
        || query.dl.as_deref() == Some("1");

    let Some(file_id) = model.drive_file_id.clone() else {
        let link = model
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| model.thumb.clone());
        let lower = link.to_ascii_lowercase();
        if !force_download && (lower.starts_with("http://") || lower.starts_with("https://")) {
            return Ok(Redirect::temporary(&link).into_response());
        }
        return Err(AppError::NotFound("file not available".into()));
    };

    // Bump the counter without blocking the stream.
    let db = state.db.clone();
    tokio::spawn(async move {
        let _ = asset::Entity::update_many()
            .col_expr(
                asset::Column::Downloads,
                Expr::col(asset::Column::Downloads).add(1),
            )
            .filter(asset::Column::Id.eq(id))
            .exec(&db)
            .await;
    });

    let (drive_mime, reader) = state.drive.download(&file_id).await?;
    let content_type = model
        .mime_type
        .clone()
        .or(drive_mime)
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let disposition = if force_download {
        let extension = mime_guess::get_mime_extensions_str(&content_type)
            .and_then(|exts| exts.first())
            .copied();
        format!(
            "attachment; filename=\"{}\"",
            download_name(&model.title, extension)
        )
    } else {
        "inline".to_string()
    };

    let body = Body::from_stream(ReaderStream::new(reader));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

#[utoipa::path(
    post,
    path = "/{id}/assign",
    tag = "Assets",
    operation_id = "assignAsset",
    summary = "Assign the asset to an SME for review",
    description = "Admin only. Sets review status to `allotted` and replaces the assignee; \
        allowed from any current review state.",
    params(("id" = String, Path, description = "Asset ID")),
    request_body = AssignRequest,
    responses(
        (status = 200, description = "Updated asset", body = AssetItemResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Asset not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, payload), fields(asset_id = %id))]
pub async fn assign_asset(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<AssignRequest>,
) -> Result<Json<AssetItemResponse>, AppError> {
    auth_user.require_role(&[Role::Admin])?;

    let id = parse_asset_id(&id)?;
    let model = find_asset(&state.db, id).await?;

    let review = Review::assigned(
        Review::from_model(&model),
        payload.assigned_to,
        payload.assigned_to_name,
    );
    update_review(&state, model, &review).await
}

#[utoipa::path(
    post,
    path = "/{id}/comment",
    tag = "Assets",
    operation_id = "commentAsset",
    summary = "Record an SME review comment",
    params(("id" = String, Path, description = "Asset ID")),
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Updated asset", body = AssetItemResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Asset not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, payload), fields(asset_id = %id))]
pub async fn comment_asset(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<CommentRequest>,
) -> Result<Json<AssetItemResponse>, AppError> {
    auth_user.require_role(&[Role::Sme])?;

    let id = parse_asset_id(&id)?;
    let model = find_asset(&state.db, id).await?;

    let review = Review::commented(
        Review::from_model(&model),
        payload.comment,
        &auth_user.email,
        Some(auth_user.name.as_str()),
        Utc::now(),
    );
    update_review(&state, model, &review).await
}

#[utoipa::path(
    post,
    path = "/{id}/pass",
    tag = "Assets",
    operation_id = "passAsset",
    summary = "Mark the review as passed",
    params(("id" = String, Path, description = "Asset ID")),
    responses(
        (status = 200, description = "Updated asset", body = AssetItemResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Asset not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user), fields(asset_id = %id))]
pub async fn pass_asset(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AssetItemResponse>, AppError> {
    auth_user.require_role(&[Role::Sme])?;

    let id = parse_asset_id(&id)?;
    let model = find_asset(&state.db, id).await?;

    let review = Review::passed(
        Review::from_model(&model),
        &auth_user.email,
        Some(auth_user.name.as_str()),
        Utc::now(),
    );
    update_review(&state, model, &review).await
}

async fn update_review(
    state: &AppState,
    model: asset::Model,
    review: &Review,
) -> Result<Json<AssetItemResponse>, AppError> {
    let mut am = asset::ActiveModel {
        id: Set(model.id),
        ..Default::default()
    };
    write_review(&mut am, review);
    let updated = am.update(&state.db).await?;

    let base = link_base(state).to_string();
    Ok(Json(AssetItemResponse {
        item: AssetResponse::from_model(updated, &base),
    }))
}

#[utoipa::path(
    patch,
    path = "/{id}/approval",
    tag = "Assets",
    operation_id = "setAssetApproval",
    summary = "Toggle the approval gate",
    description = "SME only. `green` records the approver and timestamp; `yellow` clears \
        both. Any other status value is rejected without touching the asset.",
    params(("id" = String, Path, description = "Asset ID")),
    request_body = ApprovalRequest,
    responses(
        (status = 200, description = "Updated asset", body = AssetItemResponse),
        (status = 400, description = "Invalid status (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Asset not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, payload), fields(asset_id = %id))]
pub async fn set_asset_approval(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<ApprovalRequest>,
) -> Result<Json<AssetItemResponse>, AppError> {
    auth_user.require_role(&[Role::Sme])?;

    let status = ApprovalStatus::parse(&payload.status)
        .ok_or_else(|| AppError::Validation("invalid status".into()))?;

    let id = parse_asset_id(&id)?;
    let model = find_asset(&state.db, id).await?;

    let approval = match status {
        ApprovalStatus::Green => Approval::green(&auth_user.email, Utc::now()),
        ApprovalStatus::Yellow => Approval::yellow(),
    };

    let mut am = asset::ActiveModel {
        id: Set(model.id),
        ..Default::default()
    };
    write_approval(&mut am, &approval);
    let updated = am.update(&state.db).await?;

    let base = link_base(&state).to_string();
    Ok(Json(AssetItemResponse {
        item: AssetResponse::from_model(updated, &base),
    }))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Assets",
    operation_id = "deleteAsset",
    summary = "Delete an asset",
    description = "Admin only. `mode=permanent` first best-effort deletes the Drive file \
        and reports the remote outcome; the local record is removed either way.",
    params(("id" = String, Path, description = "Asset ID"), DeleteAssetQuery),
    responses(
        (status = 200, description = "Deletion result", body = DeleteAssetResponse),
        (status = 400, description = "Unknown mode (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Asset not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user, query), fields(asset_id = %id))]
pub async fn delete_asset(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteAssetQuery>,
) -> Result<Json<DeleteAssetResponse>, AppError> {
    auth_user.require_role(&[Role::Admin])?;

    let permanent = match query.mode.as_deref() {
        None | Some("portal") => false,
        Some("permanent") => true,
        Some(other) => {
            return Err(AppError::Validation(format!("Unknown delete mode: {other}")));
        }
    };

    let id = parse_asset_id(&id)?;
    let model = find_asset(&state.db, id).await?;

    // The remote outcome is reported, never fatal: the portal record goes
    // away regardless.
    let drive = match (permanent, model.drive_file_id.as_deref()) {
        (true, Some(file_id)) => Some(match state.drive.delete_file(file_id).await {
            Ok(DeleteOutcome::Deleted) | Ok(DeleteOutcome::AlreadyGone) => DriveDeletionOutcome {
                deleted: true,
                error: None,
            },
            Err(err) => {
                tracing::warn!(file_id, error = %err, "Drive delete failed; removing record anyway");
                DriveDeletionOutcome {
                    deleted: false,
                    error: Some(err.to_string()),
                }
            }
        }),
        _ => None,
    };

    let result = asset::Entity::delete_by_id(id).exec(&state.db).await?;

    Ok(Json(DeleteAssetResponse {
        ok: true,
        deleted: result.rows_affected,
        drive,
    }))
}

#[utoipa::path(
    post,
    path = "/{id}/download",
    tag = "Assets",
    operation_id = "recordAssetDownload",
    summary = "Record a download",
    params(("id" = String, Path, description = "Asset ID")),
    responses(
        (status = 200, description = "Counter bumped", body = OkResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, _auth_user), fields(asset_id = %id))]
pub async fn record_download(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, AppError> {
    let id = parse_asset_id(&id)?;
    asset::Entity::update_many()
        .col_expr(
            asset::Column::Downloads,
            Expr::col(asset::Column::Downloads).add(1),
        )
        .filter(asset::Column::Id.eq(id))
        .exec(&state.db)
        .await?;
    Ok(Json(OkResponse::new()))
}

/// Stream a multipart field to a temp file, enforcing the image size cap.
async fn stream_field_to_temp(
    mut field: axum::extract::multipart::Field<'_>,
) -> Result<std::path::PathBuf, AppError> {
    let temp_path = std::env::temp_dir().join(format!("creativehub-upload-{}", Uuid::new_v4()));

    let result = async {
        let mut temp_file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;

        let mut total_size: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
        {
            total_size += chunk.len() as u64;
            if total_size > MAX_IMAGE_BYTES {
                return Err(AppError::Validation(format!(
                    "File exceeds maximum size of {MAX_IMAGE_BYTES} bytes"
                )));
            }
            temp_file
                .write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
        }

        temp_file
            .flush()
            .await
            .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;
        Ok(())
    }
    .await;

    if let Err(err) = result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err);
    }
    Ok(temp_path)
}
