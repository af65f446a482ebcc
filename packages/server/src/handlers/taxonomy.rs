use axum::{Json, extract::Query, extract::State};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::auth::Role;
use crate::models::shared::OkResponse;
use crate::models::taxonomy::{
    ChaptersQuery, SelectionIds, SubjectsQuery, SubtopicsQuery, TitleResponse, TopicsQuery,
};
use crate::services::taxonomy::{ArtStyle, Chapter, Grade, Subject, Subtopic, TaxonomyService, Topic};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/grades",
    tag = "Taxonomy",
    operation_id = "listGrades",
    summary = "List active grades",
    responses(
        (status = 200, description = "Grades sorted by sort_order", body = [Grade]),
        (status = 502, description = "Sheet read failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn list_grades(State(state): State<AppState>) -> Result<Json<Vec<Grade>>, AppError> {
    Ok(Json(state.taxonomy.grades().await?))
}

#[utoipa::path(
    get,
    path = "/subjects",
    tag = "Taxonomy",
    operation_id = "listSubjects",
    summary = "List active subjects for a grade",
    params(SubjectsQuery),
    responses(
        (status = 200, description = "Subjects of the grade", body = [Subject]),
        (status = 502, description = "Sheet read failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_subjects(
    State(state): State<AppState>,
    Query(query): Query<SubjectsQuery>,
) -> Result<Json<Vec<Subject>>, AppError> {
    let grade_id = query.grade_id.unwrap_or_default();
    Ok(Json(state.taxonomy.subjects(&grade_id).await?))
}

#[utoipa::path(
    get,
    path = "/chapters",
    tag = "Taxonomy",
    operation_id = "listChapters",
    summary = "List active chapters for a subject",
    params(ChaptersQuery),
    responses(
        (status = 200, description = "Chapters of the subject", body = [Chapter]),
        (status = 502, description = "Sheet read failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_chapters(
    State(state): State<AppState>,
    Query(query): Query<ChaptersQuery>,
) -> Result<Json<Vec<Chapter>>, AppError> {
    let subject_id = query.subject_id.unwrap_or_default();
    Ok(Json(state.taxonomy.chapters(&subject_id).await?))
}

#[utoipa::path(
    get,
    path = "/topics",
    tag = "Taxonomy",
    operation_id = "listTopics",
    summary = "List active topics for a chapter",
    params(TopicsQuery),
    responses(
        (status = 200, description = "Topics of the chapter", body = [Topic]),
        (status = 502, description = "Sheet read failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_topics(
    State(state): State<AppState>,
    Query(query): Query<TopicsQuery>,
) -> Result<Json<Vec<Topic>>, AppError> {
    let chapter_id = query.chapter_id.unwrap_or_default();
    Ok(Json(state.taxonomy.topics(&chapter_id).await?))
}

#[utoipa::path(
    get,
    path = "/subtopics",
    tag = "Taxonomy",
    operation_id = "listSubtopics",
    summary = "List active subtopics for a topic",
    params(SubtopicsQuery),
    responses(
        (status = 200, description = "Subtopics of the topic", body = [Subtopic]),
        (status = 502, description = "Sheet read failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_subtopics(
    State(state): State<AppState>,
    Query(query): Query<SubtopicsQuery>,
) -> Result<Json<Vec<Subtopic>>, AppError> {
    let topic_id = query.topic_id.unwrap_or_default();
    Ok(Json(state.taxonomy.subtopics(&topic_id).await?))
}

#[utoipa::path(
    get,
    path = "/artstyles",
    tag = "Taxonomy",
    operation_id = "listArtStyles",
    summary = "List active art styles",
    responses(
        (status = 200, description = "Art styles sorted by sort_order", body = [ArtStyle]),
        (status = 502, description = "Sheet read failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn list_art_styles(
    State(state): State<AppState>,
) -> Result<Json<Vec<ArtStyle>>, AppError> {
    Ok(Json(state.taxonomy.art_styles().await?))
}

#[utoipa::path(
    post,
    path = "/generate-title",
    tag = "Taxonomy",
    operation_id = "generateTitle",
    summary = "Preview the default title for a selection",
    description = "Validates that the six ids form a connected path through the hierarchy, \
        then composes the acronym-safe default title.",
    request_body = SelectionIds,
    responses(
        (status = 200, description = "Generated title", body = TitleResponse),
        (status = 400, description = "Invalid selection (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, _auth_user, payload))]
pub async fn generate_title(
    // Any authenticated user may preview titles; no role gate.
    _auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<SelectionIds>,
) -> Result<Json<TitleResponse>, AppError> {
    let selection = state.taxonomy.resolve_selection(&payload).await?;
    Ok(Json(TitleResponse {
        title: TaxonomyService::generate_title(&selection),
    }))
}

#[utoipa::path(
    post,
    path = "/refresh",
    tag = "Taxonomy",
    operation_id = "refreshTaxonomy",
    summary = "Force a taxonomy reload",
    description = "Admin only; reloads the six tabs immediately, ignoring the cache TTL. \
        Use after editing the sheet.",
    responses(
        (status = 200, description = "Reloaded", body = OkResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 502, description = "Sheet read failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, auth_user))]
pub async fn refresh_taxonomy(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<OkResponse>, AppError> {
    auth_user.require_role(&[Role::Admin])?;
    state.taxonomy.refresh().await?;
    Ok(Json(OkResponse::new()))
}
