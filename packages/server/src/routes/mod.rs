use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers;
use crate::state::AppState;

pub fn api_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::health))
        .nest("/auth", auth_routes())
        .nest("/assets", asset_routes())
        .nest("/taxonomy", taxonomy_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::google_login))
        .routes(routes!(handlers::auth::me))
        .routes(routes!(handlers::auth::logout))
}

fn asset_routes() -> OpenApiRouter<AppState> {
    let crud = OpenApiRouter::new()
        .routes(routes!(handlers::assets::list_assets))
        .routes(routes!(handlers::assets::get_asset_file))
        .routes(routes!(handlers::assets::assign_asset))
        .routes(routes!(handlers::assets::comment_asset))
        .routes(routes!(handlers::assets::pass_asset))
        .routes(routes!(handlers::assets::set_asset_approval))
        .routes(routes!(handlers::assets::delete_asset))
        .routes(routes!(handlers::assets::record_download));

    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::assets::create_asset))
        .layer(handlers::assets::upload_body_limit());

    crud.merge(upload)
}

fn taxonomy_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::taxonomy::list_grades))
        .routes(routes!(handlers::taxonomy::list_subjects))
        .routes(routes!(handlers::taxonomy::list_chapters))
        .routes(routes!(handlers::taxonomy::list_topics))
        .routes(routes!(handlers::taxonomy::list_subtopics))
        .routes(routes!(handlers::taxonomy::list_art_styles))
        .routes(routes!(handlers::taxonomy::generate_title))
        .routes(routes!(handlers::taxonomy::refresh_taxonomy))
}
