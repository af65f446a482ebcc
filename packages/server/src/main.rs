use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, info};

use server::config::AppConfig;
use server::database;
use server::services::drive::{DriveGateway, GoogleDriveApi};
use server::services::google::{
    GoogleTokenVerifier, SCOPE_DRIVE, SCOPE_SHEETS_READONLY, ServiceAccountTokens,
};
use server::services::roles::RoleResolver;
use server::services::sheets::{GoogleSheets, SheetCache};
use server::services::taxonomy::TaxonomyService;
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    let level = if config.server.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let db = database::init_db(&config.database.url).await?;

    let http = reqwest::Client::new();

    let sheets_tokens = Arc::new(ServiceAccountTokens::new(
        http.clone(),
        &config.google.service_account_email,
        &config.google.service_account_private_key,
        SCOPE_SHEETS_READONLY,
    )?);
    let drive_tokens = Arc::new(ServiceAccountTokens::new(
        http.clone(),
        &config.google.service_account_email,
        &config.google.service_account_private_key,
        SCOPE_DRIVE,
    )?);

    let taxonomy_sheets = Arc::new(SheetCache::new(
        Arc::new(GoogleSheets::new(
            http.clone(),
            sheets_tokens.clone(),
            &config.google.taxonomy_sheet_id,
        )),
        Duration::from_secs(config.cache.sheet_ttl_secs),
    ));
    let taxonomy = Arc::new(TaxonomyService::new(
        taxonomy_sheets,
        Duration::from_secs(config.cache.taxonomy_ttl_secs),
    ));

    let roles = Arc::new(RoleResolver::new(
        Arc::new(GoogleSheets::new(
            http.clone(),
            sheets_tokens,
            &config.google.roles_sheet_id,
        )),
        &config.google.roles_range,
        Duration::from_secs(config.cache.role_ttl_secs),
    ));

    let drive = Arc::new(DriveGateway::new(
        Arc::new(GoogleDriveApi::new(http.clone(), drive_tokens)),
        &config.google.drive_root_folder_id,
    ));

    let verifier = Arc::new(GoogleTokenVerifier::new(
        http,
        &config.auth.google_client_id,
    ));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = AppState {
        db,
        config: Arc::new(config),
        verifier,
        roles,
        taxonomy,
        drive,
    };

    let app = server::build_router(state);

    info!("API on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
