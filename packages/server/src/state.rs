use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::services::drive::DriveGateway;
use crate::services::google::IdTokenVerifier;
use crate::services::roles::RoleResolver;
use crate::services::taxonomy::TaxonomyService;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub verifier: Arc<dyn IdTokenVerifier>,
    pub roles: Arc<RoleResolver>,
    pub taxonomy: Arc<TaxonomyService>,
    pub drive: Arc<DriveGateway>,
}
