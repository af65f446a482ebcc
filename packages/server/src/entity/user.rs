use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Secondary directory record, upserted at login.
///
/// Authorization never reads `role` from here; the Role Resolver is the
/// source of truth. The stored value mirrors the resolver's answer at the
/// user's last login.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Stored lowercased; uniqueness is effectively case-insensitive.
    #[sea_orm(unique)]
    pub email: String,
    pub name: Option<String>,
    pub role: String,

    pub last_login_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
