use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::cache::{Clock, SystemClock, TtlCell};

use crate::models::auth::Role;

use super::sheets::{SheetSource, SheetsError};

/// Resolves a user's role from the spreadsheet-backed directory.
///
/// The whole email→role map is fetched in one read and cached for the TTL
/// (5 minutes in production). Lookup misses are not errors: unknown emails
/// are plain `user`s. A failed refetch after expiry does propagate; there
/// is deliberately no stale-cache fallback.
pub struct RoleResolver {
    source: Arc<dyn SheetSource>,
    range: String,
    cache: TtlCell<HashMap<String, Role>>,
}

impl RoleResolver {
    pub fn new(source: Arc<dyn SheetSource>, range: &str, ttl: Duration) -> Self {
        Self::with_clock(source, range, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        source: Arc<dyn SheetSource>,
        range: &str,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            range: range.to_string(),
            cache: TtlCell::with_clock(ttl, clock),
        }
    }

    /// Returns the role for an email, defaulting to [`Role::User`].
    pub async fn role_for(&self, email: &str) -> Result<Role, SheetsError> {
        let map = match self.cache.get() {
            Some(map) => map,
            None => {
                let fetched = self.fetch().await?;
                self.cache.put(fetched)
            }
        };
        Ok(map
            .get(&email.trim().to_lowercase())
            .copied()
            .unwrap_or(Role::User))
    }

    async fn fetch(&self) -> Result<HashMap<String, Role>, SheetsError> {
        let rows = self.source.values(&self.range).await?;

        let mut map = HashMap::new();
        for row in rows {
            let email = row.first().map(|c| c.trim().to_lowercase()).unwrap_or_default();
            if email.is_empty() {
                continue;
            }
            // Unknown role values are dropped; the email then defaults to
            // `user` at lookup time.
            if let Some(role) = row.get(1).and_then(|r| Role::parse(r)) {
                map.insert(email, role);
            }
        }
        tracing::debug!(entries = map.len(), "role directory refreshed");
        Ok(map)
    }
}
