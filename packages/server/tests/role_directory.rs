use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use server::models::auth::Role;
use server::services::roles::RoleResolver;
use server::services::sheets::{SheetSource, SheetsError};

/// Two-column email→role directory, optionally failing.
struct Directory {
    rows: Vec<(String, String)>,
    calls: AtomicUsize,
    healthy: bool,
}

impl Directory {
    fn new(rows: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            rows: rows
                .iter()
                .map(|(e, r)| (e.to_string(), r.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
            healthy: true,
        })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            rows: Vec::new(),
            calls: AtomicUsize::new(0),
            healthy: false,
        })
    }
}

#[async_trait]
impl SheetSource for Directory {
    async fn values(&self, _range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy {
            return Err(SheetsError::Api("503 backend error".into()));
        }
        Ok(self
            .rows
            .iter()
            .map(|(e, r)| vec![e.clone(), r.clone()])
            .collect())
    }
}

const TTL: Duration = Duration::from_secs(300);

#[tokio::test]
async fn directory_roles_map_onto_the_closed_enum() {
    let resolver = RoleResolver::new(
        Directory::new(&[
            ("boss@pw.live", "admin"),
            ("reviewer@pw.live", "SME"),
            ("someone@pw.live", "user"),
            ("typo@pw.live", "administrator"),
        ]),
        "Roles!A2:B",
        TTL,
    );

    assert_eq!(resolver.role_for("boss@pw.live").await.unwrap(), Role::Admin);
    assert_eq!(resolver.role_for("reviewer@pw.live").await.unwrap(), Role::Sme);
    assert_eq!(resolver.role_for("someone@pw.live").await.unwrap(), Role::User);
    // Unrecognized role values fall back to plain user.
    assert_eq!(resolver.role_for("typo@pw.live").await.unwrap(), Role::User);
    // So do emails missing from the directory entirely.
    assert_eq!(resolver.role_for("ghost@pw.live").await.unwrap(), Role::User);
}

#[tokio::test]
async fn the_whole_directory_is_fetched_once_per_ttl_window() {
    let directory = Directory::new(&[("boss@pw.live", "admin")]);
    let resolver = RoleResolver::new(directory.clone(), "Roles!A2:B", TTL);

    for _ in 0..10 {
        resolver.role_for("boss@pw.live").await.unwrap();
    }
    assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_broken_directory_fails_lookups_rather_than_guessing() {
    let resolver = RoleResolver::new(Directory::broken(), "Roles!A2:B", TTL);
    assert!(resolver.role_for("boss@pw.live").await.is_err());
}
