use std::collections::BTreeMap;
use std::path::Path;

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::errors::UmbraError;
use crate::policy::compiler::TagCompiler;
use crate::policy::types::{PolicyDefinitions, StaticGroups};
use crate::storage;
use crate::sync::{self, SyncReport};

/// On-disk policy file: the compiler inputs plus a static group directory.
///
/// The `groups` section backs the group lookups during compilation; callers
/// with a live directory skip this module and drive the compiler themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(flatten)]
    pub definitions: PolicyDefinitions,
    /// group name -> member usernames
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

/// Parse, compile, and synchronize a policy file into the store.
///
/// Every attempt is recorded in the sync run log, failures included, so an
/// operator can see when the store last changed and why a reload was
/// rejected. A failed compile leaves the store untouched.
pub async fn reload_from_file(
    db: &DatabaseConnection,
    path: &Path,
    max_depth: usize,
) -> Result<SyncReport, UmbraError> {
    let run_id = storage::start_sync_run(db).await.ok();

    match reload_inner(db, path, max_depth).await {
        Ok(report) => {
            if let Some(id) = run_id {
                let _ = storage::complete_sync_run(
                    db,
                    id,
                    true,
                    None,
                    Some(report.records_processed()),
                )
                .await;
            }
            Ok(report)
        }
        Err(e) => {
            if let Some(id) = run_id {
                let _ = storage::complete_sync_run(db, id, false, Some(e.to_string()), None).await;
            }
            Err(e)
        }
    }
}

async fn reload_inner(
    db: &DatabaseConnection,
    path: &Path,
    max_depth: usize,
) -> Result<SyncReport, UmbraError> {
    tracing::info!(path = %path.display(), "Loading policy definitions");

    let raw = std::fs::read_to_string(path)?;
    let file: PolicyFile = serde_yaml::from_str(&raw)?;

    tracing::info!(
        scopes = file.definitions.scopes.len(),
        roles = file.definitions.roles.len(),
        tags = file.definitions.tags.len(),
        groups = file.groups.len(),
        "Parsed policy definitions"
    );

    let groups = StaticGroups::new(file.groups);
    let compiled = TagCompiler::new(file.definitions)
        .with_max_depth(max_depth)
        .compile(&groups)?;

    sync::update(db, &compiled).await
}
