use std::collections::{BTreeSet, HashMap};

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait};

use crate::entities;
use crate::errors::UmbraError;
use crate::policy::CompiledPolicy;

/// Row counts from one synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Staged name counts after the pass.
    pub tags: usize,
    pub users: usize,
    pub scopes: usize,
    /// Link row counts after the pass.
    pub grants: usize,
    pub owners: usize,
    /// Grant/owner rows inserted by this pass.
    pub added: u64,
    /// Rows deleted by this pass, across all five tables.
    pub removed: u64,
}

impl SyncReport {
    pub fn records_processed(&self) -> i64 {
        (self.grants + self.owners) as i64
    }
}

/// Replace the persisted policy state with `compiled`, in one transaction.
///
/// Stage, link, reconcile: upsert every staged name, re-link grant and owner
/// rows through the surrogate ids, then delete everything the compiled
/// output no longer contains. Running the same input twice is a no-op on the
/// second pass. Readers only ever observe the store from before or after the
/// commit.
pub async fn update(
    db: &DatabaseConnection,
    compiled: &CompiledPolicy,
) -> Result<SyncReport, UmbraError> {
    let txn = db.begin().await?;

    // Stage names. Tags come from grants and owners so owner-only tags get
    // rows too; the public sentinel is never staged because it is never a
    // key in either map.
    let mut tag_names: BTreeSet<&str> = compiled.grants.keys().map(String::as_str).collect();
    tag_names.extend(compiled.owners.keys().map(String::as_str));

    let mut user_names: BTreeSet<&str> = BTreeSet::new();
    for per_tag in compiled.grants.values() {
        user_names.extend(per_tag.keys().map(String::as_str));
    }
    for owners in compiled.owners.values() {
        user_names.extend(owners.iter().map(String::as_str));
    }

    let scope_names: BTreeSet<&str> = compiled.scopes.iter().map(String::as_str).collect();

    // Upsert by name; the only step that assigns or reuses surrogate ids.
    let tag_models: Vec<entities::tag::ActiveModel> = tag_names
        .iter()
        .map(|name| entities::tag::ActiveModel {
            name: Set(name.to_string()),
            is_public: Set(if compiled.public_tags.contains(*name) { 1 } else { 0 }),
            ..Default::default()
        })
        .collect();
    if !tag_models.is_empty() {
        entities::Tag::insert_many(tag_models)
            .on_conflict(
                OnConflict::column(entities::tag::Column::Name)
                    .update_column(entities::tag::Column::IsPublic)
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
    }

    let user_models: Vec<entities::user::ActiveModel> = user_names
        .iter()
        .map(|name| entities::user::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        })
        .collect();
    if !user_models.is_empty() {
        entities::User::insert_many(user_models)
            .on_conflict(
                OnConflict::column(entities::user::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
    }

    let scope_models: Vec<entities::scope::ActiveModel> = scope_names
        .iter()
        .map(|name| entities::scope::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        })
        .collect();
    if !scope_models.is_empty() {
        entities::Scope::insert_many(scope_models)
            .on_conflict(
                OnConflict::column(entities::scope::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
    }

    // Read back name -> id for everything, stale rows included; the stale
    // ids drive the reconcile deletes below.
    let tag_rows = entities::Tag::find().all(&txn).await?;
    let user_rows = entities::User::find().all(&txn).await?;
    let scope_rows = entities::Scope::find().all(&txn).await?;

    let tag_ids: HashMap<&str, i32> = tag_rows.iter().map(|m| (m.name.as_str(), m.id)).collect();
    let user_ids: HashMap<&str, i32> = user_rows.iter().map(|m| (m.name.as_str(), m.id)).collect();
    let scope_ids: HashMap<&str, i32> =
        scope_rows.iter().map(|m| (m.name.as_str(), m.id)).collect();

    // Materialize the fresh link rows through the surrogate ids.
    let mut fresh_grants: BTreeSet<(i32, i32, i32)> = BTreeSet::new();
    for (tag, per_user) in &compiled.grants {
        let tag_id = id_for(&tag_ids, "tag", tag)?;
        for (user, scopes) in per_user {
            let user_id = id_for(&user_ids, "user", user)?;
            for scope in scopes {
                fresh_grants.insert((tag_id, user_id, id_for(&scope_ids, "scope", scope)?));
            }
        }
    }

    let mut fresh_owners: BTreeSet<(i32, i32)> = BTreeSet::new();
    for (tag, users) in &compiled.owners {
        let tag_id = id_for(&tag_ids, "tag", tag)?;
        for user in users {
            fresh_owners.insert((tag_id, id_for(&user_ids, "user", user)?));
        }
    }

    let mut added: u64 = 0;
    let mut removed: u64 = 0;

    // Reconcile grants: drop rows the compiled output no longer contains,
    // insert the ones it gained.
    let existing_grants: BTreeSet<(i32, i32, i32)> = entities::Grant::find()
        .all(&txn)
        .await?
        .into_iter()
        .map(|g| (g.tag_id, g.user_id, g.scope_id))
        .collect();

    for (tag_id, user_id, scope_id) in existing_grants.difference(&fresh_grants) {
        let res = entities::Grant::delete_many()
            .filter(entities::grant::Column::TagId.eq(*tag_id))
            .filter(entities::grant::Column::UserId.eq(*user_id))
            .filter(entities::grant::Column::ScopeId.eq(*scope_id))
            .exec(&txn)
            .await?;
        removed += res.rows_affected;
    }

    let missing_grants: Vec<entities::grant::ActiveModel> = fresh_grants
        .difference(&existing_grants)
        .map(|(tag_id, user_id, scope_id)| entities::grant::ActiveModel {
            tag_id: Set(*tag_id),
            user_id: Set(*user_id),
            scope_id: Set(*scope_id),
        })
        .collect();
    added += missing_grants.len() as u64;
    if !missing_grants.is_empty() {
        entities::Grant::insert_many(missing_grants)
            .on_conflict(
                OnConflict::columns([
                    entities::grant::Column::TagId,
                    entities::grant::Column::UserId,
                    entities::grant::Column::ScopeId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
    }

    // Reconcile owners the same way.
    let existing_owners: BTreeSet<(i32, i32)> = entities::Owner::find()
        .all(&txn)
        .await?
        .into_iter()
        .map(|o| (o.tag_id, o.user_id))
        .collect();

    for (tag_id, user_id) in existing_owners.difference(&fresh_owners) {
        let res = entities::Owner::delete_many()
            .filter(entities::owner::Column::TagId.eq(*tag_id))
            .filter(entities::owner::Column::UserId.eq(*user_id))
            .exec(&txn)
            .await?;
        removed += res.rows_affected;
    }

    let missing_owners: Vec<entities::owner::ActiveModel> = fresh_owners
        .difference(&existing_owners)
        .map(|(tag_id, user_id)| entities::owner::ActiveModel {
            tag_id: Set(*tag_id),
            user_id: Set(*user_id),
        })
        .collect();
    added += missing_owners.len() as u64;
    if !missing_owners.is_empty() {
        entities::Owner::insert_many(missing_owners)
            .on_conflict(
                OnConflict::columns([
                    entities::owner::Column::TagId,
                    entities::owner::Column::UserId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
    }

    // Delete name rows that were not staged. Link rows referencing them are
    // already gone, so the deletes cannot orphan anything.
    let stale_tag_ids: Vec<i32> = tag_rows
        .iter()
        .filter(|m| !tag_names.contains(m.name.as_str()))
        .map(|m| m.id)
        .collect();
    if !stale_tag_ids.is_empty() {
        let res = entities::Tag::delete_many()
            .filter(entities::tag::Column::Id.is_in(stale_tag_ids))
            .exec(&txn)
            .await?;
        removed += res.rows_affected;
    }

    let stale_user_ids: Vec<i32> = user_rows
        .iter()
        .filter(|m| !user_names.contains(m.name.as_str()))
        .map(|m| m.id)
        .collect();
    if !stale_user_ids.is_empty() {
        let res = entities::User::delete_many()
            .filter(entities::user::Column::Id.is_in(stale_user_ids))
            .exec(&txn)
            .await?;
        removed += res.rows_affected;
    }

    let stale_scope_ids: Vec<i32> = scope_rows
        .iter()
        .filter(|m| !scope_names.contains(m.name.as_str()))
        .map(|m| m.id)
        .collect();
    if !stale_scope_ids.is_empty() {
        let res = entities::Scope::delete_many()
            .filter(entities::scope::Column::Id.is_in(stale_scope_ids))
            .exec(&txn)
            .await?;
        removed += res.rows_affected;
    }

    txn.commit().await?;

    let report = SyncReport {
        tags: tag_names.len(),
        users: user_names.len(),
        scopes: scope_names.len(),
        grants: fresh_grants.len(),
        owners: fresh_owners.len(),
        added,
        removed,
    };

    tracing::info!(
        tags = report.tags,
        users = report.users,
        scopes = report.scopes,
        grants = report.grants,
        owners = report.owners,
        added = report.added,
        removed = report.removed,
        "Policy store synchronized"
    );

    Ok(report)
}

fn id_for(ids: &HashMap<&str, i32>, kind: &str, name: &str) -> Result<i32, UmbraError> {
    ids.get(name)
        .copied()
        .ok_or_else(|| UmbraError::Other(format!("{kind} `{name}` has no row after staging")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    /// Test database helper that keeps temp file alive
    struct TestDb {
        connection: DatabaseConnection,
        _temp_file: NamedTempFile,
    }

    impl TestDb {
        async fn new() -> Self {
            let temp_file = NamedTempFile::new().expect("Failed to create temp file");
            let db_path = temp_file.path().to_str().expect("Invalid temp file path");
            let db_url = format!("sqlite://{}?mode=rwc", db_path);

            let connection = Database::connect(&db_url)
                .await
                .expect("Failed to connect to test database");

            migration::Migrator::up(&connection, None)
                .await
                .expect("Failed to run migrations");

            Self {
                connection,
                _temp_file: temp_file,
            }
        }

        fn connection(&self) -> &DatabaseConnection {
            &self.connection
        }
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// reports: alice gets read; open: public, no grants; reports owned by carol.
    fn sample_policy() -> CompiledPolicy {
        let mut compiled = CompiledPolicy {
            scopes: set(&["read", "write"]),
            ..Default::default()
        };
        compiled.public_tags.insert("public".to_string());
        compiled.public_tags.insert("open".to_string());
        compiled.grants.insert(
            "reports".to_string(),
            BTreeMap::from([("alice".to_string(), set(&["read"]))]),
        );
        compiled.grants.insert("open".to_string(), BTreeMap::new());
        compiled
            .owners
            .insert("reports".to_string(), set(&["carol"]));
        compiled
    }

    async fn tag_names(db: &DatabaseConnection) -> BTreeSet<String> {
        entities::Tag::find()
            .all(db)
            .await
            .expect("Query failed")
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    async fn user_names(db: &DatabaseConnection) -> BTreeSet<String> {
        entities::User::find()
            .all(db)
            .await
            .expect("Query failed")
            .into_iter()
            .map(|u| u.name)
            .collect()
    }

    async fn scope_names(db: &DatabaseConnection) -> BTreeSet<String> {
        entities::Scope::find()
            .all(db)
            .await
            .expect("Query failed")
            .into_iter()
            .map(|s| s.name)
            .collect()
    }

    #[tokio::test]
    async fn test_update_stages_all_tables() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let report = update(db, &sample_policy()).await.expect("Sync failed");

        assert_eq!(tag_names(db).await, set(&["open", "reports"]));
        assert_eq!(user_names(db).await, set(&["alice", "carol"]));
        assert_eq!(scope_names(db).await, set(&["read", "write"]));

        let grants = entities::Grant::find().all(db).await.expect("Query failed");
        assert_eq!(grants.len(), 1);
        let owners = entities::Owner::find().all(db).await.expect("Query failed");
        assert_eq!(owners.len(), 1);

        assert_eq!(report.tags, 2);
        assert_eq!(report.users, 2);
        assert_eq!(report.scopes, 2);
        assert_eq!(report.added, 2);
        assert_eq!(report.removed, 0);
    }

    #[tokio::test]
    async fn test_update_does_not_stage_the_sentinel() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        update(db, &sample_policy()).await.expect("Sync failed");

        // "public" is in public_tags but never a grants/owners key.
        assert!(!tag_names(db).await.contains("public"));
    }

    #[tokio::test]
    async fn test_update_sets_public_flag() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        update(db, &sample_policy()).await.expect("Sync failed");

        let tags: BTreeMap<String, i64> = entities::Tag::find()
            .all(db)
            .await
            .expect("Query failed")
            .into_iter()
            .map(|t| (t.name, t.is_public))
            .collect();
        assert_eq!(tags["open"], 1);
        assert_eq!(tags["reports"], 0);
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let policy = sample_policy();
        update(db, &policy).await.expect("First sync failed");

        let tags_before = tag_names(db).await;
        let report = update(db, &policy).await.expect("Second sync failed");

        assert_eq!(report.added, 0);
        assert_eq!(report.removed, 0);
        assert_eq!(tag_names(db).await, tags_before);
    }

    #[tokio::test]
    async fn test_update_replaces_removed_tag() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        update(db, &sample_policy()).await.expect("First sync failed");

        // Second policy drops "reports" (and with it alice, carol) and the
        // "write" scope.
        let mut next = CompiledPolicy {
            scopes: set(&["read"]),
            ..Default::default()
        };
        next.public_tags.insert("public".to_string());
        next.public_tags.insert("open".to_string());
        next.grants.insert("open".to_string(), BTreeMap::new());

        let report = update(db, &next).await.expect("Second sync failed");

        assert_eq!(tag_names(db).await, set(&["open"]));
        assert_eq!(user_names(db).await, set(&[]));
        assert_eq!(scope_names(db).await, set(&["read"]));
        assert!(entities::Grant::find()
            .all(db)
            .await
            .expect("Query failed")
            .is_empty());
        assert!(entities::Owner::find()
            .all(db)
            .await
            .expect("Query failed")
            .is_empty());
        // reports tag + alice + carol + write scope + grant + owner
        assert_eq!(report.removed, 6);
    }

    #[tokio::test]
    async fn test_update_flips_public_flag_off() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        update(db, &sample_policy()).await.expect("First sync failed");

        let mut next = sample_policy();
        next.public_tags.remove("open");
        update(db, &next).await.expect("Second sync failed");

        let open = entities::Tag::find()
            .filter(entities::tag::Column::Name.eq("open"))
            .one(db)
            .await
            .expect("Query failed")
            .expect("Tag missing");
        assert_eq!(open.is_public, 0);
    }

    #[tokio::test]
    async fn test_update_keeps_unreferenced_scopes() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        // "write" appears in no grant but is part of the universe.
        update(db, &sample_policy()).await.expect("First sync failed");
        update(db, &sample_policy()).await.expect("Second sync failed");

        assert!(scope_names(db).await.contains("write"));
    }

    #[tokio::test]
    async fn test_update_owner_only_tag_gets_a_row() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let mut compiled = CompiledPolicy::default();
        compiled.public_tags.insert("public".to_string());
        compiled
            .owners
            .insert("archive".to_string(), set(&["dave"]));

        update(db, &compiled).await.expect("Sync failed");

        assert_eq!(tag_names(db).await, set(&["archive"]));
        assert_eq!(user_names(db).await, set(&["dave"]));
    }

    #[tokio::test]
    async fn test_update_reuses_surrogate_ids() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        update(db, &sample_policy()).await.expect("First sync failed");
        let before: BTreeMap<String, i32> = entities::Tag::find()
            .all(db)
            .await
            .expect("Query failed")
            .into_iter()
            .map(|t| (t.name, t.id))
            .collect();

        update(db, &sample_policy()).await.expect("Second sync failed");
        let after: BTreeMap<String, i32> = entities::Tag::find()
            .all(db)
            .await
            .expect("Query failed")
            .into_iter()
            .map(|t| (t.name, t.id))
            .collect();

        assert_eq!(before, after);
    }
}
