use crate::entities;
use crate::errors::UmbraError;
use crate::settings::Database as DbCfg;
use chrono::Utc;
use migration::MigratorTrait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};

/// Connect to the policy store, switch SQLite to a write-ahead journal, and
/// apply pending migrations.
///
/// WAL keeps readers off the writer's lock: a reader connected to the same
/// database file proceeds while a synchronization transaction is open. The
/// journal mode is persistent, so setting it once here covers connections
/// opened later by readers.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, UmbraError> {
    let db = Database::connect(&cfg.url).await?;

    if db.get_database_backend() == DatabaseBackend::Sqlite {
        db.execute_unprepared("PRAGMA journal_mode = WAL").await?;
    }

    migration::Migrator::up(&db, None).await?;

    Ok(db)
}

/// Record the start of a policy synchronization run
pub async fn start_sync_run(db: &DatabaseConnection) -> Result<i64, UmbraError> {
    use entities::sync_run;

    let now = Utc::now().timestamp();

    let run = sync_run::ActiveModel {
        started_at: Set(now),
        ..Default::default()
    };

    let result = run.insert(db).await?;
    Ok(result.id)
}

/// Record the completion of a policy synchronization run
pub async fn complete_sync_run(
    db: &DatabaseConnection,
    run_id: i64,
    success: bool,
    error_message: Option<String>,
    records_processed: Option<i64>,
) -> Result<(), UmbraError> {
    use entities::sync_run::{Column, Entity};

    let now = Utc::now().timestamp();

    if let Some(run) = Entity::find().filter(Column::Id.eq(run_id)).one(db).await? {
        let mut active: entities::sync_run::ActiveModel = run.into_active_model();
        active.completed_at = Set(Some(now));
        active.success = Set(Some(if success { 1 } else { 0 }));
        active.error_message = Set(error_message);
        active.records_processed = Set(records_processed);
        active.update(db).await?;
    }

    Ok(())
}

/// Most recent synchronization runs, newest first
pub async fn recent_sync_runs(
    db: &DatabaseConnection,
    limit: u64,
) -> Result<Vec<entities::sync_run::Model>, UmbraError> {
    use entities::sync_run::{Column, Entity};

    let runs = Entity::find()
        .order_by_desc(Column::Id)
        .limit(limit)
        .all(db)
        .await?;

    Ok(runs)
}
