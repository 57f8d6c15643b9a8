pub use sea_orm_migration::prelude::*;

mod m20260601_000001_initial_schema;
mod m20260715_000001_add_sync_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260601_000001_initial_schema::Migration),
            Box::new(m20260715_000001_add_sync_runs::Migration),
        ]
    }
}
