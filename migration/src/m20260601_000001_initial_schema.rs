use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Create tags table
        manager
            .create_table(
                Table::create()
                    .table(Tags::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tags::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Tags::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Tags::IsPublic)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        // Create scopes table
        manager
            .create_table(
                Table::create()
                    .table(Scopes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Scopes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Scopes::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        // Create tag_grants table (tag -> user -> scope triples)
        manager
            .create_table(
                Table::create()
                    .table(TagGrants::Table)
                    .if_not_exists()
                    .col(integer(TagGrants::TagId))
                    .col(integer(TagGrants::UserId))
                    .col(integer(TagGrants::ScopeId))
                    .primary_key(
                        Index::create()
                            .col(TagGrants::TagId)
                            .col(TagGrants::UserId)
                            .col(TagGrants::ScopeId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tag_grants_tag")
                            .from(TagGrants::Table, TagGrants::TagId)
                            .to(Tags::Table, Tags::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tag_grants_user")
                            .from(TagGrants::Table, TagGrants::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tag_grants_scope")
                            .from(TagGrants::Table, TagGrants::ScopeId)
                            .to(Scopes::Table, Scopes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create index on tag_grants(user_id, scope_id) for scope -> tags lookups
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tag_grants_user_scope")
                    .table(TagGrants::Table)
                    .col(TagGrants::UserId)
                    .col(TagGrants::ScopeId)
                    .to_owned(),
            )
            .await?;

        // Create tag_owners table (tag -> user pairs)
        manager
            .create_table(
                Table::create()
                    .table(TagOwners::Table)
                    .if_not_exists()
                    .col(integer(TagOwners::TagId))
                    .col(integer(TagOwners::UserId))
                    .primary_key(Index::create().col(TagOwners::TagId).col(TagOwners::UserId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tag_owners_tag")
                            .from(TagOwners::Table, TagOwners::TagId)
                            .to(Tags::Table, Tags::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tag_owners_user")
                            .from(TagOwners::Table, TagOwners::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TagOwners::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TagGrants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Scopes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tags::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Tags {
    Table,
    Id,
    Name,
    IsPublic,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Scopes {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum TagGrants {
    Table,
    TagId,
    UserId,
    ScopeId,
}

#[derive(DeriveIden)]
enum TagOwners {
    Table,
    TagId,
    UserId,
}
