use sea_orm::{ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter};

use crate::entities;
use crate::errors::UmbraError;

/// Read-only view of the policy store.
///
/// Holds its own connection so lookups never contend with a running
/// synchronization pass; the store is in WAL mode, so readers see the state
/// from before or after a sync commit, never a partial one. Unknown tag,
/// user, or scope names yield empty results rather than errors.
pub struct PolicyReader {
    db: DatabaseConnection,
}

impl PolicyReader {
    /// Open a reader on an existing store. Does not run migrations; the
    /// store must have been initialized by [`crate::storage::init`].
    pub async fn connect(url: &str) -> Result<Self, UmbraError> {
        let db = Database::connect(url).await?;
        Ok(Self { db })
    }

    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Whether a tag row exists under this exact name.
    pub async fn is_tag_defined(&self, tag: &str) -> Result<bool, UmbraError> {
        use entities::tag::{Column, Entity};

        let found = Entity::find()
            .filter(Column::Name.eq(tag))
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }

    /// Names of every tag reachable from the public sentinel, sorted.
    pub async fn get_public_tags(&self) -> Result<Vec<String>, UmbraError> {
        use entities::tag::{Column, Entity};

        let mut tags: Vec<String> = Entity::find()
            .filter(Column::IsPublic.eq(1))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        tags.sort();
        Ok(tags)
    }

    /// Whether the tag carries the public flag. Unknown tags are not public.
    pub async fn is_tag_public(&self, tag: &str) -> Result<bool, UmbraError> {
        use entities::tag::{Column, Entity};

        let found = Entity::find()
            .filter(Column::Name.eq(tag))
            .one(&self.db)
            .await?;
        Ok(found.map(|t| t.is_public != 0).unwrap_or(false))
    }

    /// Scope names granted to `user` on `tag`, sorted. Empty when either
    /// name is unknown or no grant links them.
    pub async fn get_scopes_for_tag_and_user(
        &self,
        tag: &str,
        user: &str,
    ) -> Result<Vec<String>, UmbraError> {
        let Some(tag_id) = self.tag_id(tag).await? else {
            return Ok(Vec::new());
        };
        let Some(user_id) = self.user_id(user).await? else {
            return Ok(Vec::new());
        };

        let scope_ids: Vec<i32> = {
            use entities::grant::{Column, Entity};
            Entity::find()
                .filter(Column::TagId.eq(tag_id))
                .filter(Column::UserId.eq(user_id))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|g| g.scope_id)
                .collect()
        };
        if scope_ids.is_empty() {
            return Ok(Vec::new());
        }

        use entities::scope::{Column, Entity};
        let mut scopes: Vec<String> = Entity::find()
            .filter(Column::Id.is_in(scope_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();
        scopes.sort();
        Ok(scopes)
    }

    /// Tag names under which `user` holds `scope`, sorted.
    pub async fn get_tags_granting_scope(
        &self,
        scope: &str,
        user: &str,
    ) -> Result<Vec<String>, UmbraError> {
        let Some(scope_id) = self.scope_id(scope).await? else {
            return Ok(Vec::new());
        };
        let Some(user_id) = self.user_id(user).await? else {
            return Ok(Vec::new());
        };

        let tag_ids: Vec<i32> = {
            use entities::grant::{Column, Entity};
            Entity::find()
                .filter(Column::UserId.eq(user_id))
                .filter(Column::ScopeId.eq(scope_id))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|g| g.tag_id)
                .collect()
        };
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        use entities::tag::{Column, Entity};
        let mut tags: Vec<String> = Entity::find()
            .filter(Column::Id.is_in(tag_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        tags.sort();
        Ok(tags)
    }

    /// Whether an owner row links `user` to `tag`.
    pub async fn is_tag_owner(&self, tag: &str, user: &str) -> Result<bool, UmbraError> {
        let Some(tag_id) = self.tag_id(tag).await? else {
            return Ok(false);
        };
        let Some(user_id) = self.user_id(user).await? else {
            return Ok(false);
        };

        use entities::owner::{Column, Entity};
        let found = Entity::find()
            .filter(Column::TagId.eq(tag_id))
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn tag_id(&self, name: &str) -> Result<Option<i32>, UmbraError> {
        use entities::tag::{Column, Entity};

        let found = Entity::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?;
        Ok(found.map(|t| t.id))
    }

    async fn user_id(&self, name: &str) -> Result<Option<i32>, UmbraError> {
        use entities::user::{Column, Entity};

        let found = Entity::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?;
        Ok(found.map(|u| u.id))
    }

    async fn scope_id(&self, name: &str) -> Result<Option<i32>, UmbraError> {
        use entities::scope::{Column, Entity};

        let found = Entity::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?;
        Ok(found.map(|s| s.id))
    }
}
