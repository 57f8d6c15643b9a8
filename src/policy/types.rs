use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::policy::errors::PolicyError;

/// Reserved sentinel tag name. Referencing it from `auto_tags` marks a tag
/// public; defining it is rejected.
pub const PUBLIC_TAG: &str = "public";

/// The sentinel is the only name compared case-insensitively; everything else
/// is exact-match.
pub fn is_public_sentinel(name: &str) -> bool {
    name.eq_ignore_ascii_case(PUBLIC_TAG)
}

/// The four raw inputs of a policy compile, as produced by the external
/// configuration loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDefinitions {
    /// The scope universe: every scope name valid in this deployment.
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    /// role name -> bundled scopes
    #[serde(default)]
    pub roles: BTreeMap<String, RoleDef>,
    /// tag name -> definition
    #[serde(default)]
    pub tags: BTreeMap<String, TagDef>,
    /// tag name -> administrative owners, independent of `tags`
    #[serde(default)]
    pub tag_owners: BTreeMap<String, OwnersDef>,
}

/// A named bundle of scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDef {
    pub scopes: BTreeSet<String>,
}

/// A single tag definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagDef {
    #[serde(default)]
    pub users: Vec<GrantEntry>,
    #[serde(default)]
    pub groups: Vec<GrantEntry>,
    /// Nested tags whose grants this tag inherits. May reference the public
    /// sentinel.
    #[serde(default)]
    pub auto_tags: Vec<TagRef>,
}

/// Reference to another tag inside `auto_tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub name: String,
}

/// One user or group entry inside a tag definition. Carries either an
/// explicit `scopes` list or a `role` name; `spec()` enforces that shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrantEntry {
    pub name: String,
    #[serde(default)]
    pub scopes: Option<BTreeSet<String>>,
    #[serde(default)]
    pub role: Option<String>,
}

/// What a grant entry grants, after shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantSpec {
    Scopes(BTreeSet<String>),
    Role(String),
}

impl GrantEntry {
    /// Validate the scopes-or-role shape once, naming the entry on failure.
    pub fn spec(&self, tag: &str) -> Result<GrantSpec, PolicyError> {
        match (&self.scopes, &self.role) {
            (Some(_), Some(_)) => Err(PolicyError::ConflictingGrant {
                tag: tag.to_string(),
                member: self.name.clone(),
            }),
            (None, None) => Err(PolicyError::MissingGrant {
                tag: tag.to_string(),
                member: self.name.clone(),
            }),
            (Some(scopes), None) => {
                if scopes.is_empty() {
                    Err(PolicyError::EmptyScopes {
                        tag: tag.to_string(),
                        member: self.name.clone(),
                    })
                } else {
                    Ok(GrantSpec::Scopes(scopes.clone()))
                }
            }
            (None, Some(role)) => Ok(GrantSpec::Role(role.clone())),
        }
    }
}

/// Administrative owners of a tag. Owners authorize changes to the tag's
/// definition; they do not receive scopes through it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnersDef {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Group membership lookup, injected into the compiler. `None` means the
/// group is unknown to the directory, which is distinguishable from an empty
/// group.
pub trait GroupResolver {
    fn resolve_group(&self, name: &str) -> Option<Vec<String>>;
}

/// Map-backed resolver for tests and for static membership listed alongside
/// the policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticGroups(BTreeMap<String, Vec<String>>);

impl StaticGroups {
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self(groups)
    }
}

impl From<BTreeMap<String, Vec<String>>> for StaticGroups {
    fn from(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self(groups)
    }
}

impl GroupResolver for StaticGroups {
    fn resolve_group(&self, name: &str) -> Option<Vec<String>> {
        self.0.get(name).cloned()
    }
}
