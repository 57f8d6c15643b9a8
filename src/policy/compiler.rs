use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::policy::errors::PolicyError;
use crate::policy::types::{
    is_public_sentinel, GrantEntry, GrantSpec, GroupResolver, PolicyDefinitions, PUBLIC_TAG,
};
use crate::policy::CompiledPolicy;

/// Default bound on `auto_tags` nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Compiles raw tag/role/owner definitions into a [`CompiledPolicy`].
///
/// One compiler value per reload: construct it from the raw definitions,
/// call [`compile`](TagCompiler::compile), discard it. Group membership is
/// looked up through the injected resolver; an unknown group drops that
/// entry's grants with a warning instead of failing the compile.
pub struct TagCompiler {
    defs: PolicyDefinitions,
    max_depth: usize,
}

/// Per-tag adjacency after validation, before graph resolution.
#[derive(Debug, Default)]
struct NormalizedTag {
    /// username -> scopes from direct user entries and expanded group entries
    direct: BTreeMap<String, BTreeSet<String>>,
    /// Declared nested tags, sentinel references excluded.
    nested: Vec<String>,
    /// True when `auto_tags` names the public sentinel directly.
    nests_public: bool,
}

/// Result of resolving one tag, cached in the memo map.
#[derive(Debug, Clone, Default)]
struct ResolvedTag {
    grants: BTreeMap<String, BTreeSet<String>>,
    public: bool,
}

impl TagCompiler {
    pub fn new(defs: PolicyDefinitions) -> Self {
        Self {
            defs,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve every declared tag into flat per-user grant sets, the
    /// public-tag closure, and the owner sets.
    ///
    /// All configuration validation happens before any resolution, so a
    /// malformed input fails without partial output.
    pub fn compile(&self, groups: &dyn GroupResolver) -> Result<CompiledPolicy, PolicyError> {
        self.validate_roles()?;
        let normalized = self.normalize(groups)?;

        let mut compiled = CompiledPolicy {
            scopes: self.defs.scopes.clone(),
            ..Default::default()
        };
        compiled.public_tags.insert(PUBLIC_TAG.to_string());

        // Lexicographic resolution order keeps degraded cycle output stable
        // between runs.
        let mut memo: HashMap<String, ResolvedTag> = HashMap::new();
        for name in normalized.keys() {
            let mut active = HashSet::new();
            let resolved = self.resolve(name, &normalized, &mut memo, &mut active, 0)?;
            if resolved.public {
                compiled.public_tags.insert(name.clone());
            }
            compiled.grants.insert(name.clone(), resolved.grants);
        }

        compiled.owners = self.compile_owners(groups)?;

        tracing::info!(
            tags = compiled.grants.len(),
            public_tags = compiled.public_tags.len(),
            owned_tags = compiled.owners.len(),
            "Compiled tag policy"
        );

        Ok(compiled)
    }

    /// Every role must bundle at least one scope, all drawn from the universe.
    fn validate_roles(&self) -> Result<(), PolicyError> {
        for (name, role) in &self.defs.roles {
            if role.scopes.is_empty() {
                return Err(PolicyError::EmptyRole { role: name.clone() });
            }
            for scope in &role.scopes {
                if !self.defs.scopes.contains(scope) {
                    return Err(PolicyError::UnknownRoleScope {
                        role: name.clone(),
                        scope: scope.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate every tag definition and build the adjacency used by
    /// [`resolve`](Self::resolve): direct grants (roles looked up, groups
    /// expanded) plus the declared nesting edges.
    fn normalize(
        &self,
        groups: &dyn GroupResolver,
    ) -> Result<BTreeMap<String, NormalizedTag>, PolicyError> {
        let mut normalized = BTreeMap::new();

        for (name, def) in &self.defs.tags {
            if is_public_sentinel(name) {
                return Err(PolicyError::ReservedTag { name: name.clone() });
            }

            let mut tag = NormalizedTag::default();

            for reference in &def.auto_tags {
                if is_public_sentinel(&reference.name) {
                    tag.nests_public = true;
                } else if self.defs.tags.contains_key(&reference.name) {
                    tag.nested.push(reference.name.clone());
                } else {
                    return Err(PolicyError::MissingTag {
                        tag: name.clone(),
                        reference: reference.name.clone(),
                    });
                }
            }

            for entry in &def.users {
                let scopes = self.entry_scopes(name, entry)?;
                tag.direct.entry(entry.name.clone()).or_default().extend(scopes);
            }

            for entry in &def.groups {
                let scopes = self.entry_scopes(name, entry)?;
                match groups.resolve_group(&entry.name) {
                    Some(members) => {
                        for member in members {
                            tag.direct
                                .entry(member)
                                .or_default()
                                .extend(scopes.iter().cloned());
                        }
                    }
                    None => {
                        tracing::warn!(
                            group = %entry.name,
                            tag = %name,
                            "Unknown group in tag definition; dropping its grant"
                        );
                    }
                }
            }

            normalized.insert(name.clone(), tag);
        }

        Ok(normalized)
    }

    /// Scope set for one entry: explicit scopes checked against the
    /// universe, or the named role's bundle.
    fn entry_scopes(
        &self,
        tag: &str,
        entry: &GrantEntry,
    ) -> Result<BTreeSet<String>, PolicyError> {
        match entry.spec(tag)? {
            GrantSpec::Scopes(scopes) => {
                for scope in &scopes {
                    if !self.defs.scopes.contains(scope) {
                        return Err(PolicyError::UnknownScope {
                            tag: tag.to_string(),
                            member: entry.name.clone(),
                            scope: scope.clone(),
                        });
                    }
                }
                Ok(scopes)
            }
            GrantSpec::Role(role) => match self.defs.roles.get(&role) {
                Some(def) => Ok(def.scopes.clone()),
                None => Err(PolicyError::UnknownRole {
                    tag: tag.to_string(),
                    member: entry.name.clone(),
                    role,
                }),
            },
        }
    }

    /// Depth-first resolution of one tag.
    ///
    /// The depth guard fires before the memo lookup so a memoized subtree
    /// cannot hide an over-deep reference chain. A tag already on the active
    /// path is a cycle; that edge contributes nothing and the degraded
    /// result is never memoized.
    fn resolve(
        &self,
        name: &str,
        normalized: &BTreeMap<String, NormalizedTag>,
        memo: &mut HashMap<String, ResolvedTag>,
        active: &mut HashSet<String>,
        depth: usize,
    ) -> Result<ResolvedTag, PolicyError> {
        if depth >= self.max_depth {
            return Err(PolicyError::DepthExceeded {
                tag: name.to_string(),
                limit: self.max_depth,
            });
        }

        if let Some(done) = memo.get(name) {
            return Ok(done.clone());
        }

        if !active.insert(name.to_string()) {
            return Ok(ResolvedTag::default());
        }

        let Some(tag) = normalized.get(name) else {
            active.remove(name);
            return Ok(ResolvedTag::default());
        };

        let mut resolved = ResolvedTag {
            grants: tag.direct.clone(),
            public: tag.nests_public,
        };

        for nested in &tag.nested {
            let child = self.resolve(nested, normalized, memo, active, depth + 1)?;
            resolved.public |= child.public;
            for (user, scopes) in child.grants {
                resolved.grants.entry(user).or_default().extend(scopes);
            }
        }

        active.remove(name);
        memo.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Owners resolve independently of grants: users direct, groups
    /// expanded, no nesting and no public concept. A tag may have owners
    /// without appearing under `tags`.
    fn compile_owners(
        &self,
        groups: &dyn GroupResolver,
    ) -> Result<BTreeMap<String, BTreeSet<String>>, PolicyError> {
        let mut owners: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (tag, def) in &self.defs.tag_owners {
            if is_public_sentinel(tag) {
                return Err(PolicyError::ReservedTag { name: tag.clone() });
            }

            let entry = owners.entry(tag.clone()).or_default();
            entry.extend(def.users.iter().cloned());

            for group in &def.groups {
                match groups.resolve_group(group) {
                    Some(members) => entry.extend(members),
                    None => {
                        tracing::warn!(
                            group = %group,
                            tag = %tag,
                            "Unknown group in tag owners; dropping its members"
                        );
                    }
                }
            }
        }

        Ok(owners)
    }
}
