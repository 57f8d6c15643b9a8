use std::collections::BTreeMap;

use umbra::policy::compiler::TagCompiler;
use umbra::policy::types::{
    GrantEntry, OwnersDef, PolicyDefinitions, RoleDef, StaticGroups, TagDef, TagRef,
};
use umbra::policy::CompiledPolicy;

/// Builder for policy definitions used across the integration tests
pub struct PolicyBuilder {
    definitions: PolicyDefinitions,
    groups: BTreeMap<String, Vec<String>>,
}

impl PolicyBuilder {
    pub fn new(scopes: &[&str]) -> Self {
        Self {
            definitions: PolicyDefinitions {
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            groups: BTreeMap::new(),
        }
    }

    pub fn role(mut self, name: &str, scopes: &[&str]) -> Self {
        self.definitions.roles.insert(
            name.to_string(),
            RoleDef {
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// Declare a tag with no members yet
    pub fn tag(mut self, name: &str) -> Self {
        self.definitions.tags.entry(name.to_string()).or_default();
        self
    }

    pub fn user_scopes(mut self, tag: &str, user: &str, scopes: &[&str]) -> Self {
        self.tag_mut(tag).users.push(GrantEntry {
            name: user.to_string(),
            scopes: Some(scopes.iter().map(|s| s.to_string()).collect()),
            role: None,
        });
        self
    }

    pub fn user_role(mut self, tag: &str, user: &str, role: &str) -> Self {
        self.tag_mut(tag).users.push(GrantEntry {
            name: user.to_string(),
            scopes: None,
            role: Some(role.to_string()),
        });
        self
    }

    pub fn group_scopes(mut self, tag: &str, group: &str, scopes: &[&str]) -> Self {
        self.tag_mut(tag).groups.push(GrantEntry {
            name: group.to_string(),
            scopes: Some(scopes.iter().map(|s| s.to_string()).collect()),
            role: None,
        });
        self
    }

    pub fn group_role(mut self, tag: &str, group: &str, role: &str) -> Self {
        self.tag_mut(tag).groups.push(GrantEntry {
            name: group.to_string(),
            scopes: None,
            role: Some(role.to_string()),
        });
        self
    }

    /// Nest `inner` under `tag` so its grants are inherited
    pub fn nested(mut self, tag: &str, inner: &str) -> Self {
        self.tag_mut(tag).auto_tags.push(TagRef {
            name: inner.to_string(),
        });
        self
    }

    pub fn owners(mut self, tag: &str, users: &[&str], groups: &[&str]) -> Self {
        self.definitions.tag_owners.insert(
            tag.to_string(),
            OwnersDef {
                users: users.iter().map(|s| s.to_string()).collect(),
                groups: groups.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// Register a group in the static directory
    pub fn group(mut self, name: &str, members: &[&str]) -> Self {
        self.groups.insert(
            name.to_string(),
            members.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn build(self) -> (PolicyDefinitions, StaticGroups) {
        (self.definitions, StaticGroups::new(self.groups))
    }

    /// Compile with the default depth limit, panicking on rejection
    pub fn compile(self) -> CompiledPolicy {
        let (definitions, groups) = self.build();
        TagCompiler::new(definitions)
            .compile(&groups)
            .expect("Failed to compile test policy")
    }

    fn tag_mut(&mut self, name: &str) -> &mut TagDef {
        self.definitions.tags.entry(name.to_string()).or_default()
    }
}
