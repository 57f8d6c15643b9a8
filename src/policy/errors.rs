use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PolicyError {
    #[error("Role `{role}` has an empty scope list")]
    #[diagnostic(
        code(umbra::policy::empty_role),
        help("Every role must bundle at least one scope")
    )]
    EmptyRole { role: String },

    #[error("Role `{role}` references unknown scope `{scope}`")]
    #[diagnostic(
        code(umbra::policy::unknown_role_scope),
        help("Scopes referenced by a role must appear in the scope universe")
    )]
    UnknownRoleScope { role: String, scope: String },

    #[error("`{name}` is reserved and cannot be defined as a tag")]
    #[diagnostic(
        code(umbra::policy::reserved_tag),
        help("The public sentinel may only be referenced from `auto_tags`, never defined")
    )]
    ReservedTag { name: String },

    #[error("Tag `{tag}` references undefined tag `{reference}` in `auto_tags`")]
    #[diagnostic(
        code(umbra::policy::missing_tag),
        help("Every `auto_tags` entry must name a defined tag or the public sentinel")
    )]
    MissingTag { tag: String, reference: String },

    #[error("Grant for `{member}` in tag `{tag}` sets both `scopes` and `role`")]
    #[diagnostic(
        code(umbra::policy::conflicting_grant),
        help("A grant entry carries either an explicit `scopes` list or a `role`, not both")
    )]
    ConflictingGrant { tag: String, member: String },

    #[error("Grant for `{member}` in tag `{tag}` sets neither `scopes` nor `role`")]
    #[diagnostic(
        code(umbra::policy::missing_grant),
        help("Add a `scopes` list or a `role` to the entry")
    )]
    MissingGrant { tag: String, member: String },

    #[error("Grant for `{member}` in tag `{tag}` has an empty scope list")]
    #[diagnostic(
        code(umbra::policy::empty_scopes),
        help("An explicit `scopes` list must contain at least one scope")
    )]
    EmptyScopes { tag: String, member: String },

    #[error("Grant for `{member}` in tag `{tag}` references unknown scope `{scope}`")]
    #[diagnostic(
        code(umbra::policy::unknown_scope),
        help("Scopes granted through a tag must appear in the scope universe")
    )]
    UnknownScope {
        tag: String,
        member: String,
        scope: String,
    },

    #[error("Grant for `{member}` in tag `{tag}` references undefined role `{role}`")]
    #[diagnostic(
        code(umbra::policy::unknown_role),
        help("Define the role under `roles` before granting it through a tag")
    )]
    UnknownRole {
        tag: String,
        member: String,
        role: String,
    },

    #[error("Tag nesting exceeds the depth limit of {limit} at tag `{tag}`")]
    #[diagnostic(
        code(umbra::policy::depth_exceeded),
        help("Flatten the `auto_tags` chain or raise `policy.max_depth`")
    )]
    DepthExceeded { tag: String, limit: usize },
}
