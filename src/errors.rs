use miette::Diagnostic;
use thiserror::Error;

use crate::policy::errors::PolicyError;

#[derive(Debug, Error, Diagnostic)]
pub enum UmbraError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(umbra::io))]
    Io(#[from] std::io::Error),

    #[error("Policy file parse error: {0}")]
    #[diagnostic(
        code(umbra::parse),
        help("The policy file is YAML with `scopes`, `roles`, `tags`, `tag_owners`, and optional `groups` sections")
    )]
    Parse(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(umbra::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] PolicyError),

    #[error("{0}")]
    #[diagnostic(code(umbra::other))]
    Other(String),
}
