pub mod compiler;
pub mod errors;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};

/// Fully compiled policy state, produced by one compiler pass.
/// Immutable after construction; configuration changes require a recompile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledPolicy {
    /// The scope universe the grants were validated against, carried along
    /// so synchronization can stage the full scope table.
    pub scopes: BTreeSet<String>,
    /// tag name -> (username -> granted scopes). Every declared tag has an
    /// entry, possibly empty.
    pub grants: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    /// Tag names transitively reachable from the public sentinel, the
    /// sentinel itself included.
    pub public_tags: BTreeSet<String>,
    /// tag name -> administrative owners.
    pub owners: BTreeMap<String, BTreeSet<String>>,
}
