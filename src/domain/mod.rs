//! Domain layer: the node tree, its query language and state machine
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod configuration;
pub mod entities;
pub mod error;
pub mod node;
pub mod query;
pub mod resolver;
pub mod state;
pub mod validate;
pub mod version;

pub use arena::{ConfigTree, PostOrderIterator, TreeIterator};
pub use configuration::{ConfigHeader, Configuration};
pub use entities::*;
pub use error::{DomainError, DomainResult, FaultCategory, SecurityFault};
pub use node::{
    Children, ConfigNode, IncludeDescriptor, IncludeNode, KeyValueNode, ListElementNode,
    ListValueNode, NodeId, NodeKind, NodeSource, PathNode, ReservedKind, ResourceDescriptor,
    ResourceKind, ResourceNode, ValueNode, ValueType,
};
pub use query::{Anchor, PathQuery, QuerySyntax};
pub use resolver::{Found, PathResolver, SearchResult};
pub use state::{NodeState, State};
pub use validate::{validate_structure, validate_tree, Validate};
pub use version::{ExactPolicy, SameMajorPolicy, Version, VersionPolicy, VersionRequirement};
