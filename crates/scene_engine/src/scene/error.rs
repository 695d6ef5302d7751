//! Scene error types
//!
//! Every failure during construction or traversal is a [`SceneError`]. Errors
//! raised by a node's own evaluation are wrapped in [`SceneError::Node`] with
//! that node's identity and kind; errors coming up from its descendants pass
//! through unchanged, so the wrapper always names the node that actually failed.

use crate::backend::BackendKind;
use crate::config::ConfigError;
use crate::scene::node::{NodeId, NodeKind};

/// Errors raised while building or rendering a scene
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    /// Lookup of a backend kind nothing is registered for
    #[error("No backend installed for kind '{0}'")]
    BackendNotFound(BackendKind),

    /// A backend is registered for the kind but has a different concrete type
    #[error("Backend installed for kind '{kind}' is not a {expected}")]
    BackendTypeMismatch {
        /// Kind that was looked up
        kind: BackendKind,
        /// Type the caller asked for
        expected: &'static str,
    },

    /// An Instance names a symbol that does not exist
    #[error("Instance references unknown symbol '{0}'")]
    UnresolvedSymbol(String),

    /// A symbol instances itself, directly or transitively
    #[error("Cyclic instancing: {}", .chain.join(" -> "))]
    CyclicInstance {
        /// Symbol names along the cycle, first and last being the same
        chain: Vec<String>,
    },

    /// A Selector picked a child index that does not exist
    #[error("Selection index {index} out of range for {len} children")]
    SelectionIndexOutOfRange {
        /// Offending index
        index: usize,
        /// Number of children the selector has
        len: usize,
    },

    /// A configuration function read a scope variable that is not defined
    #[error("Scope variable '{0}' is not defined")]
    ScopeLookup(String),

    /// A scope variable exists but holds the wrong type of value
    #[error("Scope variable '{name}' is not a {expected}")]
    ScopeType {
        /// Variable name
        name: String,
        /// Expected value type
        expected: &'static str,
    },

    /// A state node targets a backend that takes no state values
    #[error("Backend '{0}' does not accept state values")]
    StateNotAccepted(BackendKind),

    /// Two symbols share one name
    #[error("Symbol '{0}' is defined more than once")]
    DuplicateSymbol(String),

    /// Instance expansion nested deeper than the configured limit
    #[error("Instance nesting exceeds the limit of {0}")]
    InstanceDepthExceeded(usize),

    /// A shader stage failed to compile
    #[error("Shader '{name}' failed to compile: {log}")]
    ShaderCompile {
        /// Shader backend name
        name: String,
        /// Info log reported by the context
        log: String,
    },

    /// A program failed to link
    #[error("Shader '{name}' failed to link: {log}")]
    ShaderLink {
        /// Shader backend name
        name: String,
        /// Info log reported by the context
        log: String,
    },

    /// Binders or setters were used before the program was bound
    #[error("Shader '{0}' used before being bound")]
    ShaderNotBound(String),

    /// The rendering context is lost
    #[error("Rendering context lost")]
    ContextLost,

    /// The scene was built from an unusable description
    #[error("Invalid scene configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failure raised by a specific node
    #[error("{kind} node {id:?} failed: {source}")]
    Node {
        /// Failing node
        id: NodeId,
        /// Failing node's kind
        kind: NodeKind,
        /// What went wrong
        #[source]
        source: Box<SceneError>,
    },
}

impl SceneError {
    /// Wrap an error raised by a node's own evaluation
    pub fn at_node(id: NodeId, kind: NodeKind, source: SceneError) -> Self {
        SceneError::Node {
            id,
            kind,
            source: Box::new(source),
        }
    }

    /// The underlying error with node wrappers stripped
    pub fn root_cause(&self) -> &SceneError {
        match self {
            SceneError::Node { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Identity and kind of the node that failed, if a node raised the error
    pub fn failing_node(&self) -> Option<(NodeId, NodeKind)> {
        match self {
            SceneError::Node { id, kind, source } => source.failing_node().or(Some((*id, *kind))),
            _ => None,
        }
    }
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
