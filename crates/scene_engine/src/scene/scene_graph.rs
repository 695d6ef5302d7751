//! Scene graph storage and the scene root
//!
//! [`SceneGraph`] owns every node in a slot-map arena together with the symbol
//! table. [`Scene`] ties a graph to its backend registry, its render context
//! and the data for the next render call:
//!
//! ```ignore
//! let mut scene = SceneBuilder::new(root)
//!     .define(symbol("theScene").child(teapot))
//!     .build(context)?;
//! scene.set_data([("activeView", 1)]).render()?;
//! ```

use std::collections::{HashMap, HashSet};

use super::error::{SceneError, SceneResult};
use super::evaluator::{NodeCache, RenderStats, Traversal};
use super::node::{Node, NodeId, NodeKind, NodeOp, NodeSpec};
use super::scope::{Scope, ScopeValue};
use crate::backend::{Backend, BackendRegistry, ShaderBackend, ShaderDescriptor};
use crate::config::SceneConfig;
use crate::context::{ClearFlags, RenderContext};
use crate::foundation::collections::{SecondaryMap, SlotMap};
use crate::shading::simple_shader;

/// Node arena plus symbol table
#[derive(Debug)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    symbols: HashMap<String, NodeId>,
}

impl SceneGraph {
    /// Build a graph from a root description and detached symbol definitions
    pub fn new(root: NodeSpec, definitions: Vec<NodeSpec>) -> SceneResult<Self> {
        let mut nodes = SlotMap::with_key();
        let mut symbols = HashMap::new();

        let root = insert(&mut nodes, &mut symbols, root)?;
        for definition in definitions {
            if definition.kind() != NodeKind::Symbol {
                return Err(SceneError::InvalidConfig(format!(
                    "only symbol nodes can be defined outside the tree, got a {} node",
                    definition.kind()
                )));
            }
            insert(&mut nodes, &mut symbols, definition)?;
        }

        log::debug!("Scene graph built: {} nodes, {} symbols", nodes.len(), symbols.len());
        Ok(Self { nodes, root, symbols })
    }

    /// Root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node by identity
    pub fn node(&self, id: NodeId) -> SceneResult<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| SceneError::InvalidConfig(format!("node {id:?} is not part of this scene")))
    }

    /// Symbol node registered under `name`
    pub fn symbol(&self, name: &str) -> Option<NodeId> {
        self.symbols.get(name).copied()
    }

    /// Registered symbol names, in no particular order
    pub fn symbol_names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes (never true for a built graph)
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node, in arena order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Check that every instance resolves and no symbol instances itself
    ///
    /// The error names the instance node at fault.
    pub fn validate(&self) -> SceneResult<()> {
        // Instances reachable inside each symbol without crossing into another symbol's expansion
        let mut references: HashMap<&str, Vec<(NodeId, &str)>> = HashMap::new();
        for (name, &id) in &self.symbols {
            let mut found = Vec::new();
            self.collect_instances(id, &mut found)?;
            references.insert(name.as_str(), found);
        }

        for (id, node) in self.nodes.iter() {
            if let NodeOp::Instance(target) = node.op() {
                if !self.symbols.contains_key(target) {
                    return Err(SceneError::at_node(
                        id,
                        NodeKind::Instance,
                        SceneError::UnresolvedSymbol(target.clone()),
                    ));
                }
            }
        }

        let mut finished: HashSet<&str> = HashSet::new();
        let mut names: Vec<&str> = references.keys().copied().collect();
        names.sort_unstable();
        for name in names {
            let mut path = Vec::new();
            find_cycle(name, &references, &mut path, &mut finished)?;
        }
        Ok(())
    }

    fn collect_instances<'g>(&'g self, id: NodeId, found: &mut Vec<(NodeId, &'g str)>) -> SceneResult<()> {
        let node = self.node(id)?;
        if let NodeOp::Instance(target) = node.op() {
            found.push((id, target.as_str()));
        }
        for &child in node.children() {
            self.collect_instances(child, found)?;
        }
        Ok(())
    }
}

/// Depth-first search over the symbol reference graph
fn find_cycle<'g>(
    name: &'g str,
    references: &HashMap<&'g str, Vec<(NodeId, &'g str)>>,
    path: &mut Vec<&'g str>,
    finished: &mut HashSet<&'g str>,
) -> SceneResult<()> {
    if finished.contains(name) {
        return Ok(());
    }
    path.push(name);
    for &(instance, target) in references.get(name).map(Vec::as_slice).unwrap_or_default() {
        if let Some(start) = path.iter().position(|active| *active == target) {
            let mut chain: Vec<String> = path[start..].iter().map(|entry| entry.to_string()).collect();
            chain.push(target.to_string());
            return Err(SceneError::at_node(
                instance,
                NodeKind::Instance,
                SceneError::CyclicInstance { chain },
            ));
        }
        find_cycle(target, references, path, finished)?;
    }
    path.pop();
    finished.insert(name);
    Ok(())
}

fn insert(
    nodes: &mut SlotMap<NodeId, Node>,
    symbols: &mut HashMap<String, NodeId>,
    spec: NodeSpec,
) -> SceneResult<NodeId> {
    let NodeSpec { op, children, label } = spec;
    let mut child_ids = Vec::with_capacity(children.len());
    for child in children {
        child_ids.push(insert(nodes, symbols, child)?);
    }

    let symbol_name = match &op {
        NodeOp::Symbol(name) => Some(name.clone()),
        _ => None,
    };
    let id = nodes.insert(Node::new(op, child_ids, label));
    if let Some(name) = symbol_name {
        if symbols.insert(name.clone(), id).is_some() {
            return Err(SceneError::DuplicateSymbol(name));
        }
    }
    Ok(id)
}

/// Assembles a [`Scene`]
pub struct SceneBuilder {
    root: NodeSpec,
    definitions: Vec<NodeSpec>,
    config: SceneConfig,
    shader: Option<ShaderDescriptor>,
    backends: Vec<Box<dyn Backend>>,
}

impl SceneBuilder {
    /// Start from the root of the active tree
    pub fn new(root: NodeSpec) -> Self {
        Self {
            root,
            definitions: Vec::new(),
            config: SceneConfig::default(),
            shader: None,
            backends: Vec::new(),
        }
    }

    /// Use `config` instead of the defaults
    pub fn with_config(mut self, config: SceneConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a detached symbol, reachable only through instances
    pub fn define(mut self, symbol: NodeSpec) -> Self {
        self.definitions.push(symbol);
        self
    }

    /// Use `descriptor` instead of the simple shader
    pub fn with_shader(mut self, descriptor: ShaderDescriptor) -> Self {
        self.shader = Some(descriptor);
        self
    }

    /// Install an extra backend after the defaults; last installation wins
    pub fn install_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Build the scene around `context`
    pub fn build<C: RenderContext>(self, context: C) -> SceneResult<Scene<C>> {
        self.config.validate()?;
        let graph = SceneGraph::new(self.root, self.definitions)?;

        let mut registry = BackendRegistry::with_defaults();
        let shader = self.shader.unwrap_or_else(simple_shader);
        registry.install_backend(Box::new(ShaderBackend::new(shader)));
        for backend in self.backends {
            registry.install_backend(backend);
        }

        log::info!(
            "Scene for canvas '{}' ready ({} nodes)",
            self.config.canvas_id,
            graph.len()
        );
        Ok(Scene {
            graph,
            registry,
            context,
            config: self.config,
            data: Scope::new(),
            caches: SecondaryMap::new(),
            validated: false,
            last_stats: RenderStats::default(),
        })
    }
}

/// # Scene
///
/// Owns a scene graph, its backend registry and the render context, and
/// performs one complete traversal per [`render`](Scene::render) call.
///
/// Render calls must be serialized by the caller. A call either completes or
/// returns the first error; draw calls already issued before a failure are
/// not rolled back.
pub struct Scene<C: RenderContext> {
    graph: SceneGraph,
    registry: BackendRegistry,
    context: C,
    config: SceneConfig,
    data: Scope,
    caches: SecondaryMap<NodeId, NodeCache>,
    validated: bool,
    last_stats: RenderStats,
}

impl<C: RenderContext> Scene<C> {
    /// Scene with default configuration and no detached symbols
    pub fn new(root: NodeSpec, context: C) -> SceneResult<Self> {
        SceneBuilder::new(root).build(context)
    }

    /// Replace the top-level scope for the next render
    pub fn set_data<K, V>(&mut self, data: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<ScopeValue>,
    {
        self.data = Scope::from_data(data);
        self
    }

    /// Top-level scope for the next render
    pub fn data(&self) -> &Scope {
        &self.data
    }

    /// Perform one traversal, issuing the draw calls of every active geometry
    pub fn render(&mut self) -> SceneResult<&mut Self> {
        if !self.validated {
            self.graph.validate()?;
            self.validated = true;
        }
        if self.context.is_context_lost() {
            return Err(SceneError::ContextLost);
        }

        self.registry.reset();
        let mut mask = ClearFlags::COLOR;
        if self.config.clear_depth {
            mask |= ClearFlags::DEPTH;
        }
        self.context.clear_color(self.config.clear_color);
        self.context.clear(mask);

        let mut traversal = Traversal::new(
            &self.graph,
            &mut self.caches,
            &mut self.registry,
            &mut self.context,
            self.config.max_instance_depth,
        );
        let result = traversal.visit(self.graph.root(), &self.data);
        self.last_stats = traversal.stats();

        if let Err(error) = &result {
            log::error!("Render aborted: {}", error);
        }
        result?;

        if self.config.log_stats {
            log::debug!("Render complete: {:?}", self.last_stats);
        }
        Ok(self)
    }

    /// Check the graph without rendering
    pub fn validate(&self) -> SceneResult<()> {
        self.graph.validate()
    }

    /// Counters of the most recent render call, including an aborted one
    pub fn last_stats(&self) -> RenderStats {
        self.last_stats
    }

    /// Install a backend into this scene's registry; last installation wins
    pub fn install_backend(&mut self, backend: Box<dyn Backend>) -> Option<Box<dyn Backend>> {
        self.registry.install_backend(backend)
    }

    /// This scene's backend registry
    pub fn backends(&self) -> &BackendRegistry {
        &self.registry
    }

    /// This scene's backend registry, mutably
    pub fn backends_mut(&mut self) -> &mut BackendRegistry {
        &mut self.registry
    }

    /// Render context
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Render context, mutably
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Delete every context object the scene created
    ///
    /// Geometry buffers are uploaded again and the shader program is rebuilt
    /// on the next render.
    pub fn release_resources(&mut self) {
        for cache in self.caches.values_mut() {
            cache.release_buffers(&mut self.context);
        }
        self.registry.release(&mut self.context);
        log::debug!("Scene released its context resources");
    }

    /// Tear the scene down, handing back its context
    ///
    /// The program and buffers the scene created are deleted first.
    pub fn into_context(mut self) -> C {
        self.release_resources();
        self.context
    }

    /// Active configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Scene graph
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Symbol node registered under `name`
    pub fn symbol(&self, name: &str) -> Option<NodeId> {
        self.graph.symbol(name)
    }
}
