//! # Traversal Engine
//!
//! One [`Traversal`] performs a single depth-first, pre-order walk of the
//! scene graph. Every state-setting node follows the same discipline:
//!
//! ```text
//! Enter(node, scope) -> save backend state -> apply -> VisitChildren(scope') -> restore -> Exit
//! ```
//!
//! so a node's effect is scoped exactly to its subtree, and a sibling never
//! observes what a preceding sibling set.
//!
//! ## Memoization
//!
//! Transform nodes with literal configuration cache their local matrix. The
//! composed matrix is cached as well when the inbound transform is also
//! fixed, keyed by the bit pattern of that inbound matrix: a symbol instanced
//! under several different fixed transforms keeps one cached result per
//! instance path. The graph is immutable, so the number of entries is bounded
//! by the number of fixed paths reaching the node.
//!
//! ## Errors
//!
//! The first failure aborts the walk. Errors raised by a node's own
//! evaluation are wrapped with that node's identity and kind; errors coming up
//! from descendants pass through untouched.

use std::collections::HashMap;
use std::rc::Rc;

use super::error::{SceneError, SceneResult};
use super::node::{Node, NodeId, NodeKind, NodeOp};
use super::objects::Geometry;
use super::scene_graph::SceneGraph;
use super::scope::Scope;
use crate::backend::{
    AttributeSlot, BackendKind, BackendRegistry, LightSource, LightsBackend, MaterialBackend,
    MaterialState, ShaderBackend, TransformBackend, TransformState, UniformSlot, UniformValue,
};
use crate::context::{BufferHandle, BufferTarget, RenderContext};
use crate::foundation::collections::SecondaryMap;
use crate::foundation::math::{Mat4, Mat4Ext};

/// Counters for one render call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Nodes entered, counting instanced subtrees once per instance
    pub nodes_visited: usize,
    /// Draw calls issued
    pub draw_calls: usize,
    /// Matrix compositions actually computed
    pub compositions: usize,
    /// Compositions answered from the memo
    pub memo_hits: usize,
}

/// Exact identity of an inbound matrix
type MemoKey = [u32; 16];

fn memo_key(matrix: &Mat4) -> MemoKey {
    let mut key = [0; 16];
    for (slot, value) in key.iter_mut().zip(matrix.iter()) {
        *slot = value.to_bits();
    }
    key
}

#[derive(Debug, Clone, Copy)]
struct GeometryBuffers {
    generation: u64,
    positions: BufferHandle,
    normals: BufferHandle,
    indices: BufferHandle,
}

/// Per-node state that outlives a single traversal
#[derive(Debug, Default)]
pub(crate) struct NodeCache {
    local: Option<Mat4>,
    memos: HashMap<MemoKey, Mat4>,
    buffers: Option<GeometryBuffers>,
}

impl NodeCache {
    fn memoized(&self, inbound: &Mat4) -> Option<Mat4> {
        self.memos.get(&memo_key(inbound)).copied()
    }

    fn remember(&mut self, inbound: &Mat4, composed: Mat4) {
        self.memos.insert(memo_key(inbound), composed);
    }

    /// Delete the uploaded geometry buffers, if the context still holds them
    pub(crate) fn release_buffers(&mut self, context: &mut dyn RenderContext) {
        let Some(buffers) = self.buffers.take() else {
            return;
        };
        if context.is_context_lost() || buffers.generation != context.generation() {
            return;
        }
        for buffer in [buffers.positions, buffers.normals, buffers.indices] {
            context.delete_buffer(buffer);
        }
    }
}

/// A single walk over a scene graph
pub(crate) struct Traversal<'a> {
    graph: &'a SceneGraph,
    caches: &'a mut SecondaryMap<NodeId, NodeCache>,
    registry: &'a mut BackendRegistry,
    context: &'a mut dyn RenderContext,
    instance_stack: Vec<String>,
    max_instance_depth: usize,
    stats: RenderStats,
}

impl<'a> Traversal<'a> {
    pub(crate) fn new(
        graph: &'a SceneGraph,
        caches: &'a mut SecondaryMap<NodeId, NodeCache>,
        registry: &'a mut BackendRegistry,
        context: &'a mut dyn RenderContext,
        max_instance_depth: usize,
    ) -> Self {
        Self {
            graph,
            caches,
            registry,
            context,
            instance_stack: Vec::new(),
            max_instance_depth,
            stats: RenderStats::default(),
        }
    }

    /// Counters gathered so far
    pub(crate) fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Evaluate `id` and its subtree
    pub(crate) fn visit(&mut self, id: NodeId, scope: &Scope) -> SceneResult<()> {
        let graph = self.graph;
        let node = graph.node(id)?;
        let kind = node.kind();
        let own = |error: SceneError| SceneError::at_node(id, kind, error);

        self.stats.nodes_visited += 1;
        match node.label() {
            Some(label) => log::trace!("Entering {} node '{}' {:?}", kind, label, id),
            None => log::trace!("Entering {} node {:?}", kind, id),
        }

        match node.op() {
            NodeOp::Group | NodeOp::Symbol(_) => self.visit_children(node, scope),

            NodeOp::Scale(_) | NodeOp::Translate(_) | NodeOp::Rotate(_) | NodeOp::Matrix(_) => {
                self.transform_subtree(id, node, scope, BackendKind::ModelTransform)
            }

            NodeOp::LookAt(_) => self.transform_subtree(id, node, scope, BackendKind::ViewTransform),

            NodeOp::Camera(optics) => {
                let fixed = optics.is_fixed();
                let projection = match self.cached_local(id).filter(|_| fixed) {
                    Some(matrix) => matrix,
                    None => {
                        let matrix = optics.resolve(scope).map_err(own)?.matrix();
                        if let Some(cache) = self.cache(id).filter(|_| fixed) {
                            cache.local = Some(matrix);
                        }
                        matrix
                    }
                };
                let backend = self
                    .registry
                    .get_mut::<TransformBackend>(&BackendKind::Projection)
                    .map_err(own)?;
                let saved = backend.transform();
                backend.set_transform(TransformState::new(projection, fixed));

                let result = self.visit_children(node, scope);
                self.registry
                    .get_mut::<TransformBackend>(&BackendKind::Projection)
                    .map_err(own)?
                    .set_transform(saved);
                result
            }

            NodeOp::Lights(param) => {
                let sources = param.resolve(scope).map_err(own)?;
                let backend = self
                    .registry
                    .get_mut::<LightsBackend>(&BackendKind::Lights)
                    .map_err(own)?;
                let (saved, saved_fixed) = (backend.lights(), backend.is_fixed());
                backend.set_lights(sources, param.is_fixed());

                let result = self.visit_children(node, scope);
                self.registry
                    .get_mut::<LightsBackend>(&BackendKind::Lights)
                    .map_err(own)?
                    .set_lights(saved, saved_fixed);
                result
            }

            NodeOp::Material(param) => {
                let material = param.resolve(scope).map_err(own)?;
                let backend = self
                    .registry
                    .get_mut::<MaterialBackend>(&BackendKind::Material)
                    .map_err(own)?;
                let (saved, saved_fixed) = (backend.material(), backend.is_fixed());
                backend.set_material(Some(material), param.is_fixed());

                let result = self.visit_children(node, scope);
                self.registry
                    .get_mut::<MaterialBackend>(&BackendKind::Material)
                    .map_err(own)?
                    .set_material(saved, saved_fixed);
                result
            }

            NodeOp::State(target, param) => {
                let value = param.resolve(scope).map_err(own)?;
                let backend = self.registry.get_backend_mut(target).map_err(own)?;
                let saved = backend.state();
                backend.set_state(Some(value)).map_err(own)?;

                let result = self.visit_children(node, scope);
                self.registry
                    .get_backend_mut(target)
                    .map_err(own)?
                    .set_state(saved)
                    .map_err(own)?;
                result
            }

            NodeOp::WithData(data) => {
                let extended = scope.extend(data.iter().cloned());
                self.visit_children(node, &extended)
            }

            NodeOp::Selector(selection) => {
                let selection = selection.resolve(scope).map_err(own)?;
                let children = node.children();
                if let Some(&index) = selection.iter().find(|&&index| index >= children.len()) {
                    return Err(own(SceneError::SelectionIndexOutOfRange {
                        index,
                        len: children.len(),
                    }));
                }
                log::trace!("Selector {:?} activates {:?}", id, selection);
                for index in selection {
                    self.visit(children[index], scope)?;
                }
                Ok(())
            }

            NodeOp::Instance(name) => {
                let target = self.enter_instance(name).map_err(own)?;
                let result = self.visit(target, scope);
                self.instance_stack.pop();
                result?;
                self.visit_children(node, scope)
            }

            NodeOp::Geometry(mesh) => {
                self.draw(id, mesh).map_err(own)?;
                self.visit_children(node, scope)
            }
        }
    }

    fn visit_children(&mut self, node: &Node, scope: &Scope) -> SceneResult<()> {
        for &child in node.children() {
            self.visit(child, scope)?;
        }
        Ok(())
    }

    /// Cache slot for `id`; `None` only for a key that was never part of this graph
    fn cache(&mut self, id: NodeId) -> Option<&mut NodeCache> {
        self.caches.entry(id).map(|entry| entry.or_default())
    }

    fn cached_local(&self, id: NodeId) -> Option<Mat4> {
        self.caches.get(id).and_then(|cache| cache.local)
    }

    /// Local matrix of a transform node, from cache when its configuration is literal
    fn local_matrix(&mut self, id: NodeId, op: &NodeOp, scope: &Scope) -> SceneResult<Mat4> {
        let fixed = op.is_fixed();
        if fixed {
            if let Some(matrix) = self.cached_local(id) {
                return Ok(matrix);
            }
        }
        let matrix = match op {
            NodeOp::Scale(param) => {
                let factors = param.resolve(scope)?;
                Mat4::scaling(factors.x, factors.y, factors.z)
            }
            NodeOp::Translate(param) => {
                let offset = param.resolve(scope)?;
                Mat4::translation(offset.x, offset.y, offset.z)
            }
            NodeOp::Rotate(param) => {
                let rotation = param.resolve(scope)?;
                Mat4::rotation(rotation.angle, rotation.axis.to_vec3())
            }
            NodeOp::Matrix(param) => param.resolve(scope)?,
            NodeOp::LookAt(param) => param.resolve(scope)?.matrix(),
            other => {
                return Err(SceneError::InvalidConfig(format!(
                    "{} node has no local transform",
                    other.kind()
                )))
            }
        };
        if let Some(cache) = self.cache(id).filter(|_| fixed) {
            cache.local = Some(matrix);
        }
        Ok(matrix)
    }

    /// Compose a transform node onto `target`, visit its children, restore
    fn transform_subtree(
        &mut self,
        id: NodeId,
        node: &Node,
        scope: &Scope,
        target: BackendKind,
    ) -> SceneResult<()> {
        let kind = node.kind();
        let own = |error: SceneError| SceneError::at_node(id, kind, error);

        let local = self.local_matrix(id, node.op(), scope).map_err(own)?;
        let inbound = self
            .registry
            .get::<TransformBackend>(&target)
            .map_err(own)?
            .transform();
        let fixed = node.op().is_fixed() && inbound.fixed;

        let memoized = if fixed {
            self.caches.get(id).and_then(|cache| cache.memoized(&inbound.matrix))
        } else {
            None
        };
        let composed = match memoized {
            Some(matrix) => {
                self.stats.memo_hits += 1;
                log::trace!("{} node {:?} reused its composed transform", kind, id);
                matrix
            }
            None => {
                self.stats.compositions += 1;
                let matrix = inbound.matrix.multiply_right(&local);
                if let Some(cache) = self.cache(id).filter(|_| fixed) {
                    cache.remember(&inbound.matrix, matrix);
                }
                matrix
            }
        };

        self.registry
            .get_mut::<TransformBackend>(&target)
            .map_err(own)?
            .set_transform(TransformState::new(composed, fixed));
        let result = self.visit_children(node, scope);
        self.registry
            .get_mut::<TransformBackend>(&target)
            .map_err(own)?
            .set_transform(inbound);
        result
    }

    /// Resolve an instance target and push it on the instance stack
    fn enter_instance(&mut self, name: &str) -> SceneResult<NodeId> {
        if self.instance_stack.iter().any(|active| active == name) {
            let mut chain: Vec<String> = self
                .instance_stack
                .iter()
                .skip_while(|active| *active != name)
                .cloned()
                .collect();
            chain.push(name.to_string());
            return Err(SceneError::CyclicInstance { chain });
        }
        if self.instance_stack.len() >= self.max_instance_depth {
            return Err(SceneError::InstanceDepthExceeded(self.max_instance_depth));
        }
        let target = self
            .graph
            .symbol(name)
            .ok_or_else(|| SceneError::UnresolvedSymbol(name.to_string()))?;
        self.instance_stack.push(name.to_string());
        Ok(target)
    }

    /// Buffers for `mesh`, uploading them if this context generation has none
    fn buffers(&mut self, id: NodeId, mesh: &Geometry) -> GeometryBuffers {
        let generation = self.context.generation();
        if let Some(buffers) = self.caches.get(id).and_then(|cache| cache.buffers) {
            if buffers.generation == generation {
                return buffers;
            }
        }
        log::debug!(
            "Uploading geometry '{}' ({} vertices, {} indices)",
            mesh.name,
            mesh.vertex_count(),
            mesh.index_count()
        );
        let buffers = GeometryBuffers {
            generation,
            positions: self.context.create_buffer(BufferTarget::Array, mesh.position_bytes()),
            normals: self.context.create_buffer(BufferTarget::Array, mesh.normal_bytes()),
            indices: self.context.create_buffer(BufferTarget::ElementArray, mesh.index_bytes()),
        };
        if let Some(cache) = self.cache(id) {
            cache.buffers = Some(buffers);
        }
        buffers
    }

    /// Issue one draw of `mesh` with the state currently held by every backend
    fn draw(&mut self, id: NodeId, mesh: &Geometry) -> SceneResult<()> {
        if self.context.is_context_lost() {
            return Err(SceneError::ContextLost);
        }

        let transform = |registry: &BackendRegistry, kind: BackendKind| -> SceneResult<Mat4> {
            Ok(registry.get::<TransformBackend>(&kind)?.transform().matrix)
        };
        let model = transform(&*self.registry, BackendKind::ModelTransform)?;
        let view = transform(&*self.registry, BackendKind::ViewTransform)?;
        let projection = transform(&*self.registry, BackendKind::Projection)?;
        let material: Option<MaterialState> = self
            .registry
            .get::<MaterialBackend>(&BackendKind::Material)?
            .material();
        let lights: Rc<[LightSource]> = self.registry.get::<LightsBackend>(&BackendKind::Lights)?.lights();
        let custom = self.registry.custom_states();

        let buffers = self.buffers(id, mesh);

        let shader = self.registry.get_mut::<ShaderBackend>(&BackendKind::Shader)?;
        let context = &mut *self.context;
        shader.bind(context)?;

        let uniforms = [
            (UniformSlot::ProjectionMatrix, Some(UniformValue::Matrix(projection))),
            (UniformSlot::ViewMatrix, Some(UniformValue::Matrix(view))),
            (UniformSlot::ModelMatrix, Some(UniformValue::Matrix(model))),
            (UniformSlot::Material, material.map(UniformValue::Material)),
            (UniformSlot::Lights, Some(UniformValue::Lights(lights))),
        ];
        for (slot, value) in uniforms {
            shader.set_uniform(context, slot, value.as_ref())?;
        }
        for (kind, value) in custom {
            shader.set_uniform(context, UniformSlot::Custom(kind), value.as_ref())?;
        }
        shader.bind_attribute(context, AttributeSlot::Vertex, buffers.positions)?;
        shader.bind_attribute(context, AttributeSlot::Normal, buffers.normals)?;

        context.bind_buffer(BufferTarget::ElementArray, buffers.indices);
        context.draw_elements(mesh.mode, mesh.index_count(), 0);
        self.stats.draw_calls += 1;
        log::trace!("Drew geometry '{}' from {} node {:?}", mesh.name, NodeKind::Geometry, id);
        Ok(())
    }
}
