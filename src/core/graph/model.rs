use crate::core::dynamics::InitConditions;
use crate::core::error::StructuralError;
use crate::core::types::{InputPort, ModelId, OutputPort};
use std::collections::BTreeSet;

/// Separator between the names of a model path, e.g. `top:sub:A`
pub const PATH_SEPARATOR: char = ':';

/// One end of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub model: ModelId,
    pub port: String,
}

/// A directed connection between two ports.
///
/// For external-input connections `source.model` is the coupled model itself;
/// for external-output connections `target.model` is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: Endpoint,
    pub target: Endpoint,
}

/// Leaf model bound to one behavioural unit
#[derive(Debug, Clone)]
pub struct AtomicModel {
    /// Name of the dynamics in the registry
    pub dynamics: String,
    /// Initial conditions handed to the dynamics
    pub conditions: InitConditions,
}

/// Composition node owning children and three connection relations
#[derive(Debug, Clone, Default)]
pub struct CoupledModel {
    pub children: Vec<ModelId>,
    pub input_connections: Vec<Connection>,
    pub internal_connections: Vec<Connection>,
    pub output_connections: Vec<Connection>,
}

#[derive(Debug, Clone)]
pub enum ModelKind {
    Atomic(AtomicModel),
    Coupled(CoupledModel),
}

#[derive(Debug, Clone)]
pub struct ModelNode {
    name: String,
    parent: Option<ModelId>,
    inputs: BTreeSet<String>,
    outputs: BTreeSet<String>,
    kind: ModelKind,
}

impl ModelNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ModelId> {
        self.parent
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, ModelKind::Atomic(_))
    }

    pub fn has_input_port(&self, port: &str) -> bool {
        self.inputs.contains(port)
    }

    pub fn has_output_port(&self, port: &str) -> bool {
        self.outputs.contains(port)
    }

    pub fn input_ports(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(String::as_str)
    }

    pub fn output_ports(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(String::as_str)
    }

    pub fn as_atomic(&self) -> Option<&AtomicModel> {
        match &self.kind {
            ModelKind::Atomic(atomic) => Some(atomic),
            ModelKind::Coupled(_) => None,
        }
    }

    pub fn as_coupled(&self) -> Option<&CoupledModel> {
        match &self.kind {
            ModelKind::Coupled(coupled) => Some(coupled),
            ModelKind::Atomic(_) => None,
        }
    }
}

/// Static model composition stored as an arena.
///
/// Nodes refer to each other by `ModelId`; the child to parent link is a
/// plain index so the tree has no ownership cycles.
#[derive(Debug, Clone)]
pub struct ModelGraph {
    nodes: Vec<ModelNode>,
}

impl ModelGraph {
    /// Create a graph holding a single, empty coupled root
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![ModelNode {
                name: root_name.to_string(),
                parent: None,
                inputs: BTreeSet::new(),
                outputs: BTreeSet::new(),
                kind: ModelKind::Coupled(CoupledModel::default()),
            }],
        }
    }

    pub fn root(&self) -> ModelId {
        ModelId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ModelId) -> Option<&ModelNode> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: ModelId) -> Result<&mut ModelNode, StructuralError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| StructuralError::UnknownModel(id.to_string()))
    }

    fn coupled(&self, id: ModelId) -> Result<&CoupledModel, StructuralError> {
        let node = self
            .node(id)
            .ok_or_else(|| StructuralError::UnknownModel(id.to_string()))?;
        match &node.kind {
            ModelKind::Coupled(coupled) => Ok(coupled),
            ModelKind::Atomic(_) => Err(StructuralError::UnknownModel(format!(
                "{} (atomic model cannot own children)",
                self.path(id)
            ))),
        }
    }

    fn coupled_mut(&mut self, id: ModelId) -> Result<&mut CoupledModel, StructuralError> {
        let path = self.path(id);
        match &mut self.node_mut(id)?.kind {
            ModelKind::Coupled(coupled) => Ok(coupled),
            ModelKind::Atomic(_) => Err(StructuralError::UnknownModel(format!(
                "{} (atomic model cannot own children)",
                path
            ))),
        }
    }

    fn add_node(
        &mut self,
        parent: ModelId,
        name: &str,
        kind: ModelKind,
    ) -> Result<ModelId, StructuralError> {
        let duplicate = self
            .coupled(parent)?
            .children
            .iter()
            .any(|child| self.nodes[child.0].name == name);
        if duplicate {
            return Err(StructuralError::DuplicateModel {
                parent: self.path(parent),
                name: name.to_string(),
            });
        }

        let id = ModelId(self.nodes.len());
        self.nodes.push(ModelNode {
            name: name.to_string(),
            parent: Some(parent),
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
            kind,
        });
        self.coupled_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Add an atomic child bound to the named dynamics
    pub fn add_atomic(
        &mut self,
        parent: ModelId,
        name: &str,
        dynamics: &str,
        conditions: InitConditions,
    ) -> Result<ModelId, StructuralError> {
        self.add_node(
            parent,
            name,
            ModelKind::Atomic(AtomicModel {
                dynamics: dynamics.to_string(),
                conditions,
            }),
        )
    }

    /// Add an empty coupled child
    pub fn add_coupled(&mut self, parent: ModelId, name: &str) -> Result<ModelId, StructuralError> {
        self.add_node(parent, name, ModelKind::Coupled(CoupledModel::default()))
    }

    pub fn add_input_port(&mut self, model: ModelId, port: &str) -> Result<(), StructuralError> {
        self.node_mut(model)?.inputs.insert(port.to_string());
        Ok(())
    }

    pub fn add_output_port(&mut self, model: ModelId, port: &str) -> Result<(), StructuralError> {
        self.node_mut(model)?.outputs.insert(port.to_string());
        Ok(())
    }

    fn expect_child(&self, parent: ModelId, child: ModelId) -> Result<(), StructuralError> {
        match self.node(child) {
            Some(node) if node.parent == Some(parent) => Ok(()),
            Some(_) => Err(StructuralError::NotAChild {
                model: self.path(child),
                parent: self.path(parent),
            }),
            None => Err(StructuralError::UnknownModel(child.to_string())),
        }
    }

    fn parent_of(&self, model: ModelId) -> Result<ModelId, StructuralError> {
        self.node(model)
            .ok_or_else(|| StructuralError::UnknownModel(model.to_string()))?
            .parent
            .ok_or_else(|| StructuralError::NotAChild {
                model: self.path(model),
                parent: "<none>".to_string(),
            })
    }

    /// Connect an output port of one child to an input port of a sibling.
    ///
    /// Port existence is checked when the graph is validated, not here.
    pub fn connect_internal(
        &mut self,
        source: OutputPort,
        target: InputPort,
    ) -> Result<(), StructuralError> {
        let parent = self.parent_of(source.model_id)?;
        self.expect_child(parent, target.model_id)?;
        self.coupled_mut(parent)?.internal_connections.push(Connection {
            source: Endpoint {
                model: source.model_id,
                port: source.port_name,
            },
            target: Endpoint {
                model: target.model_id,
                port: target.port_name,
            },
        });
        Ok(())
    }

    /// Connect an input port of a coupled model to an input port of one of its children
    pub fn connect_input(
        &mut self,
        source: InputPort,
        target: InputPort,
    ) -> Result<(), StructuralError> {
        self.expect_child(source.model_id, target.model_id)?;
        self.coupled_mut(source.model_id)?
            .input_connections
            .push(Connection {
                source: Endpoint {
                    model: source.model_id,
                    port: source.port_name,
                },
                target: Endpoint {
                    model: target.model_id,
                    port: target.port_name,
                },
            });
        Ok(())
    }

    /// Connect an output port of a child to an output port of its coupled parent
    pub fn connect_output(
        &mut self,
        source: OutputPort,
        target: OutputPort,
    ) -> Result<(), StructuralError> {
        self.expect_child(target.model_id, source.model_id)?;
        self.coupled_mut(target.model_id)?
            .output_connections
            .push(Connection {
                source: Endpoint {
                    model: source.model_id,
                    port: source.port_name,
                },
                target: Endpoint {
                    model: target.model_id,
                    port: target.port_name,
                },
            });
        Ok(())
    }

    /// Full path of a model, its ancestors' names joined by `:`
    pub fn path(&self, id: ModelId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(model) = current {
            match self.node(model) {
                Some(node) => {
                    names.push(node.name.as_str());
                    current = node.parent;
                }
                None => break,
            }
        }
        names.reverse();
        names.join(&PATH_SEPARATOR.to_string())
    }

    /// Find a model from its full path (root name included)
    pub fn find(&self, path: &str) -> Option<ModelId> {
        let mut names = path.split(PATH_SEPARATOR);
        if names.next()? != self.nodes[0].name {
            return None;
        }
        let mut current = self.root();
        for name in names {
            let coupled = self.node(current)?.as_coupled()?;
            current = *coupled
                .children
                .iter()
                .find(|child| self.nodes[child.0].name == name)?;
        }
        Some(current)
    }

    /// Every model in pre-order (parent before children, children in insertion order)
    pub fn preorder(&self) -> Vec<ModelId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let ModelKind::Coupled(coupled) = &self.nodes[id.0].kind {
                stack.extend(coupled.children.iter().rev().copied());
            }
        }
        order
    }

    /// Atomic models in pre-order
    pub fn preorder_atomics(&self) -> Vec<ModelId> {
        self.preorder()
            .into_iter()
            .filter(|id| self.nodes[id.0].is_atomic())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ModelGraph, ModelId, ModelId, ModelId) {
        let mut graph = ModelGraph::new("top");
        let root = graph.root();
        let a = graph
            .add_atomic(root, "A", "generator", InitConditions::new())
            .unwrap();
        let sub = graph.add_coupled(root, "sub").unwrap();
        let b = graph
            .add_atomic(sub, "B", "recorder", InitConditions::new())
            .unwrap();
        (graph, a, sub, b)
    }

    #[test]
    fn test_paths() {
        let (graph, a, sub, b) = sample();
        assert_eq!(graph.path(graph.root()), "top");
        assert_eq!(graph.path(a), "top:A");
        assert_eq!(graph.path(b), "top:sub:B");
        assert_eq!(graph.find("top:sub:B"), Some(b));
        assert_eq!(graph.find("top:sub"), Some(sub));
        assert_eq!(graph.find("other:A"), None);
        assert_eq!(graph.find("top:B"), None);
    }

    #[test]
    fn test_preorder() {
        let (graph, a, sub, b) = sample();
        assert_eq!(graph.preorder(), vec![graph.root(), a, sub, b]);
        assert_eq!(graph.preorder_atomics(), vec![a, b]);
    }

    #[test]
    fn test_duplicate_child_rejected() {
        let (mut graph, _, _, _) = sample();
        let root = graph.root();
        let err = graph.add_coupled(root, "A").unwrap_err();
        assert!(matches!(err, StructuralError::DuplicateModel { .. }));
    }

    #[test]
    fn test_connections_require_parent_child() {
        let (mut graph, a, sub, b) = sample();
        // A and B are not siblings
        assert!(graph.connect_internal(a.output("out"), b.input("in")).is_err());
        assert!(graph.connect_internal(a.output("out"), sub.input("in")).is_ok());
        assert!(graph.connect_input(sub.input("in"), b.input("in")).is_ok());
        assert!(graph.connect_output(b.output("out"), sub.output("out")).is_ok());
        assert!(graph.connect_output(a.output("out"), sub.output("out")).is_err());
    }

    #[test]
    fn test_atomic_cannot_own_children() {
        let (mut graph, a, _, _) = sample();
        assert!(graph.add_coupled(a, "x").is_err());
    }
}
