use crate::core::error::{PortDirection, StructuralError};
use crate::core::graph::model::{Connection, ModelGraph, ModelKind};
use crate::core::types::ModelId;

/// Port validation utilities for model graphs
pub struct PortValidator;

impl PortValidator {
    /// Check every connection of every coupled model.
    ///
    /// Fails on the first connection that references a port missing from
    /// its model, or a model that is not where the relation says it is.
    pub fn validate_graph(graph: &ModelGraph) -> Result<(), StructuralError> {
        for id in graph.preorder() {
            let coupled = match graph.node(id).map(|node| node.kind()) {
                Some(ModelKind::Coupled(coupled)) => coupled,
                _ => continue,
            };

            for connection in &coupled.input_connections {
                Self::expect_model(graph, connection.source.model, id)?;
                Self::validate_input(graph, connection.source.model, &connection.source.port)?;
                Self::validate_child_input(graph, id, connection)?;
            }

            for connection in &coupled.internal_connections {
                Self::expect_parent(graph, connection.source.model, id)?;
                Self::validate_output(graph, connection.source.model, &connection.source.port)?;
                Self::validate_child_input(graph, id, connection)?;
            }

            for connection in &coupled.output_connections {
                Self::expect_parent(graph, connection.source.model, id)?;
                Self::validate_output(graph, connection.source.model, &connection.source.port)?;
                Self::expect_model(graph, connection.target.model, id)?;
                Self::validate_output(graph, connection.target.model, &connection.target.port)?;
            }
        }
        Ok(())
    }

    fn validate_child_input(
        graph: &ModelGraph,
        parent: ModelId,
        connection: &Connection,
    ) -> Result<(), StructuralError> {
        Self::expect_parent(graph, connection.target.model, parent)?;
        Self::validate_input(graph, connection.target.model, &connection.target.port)
    }

    /// Validate that a model has the specified input port
    pub fn validate_input(
        graph: &ModelGraph,
        model: ModelId,
        port: &str,
    ) -> Result<(), StructuralError> {
        let node = graph
            .node(model)
            .ok_or_else(|| StructuralError::UnknownModel(model.to_string()))?;
        if !node.has_input_port(port) {
            return Err(StructuralError::UnknownPort {
                model: graph.path(model),
                port: port.to_string(),
                direction: PortDirection::Input,
            });
        }
        Ok(())
    }

    /// Validate that a model has the specified output port
    pub fn validate_output(
        graph: &ModelGraph,
        model: ModelId,
        port: &str,
    ) -> Result<(), StructuralError> {
        let node = graph
            .node(model)
            .ok_or_else(|| StructuralError::UnknownModel(model.to_string()))?;
        if !node.has_output_port(port) {
            return Err(StructuralError::UnknownPort {
                model: graph.path(model),
                port: port.to_string(),
                direction: PortDirection::Output,
            });
        }
        Ok(())
    }

    fn expect_model(
        graph: &ModelGraph,
        actual: ModelId,
        expected: ModelId,
    ) -> Result<(), StructuralError> {
        if actual != expected {
            return Err(StructuralError::NotAChild {
                model: graph.path(actual),
                parent: graph.path(expected),
            });
        }
        Ok(())
    }

    fn expect_parent(
        graph: &ModelGraph,
        child: ModelId,
        parent: ModelId,
    ) -> Result<(), StructuralError> {
        let node = graph
            .node(child)
            .ok_or_else(|| StructuralError::UnknownModel(child.to_string()))?;
        if node.parent() != Some(parent) {
            return Err(StructuralError::NotAChild {
                model: graph.path(child),
                parent: graph.path(parent),
            });
        }
        Ok(())
    }
}
