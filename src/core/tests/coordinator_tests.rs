// Tests for Coordinator routing, cascades and views
#[cfg(test)]
mod tests {
    use crate::core::dynamics::{DynamicsRegistry, InitConditions};
    use crate::core::error::{SimulationError, StructuralError};
    use crate::core::execution::{Coordinator, KernelConfig};
    use crate::core::graph::ModelGraph;
    use crate::core::observation::ViewSpec;
    use crate::core::types::{ModelId, INFINITY};
    use crate::core::values::Value;
    use std::sync::Arc;

    fn coordinator(config: KernelConfig, views: Vec<ViewSpec>) -> Coordinator {
        Coordinator::new(
            config,
            Arc::new(DynamicsRegistry::with_builtins()),
            views,
            1,
            "test-run".to_string(),
        )
    }

    fn generator(graph: &mut ModelGraph, parent: ModelId, name: &str, limit: i64) -> ModelId {
        let id = graph
            .add_atomic(
                parent,
                name,
                "generator",
                InitConditions::new().with("limit", limit),
            )
            .unwrap();
        graph.add_output_port(id, "out").unwrap();
        id
    }

    fn recorder(graph: &mut ModelGraph, parent: ModelId, name: &str) -> ModelId {
        let id = graph
            .add_atomic(parent, name, "recorder", InitConditions::new())
            .unwrap();
        graph.add_input_port(id, "in").unwrap();
        id
    }

    fn counter(graph: &mut ModelGraph, parent: ModelId, name: &str) -> ModelId {
        let id = graph
            .add_atomic(parent, name, "counter", InitConditions::new())
            .unwrap();
        graph.add_input_port(id, "in").unwrap();
        graph.add_output_port(id, "count").unwrap();
        id
    }

    #[test]
    fn test_fan_out_through_coupled_input() {
        let mut graph = ModelGraph::new("top");
        let root = graph.root();
        let a = generator(&mut graph, root, "A", 1);
        let sub = graph.add_coupled(root, "sub").unwrap();
        graph.add_input_port(sub, "in").unwrap();
        let b1 = recorder(&mut graph, sub, "B1");
        let b2 = recorder(&mut graph, sub, "B2");
        graph.connect_internal(a.output("out"), sub.input("in")).unwrap();
        graph.connect_input(sub.input("in"), b1.input("in")).unwrap();
        graph.connect_input(sub.input("in"), b2.input("in")).unwrap();

        let mut coordinator = coordinator(KernelConfig::default(), vec![]);
        coordinator.init(graph, 0.0, 10.0).unwrap();
        assert_eq!(coordinator.current_time(), 0.0);
        coordinator.run().unwrap();

        let simulators = coordinator.simulators();
        assert_eq!(simulators.len(), 3);
        assert_eq!(simulators[1].path(), "top:sub:B1");
        assert_eq!(simulators[1].observation("in", 0.0), Some(Value::Double(0.0)));
        assert_eq!(simulators[2].observation("in", 0.0), Some(Value::Double(0.0)));
        assert_eq!(coordinator.current_time(), INFINITY);
    }

    #[test]
    fn test_root_outputs_are_logged() {
        let mut graph = ModelGraph::new("top");
        let root = graph.root();
        graph.add_output_port(root, "out").unwrap();
        let a = generator(&mut graph, root, "A", 2);
        graph.connect_output(a.output("out"), root.output("out")).unwrap();

        let mut coordinator = coordinator(KernelConfig::default(), vec![]);
        coordinator.init(graph, 0.0, 10.0).unwrap();
        coordinator.run().unwrap();
        coordinator.run().unwrap();

        let outputs = coordinator.take_root_outputs();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[1].time, 1.0);
        assert_eq!(outputs[1].port, "out");
        assert_eq!(outputs[1].value, Value::Double(1.0));
        assert!(coordinator.take_root_outputs().is_empty());
    }

    #[test]
    fn test_counter_loop_hits_cascade_limit() {
        let mut graph = ModelGraph::new("top");
        let root = graph.root();
        let g = generator(&mut graph, root, "G", 1);
        let c1 = counter(&mut graph, root, "C1");
        let c2 = counter(&mut graph, root, "C2");
        graph.connect_internal(g.output("out"), c1.input("in")).unwrap();
        graph.connect_internal(c1.output("count"), c2.input("in")).unwrap();
        graph.connect_internal(c2.output("count"), c1.input("in")).unwrap();

        let config = KernelConfig::new().with_max_cascade_iterations(50);
        let mut coordinator = coordinator(config, vec![]);
        coordinator.init(graph, 0.0, 10.0).unwrap();

        match coordinator.run() {
            Err(SimulationError::Structural(StructuralError::InstantaneousCascade {
                time,
                iterations,
            })) => {
                assert_eq!(time, 0.0);
                assert_eq!(iterations, 50);
            }
            other => panic!("expected a cascade error, got {:?}", other),
        }
        assert!(coordinator.is_failed());
        assert!(matches!(coordinator.run(), Err(SimulationError::NotResumable)));
    }

    #[test]
    fn test_event_view_follows_transitions() {
        let mut graph = ModelGraph::new("top");
        let root = graph.root();
        let g = generator(&mut graph, root, "G", 3);
        let c = counter(&mut graph, root, "C");
        graph.connect_internal(g.output("out"), c.input("in")).unwrap();

        let views = vec![ViewSpec::event("counts").observe("top:C", "count")];
        let mut coordinator = coordinator(KernelConfig::default(), views);
        coordinator.init(graph, 0.0, 10.0).unwrap();
        while coordinator.current_time() < INFINITY {
            coordinator.run().unwrap();
        }

        let matrices = coordinator.matrices();
        let matrix = &matrices["counts"];
        assert_eq!(matrix.times(), vec![0.0, 1.0, 2.0]);
        assert_eq!(matrix.get(2, "top:C.count"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_undeclared_output_port_is_behavioral() {
        let mut graph = ModelGraph::new("top");
        let root = graph.root();
        graph
            .add_atomic(root, "A", "generator", InitConditions::new())
            .unwrap();

        let mut coordinator = coordinator(KernelConfig::default(), vec![]);
        coordinator.init(graph, 0.0, 1.0).unwrap();
        match coordinator.run() {
            Err(SimulationError::Behavioral { model, time, .. }) => {
                assert_eq!(model, "top:A");
                assert_eq!(time, 0.0);
            }
            other => panic!("expected a behavioral error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dynamics() {
        let mut graph = ModelGraph::new("top");
        let root = graph.root();
        graph
            .add_atomic(root, "A", "missing", InitConditions::new())
            .unwrap();

        let mut coordinator = coordinator(KernelConfig::default(), vec![]);
        let error = coordinator.init(graph, 0.0, 1.0).unwrap_err();
        assert!(matches!(
            error,
            SimulationError::Structural(StructuralError::UnknownDynamics { .. })
        ));
    }

    #[test]
    fn test_observable_must_be_atomic() {
        let mut graph = ModelGraph::new("top");
        let root = graph.root();
        graph.add_coupled(root, "sub").unwrap();

        let views = vec![ViewSpec::timed("v", 1.0).observe("top:sub", "x")];
        let mut coordinator = coordinator(KernelConfig::default(), views);
        assert!(coordinator.init(graph, 0.0, 1.0).unwrap_err().is_structural());
    }

    #[test]
    fn test_dynamic_observable() {
        let mut graph = ModelGraph::new("top");
        let root = graph.root();
        let g = generator(&mut graph, root, "G", 5);
        let b = recorder(&mut graph, root, "B");
        graph.connect_internal(g.output("out"), b.input("in")).unwrap();

        let views = vec![ViewSpec::timed("late", 1.0)];
        let mut coordinator = coordinator(KernelConfig::default(), views);
        coordinator.init(graph, 0.0, 10.0).unwrap();
        coordinator.run().unwrap();
        coordinator.run().unwrap();

        coordinator.add_observable("late", "top:B", "in").unwrap();
        coordinator.run().unwrap();
        assert!(coordinator.del_observable("late", "top:B", "in").unwrap());
        assert!(!coordinator.del_observable("late", "top:B", "in").unwrap());

        let matrices = coordinator.matrices();
        let matrix = &matrices["late"];
        assert_eq!(matrix.times(), vec![2.0]);
        assert_eq!(matrix.get(0, "top:B.in"), Some(&Value::Double(2.0)));
        assert!(coordinator.add_observable("nope", "top:B", "in").is_err());
    }
}
