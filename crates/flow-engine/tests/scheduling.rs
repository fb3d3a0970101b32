//! Ordering and planning over generated graphs

use std::collections::HashMap;

use flow_engine::{
    build_plan, template, topological_order, validate_workflow, EngineConfig, NodeRegistry,
    ValidationError, Workflow, WorkflowBuilder,
};
use serde_json::json;

/// Small deterministic generator so failures reproduce
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

/// Random DAG: edges only go from a lower to a higher rank, nodes are
/// declared in shuffled order
fn random_dag(seed: u64, nodes: usize) -> Workflow {
    let mut rng = Lcg(seed);
    let mut ids: Vec<usize> = (0..nodes).collect();
    for i in (1..ids.len()).rev() {
        let j = (rng.next() as usize) % (i + 1);
        ids.swap(i, j);
    }

    let mut builder = WorkflowBuilder::new(format!("dag-{}", seed), "Generated");
    for id in &ids {
        builder = builder.add_node(format!("n{}", id), "noop");
    }
    for from in 0..nodes {
        for to in (from + 1)..nodes {
            if rng.next() % 4 == 0 {
                builder = builder.connect(format!("n{}", from), format!("n{}", to));
            }
        }
    }
    builder.build()
}

#[test]
fn test_order_respects_every_edge() {
    for seed in 0..50 {
        let workflow = random_dag(seed, 12);
        let order = topological_order(&workflow).unwrap();
        assert_eq!(order.len(), workflow.nodes.len());

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        for edge in &workflow.edges {
            assert!(
                position[edge.source.as_str()] < position[edge.target.as_str()],
                "seed {}: edge {} -> {} out of order",
                seed,
                edge.source,
                edge.target
            );
        }
    }
}

#[test]
fn test_independent_nodes_keep_declaration_order() {
    let workflow = WorkflowBuilder::new("flat", "Flat")
        .add_node("z", "noop")
        .add_node("a", "noop")
        .add_node("m", "noop")
        .build();
    assert_eq!(topological_order(&workflow).unwrap(), vec!["z", "a", "m"]);
}

#[test]
fn test_plan_separates_recovery_branch() {
    let workflow = WorkflowBuilder::new("plan", "Plan")
        .add_node("start", "manual-trigger")
        .add_node("work", "noop")
        .add_node("on-error", "error-trigger")
        .add_node("alert", "format")
        .add_node("report", "noop")
        .connect("start", "work")
        .connect("on-error", "alert")
        .connect("alert", "report")
        // joins both paths, so it stays forward
        .connect("work", "report")
        .build();

    let plan = build_plan(&workflow).unwrap();
    assert_eq!(plan.forward, vec!["start", "work", "report"]);
    assert_eq!(plan.recovery, vec!["on-error", "alert"]);
}

#[test]
fn test_validation_collects_all_problems() {
    let mut workflow = WorkflowBuilder::new("bad", "Bad")
        .add_node("a", "manual-trigger")
        .add_node("check", "if-else")
        .add_node("x", "mystery")
        .connect("a", "check")
        .connect_branch("check", "maybe", "x")
        .connect("x", "ghost")
        .build();
    workflow.nodes.push(workflow.nodes[0].clone());

    let registry = NodeRegistry::with_core_handlers(&EngineConfig::default());
    let errors = validate_workflow(&workflow, Some(&registry));

    assert!(errors.contains(&ValidationError::DuplicateNode {
        node_id: "a".to_string()
    }));
    assert!(errors.iter().any(|e| matches!(e, ValidationError::UnknownNode { node_id, .. } if node_id == "ghost")));
    assert!(errors.iter().any(|e| matches!(e, ValidationError::UnknownNodeType { node_type, .. } if node_type == "mystery")));
    assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidBranchHandle { handle, .. } if handle == "maybe")));
}

#[test]
fn test_resolving_a_resolved_string_is_a_noop() {
    let ctx = json!({"a": {"b": 5}, "name": "Ada"});
    let once = template::resolve("{{input.a.b}} for {{name}}", &ctx);
    assert_eq!(once, "5 for Ada");
    assert_eq!(template::resolve(&once, &ctx), once);
    assert_eq!(template::resolve("{{input.missing}}", &ctx), "{{input.missing}}");
}
