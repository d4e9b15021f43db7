//! Causal DAG. A static cause→effect rule table is filtered down
//! to the evidence ids that actually fired this tick, then linearized into
//! the chain rendered in the narrative ("X → Y → Z").

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::evidence::Evidence;

/// `(from_id, to_id, weight)`. Weight is the rule's confidence that `from`
/// causes `to`, not a probability — only used to rank linearization paths.
fn causal_rules() -> Vec<(&'static str, &'static str, f64)> {
    vec![
        ("cpu.cgroup.throttle", "cpu.runqueue", 0.80),
        ("cpu.runqueue", "cpu.psi", 0.85),
        ("cpu.steal", "cpu.psi", 0.60),
        ("cpu.softirq", "cpu.psi", 0.40),
        ("mem.available.low", "mem.swap.activity", 0.60),
        ("mem.swap.activity", "io.psi", 0.70),
        ("mem.swap.activity", "io.disk.latency", 0.55),
        ("mem.reclaim.direct", "mem.psi", 0.65),
        ("io.disk.util", "io.disk.latency", 0.60),
        ("io.disk.latency", "io.dstate", 0.75),
        ("net.tcp.retrans", "net.closewait", 0.50),
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Root,
    Symptom,
    Intermediate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CausalEdge {
    pub from: String,
    pub to: String,
    pub weight: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CausalDag {
    pub nodes: HashMap<String, NodeRole>,
    pub edges: Vec<CausalEdge>,
    /// DFS-linearized chain of maximum total weight, one per root, already
    /// rendered as `"a → b → c"`.
    pub chains: Vec<String>,
}

/// Builds the DAG from evidence with strength ≥ 0.35 (strongest copy wins on
/// a duplicate id), classifies nodes, then linearizes from every root.
pub fn build_causal_dag(evidence: &[Evidence]) -> CausalDag {
    let mut strongest: HashMap<&str, f64> = HashMap::new();
    for e in evidence {
        if e.strength < 0.35 {
            continue;
        }
        strongest
            .entry(e.id.as_str())
            .and_modify(|s| {
                if e.strength > *s {
                    *s = e.strength;
                }
            })
            .or_insert(e.strength);
    }
    let present: HashSet<&str> = strongest.keys().copied().collect();

    let edges: Vec<CausalEdge> = causal_rules()
        .into_iter()
        .filter(|(from, to, _)| present.contains(from) && present.contains(to))
        .map(|(from, to, weight)| CausalEdge { from: from.to_string(), to: to.to_string(), weight })
        .collect();

    let mut has_incoming: HashSet<&str> = HashSet::new();
    let mut has_outgoing: HashSet<&str> = HashSet::new();
    for e in &edges {
        has_outgoing.insert(e.from.as_str());
        has_incoming.insert(e.to.as_str());
    }

    let mut nodes = HashMap::new();
    for id in &present {
        let incoming = has_incoming.contains(id);
        let outgoing = has_outgoing.contains(id);
        let role = match (incoming, outgoing) {
            (false, true) => NodeRole::Root,
            (true, false) => NodeRole::Symptom,
            _ => NodeRole::Intermediate,
        };
        nodes.insert(id.to_string(), role);
    }

    let roots: Vec<&str> = nodes
        .iter()
        .filter(|(_, role)| **role == NodeRole::Root)
        .map(|(id, _)| id.as_str())
        .collect();

    let mut chains: Vec<String> = roots.iter().map(|root| longest_path(root, &edges)).collect();
    chains.sort();
    CausalDag { nodes, edges, chains }
}

/// DFS from `root` over `edges`, returning the path (by total weight, ties
/// broken by length) rendered as `"a → b → c"`.
fn longest_path(root: &str, edges: &[CausalEdge]) -> String {
    fn walk(node: &str, edges: &[CausalEdge], path: &mut Vec<String>, best: &mut (f64, Vec<String>)) {
        let outgoing: Vec<&CausalEdge> = edges.iter().filter(|e| e.from == node).collect();
        let total: f64 = path_weight(path, edges);
        if total > best.0 || (total == best.0 && path.len() > best.1.len()) {
            *best = (total, path.clone());
        }
        for edge in outgoing {
            if path.contains(&edge.to) {
                continue; // guards against rule-table cycles
            }
            path.push(edge.to.clone());
            walk(&edge.to, edges, path, best);
            path.pop();
        }
    }

    fn path_weight(path: &[String], edges: &[CausalEdge]) -> f64 {
        path.windows(2)
            .map(|pair| edges.iter().find(|e| e.from == pair[0] && e.to == pair[1]).map(|e| e.weight).unwrap_or(0.0))
            .sum()
    }

    let mut path = vec![root.to_string()];
    let mut best = (0.0, path.clone());
    walk(root, edges, &mut path, &mut best);
    best.1.join(" \u{2192} ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{emit, Domain};

    fn ev(id: &str, value: f64, warn: f64, crit: f64) -> Evidence {
        emit(id, Domain::Cpu, value, warn, crit, true, 0.9, format!("{id} fired"), "10s", vec![])
    }

    #[test]
    fn io_latency_causes_dstate_edge_present() {
        let evs = vec![ev("io.disk.latency", 60.0, 20.0, 200.0), ev("io.dstate", 5.0, 3.0, 10.0)];
        let dag = build_causal_dag(&evs);
        assert!(dag.edges.iter().any(|e| e.from == "io.disk.latency" && e.to == "io.dstate"));
        assert!(dag.chains.iter().any(|c| c.contains("io.disk.latency") && c.contains("io.dstate")));
    }

    #[test]
    fn cpu_throttle_cascade_chain_ends_at_psi() {
        let evs = vec![
            ev("cpu.cgroup.throttle", 40.0, 5.0, 30.0),
            ev("cpu.runqueue", 2.0, 1.0, 3.0),
            ev("cpu.psi", 25.0, 2.0, 15.0),
        ];
        let dag = build_causal_dag(&evs);
        let chain = dag.chains.iter().find(|c| c.starts_with("cpu.cgroup.throttle")).unwrap();
        assert!(chain.ends_with("cpu.psi"));
    }

    #[test]
    fn nodes_with_no_edges_get_no_classification() {
        let evs = vec![ev("cpu.ctxswitch", 50_000.0, 30_000.0, 100_000.0)];
        let dag = build_causal_dag(&evs);
        assert!(dag.nodes.is_empty());
    }
}
