//! Graph representation of a topology and graph queries on it.

use crate::components::Line;
use crate::topology::Topology;
use petgraph::algo::{astar, connected_components};
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Line,
    Transformer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub name: String,
    pub kind: EdgeKind,
    /// Line length in km, zero for transformers
    pub length: f64,
}

/// Undirected graph with buses as nodes and lines plus transformers as edges.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    pub graph: UnGraph<String, GraphEdge>,
    index: HashMap<String, NodeIndex>,
}

/// Summary statistics produced by `graph stats` (density/degree/connected components).
#[derive(Debug, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub connected_components: usize,
    pub min_degree: usize,
    pub avg_degree: f64,
    pub max_degree: usize,
    pub density: f64,
}

impl TopologyGraph {
    fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    fn add_line(&mut self, line: &Line) {
        if let (Some(&a), Some(&b)) = (self.index.get(&line.bus0), self.index.get(&line.bus1)) {
            self.graph.add_edge(
                a,
                b,
                GraphEdge {
                    name: line.name.clone(),
                    kind: EdgeKind::Line,
                    length: line.length,
                },
            );
        }
    }

    fn add_transformer(&mut self, name: &str, bus0: &str, bus1: &str) {
        if let (Some(&a), Some(&b)) = (self.index.get(bus0), self.index.get(bus1)) {
            self.graph.add_edge(
                a,
                b,
                GraphEdge {
                    name: name.to_string(),
                    kind: EdgeKind::Transformer,
                    length: 0.0,
                },
            );
        }
    }

    /// Whole topology in its current switching state.
    pub fn from_topology(topology: &Topology) -> Self {
        let mut g = Self::default();
        for name in topology.buses.keys() {
            g.add_node(name);
        }
        for line in topology.lines.values() {
            g.add_line(line);
        }
        for t in topology
            .transformers
            .values()
            .chain(topology.transformers_hvmv.values())
        {
            g.add_transformer(&t.name, &t.bus0, &t.bus1);
        }
        g
    }

    /// MV grid only, with all switches closed.
    pub fn mv_closed(topology: &Topology) -> Self {
        let mut g = Self::default();
        let mv_grid = topology.mv_grid();
        for name in mv_grid.bus_names() {
            g.add_node(name);
        }
        for line in mv_grid.lines() {
            let mut line = line.clone();
            if let Some(switch) = topology.switches.values().find(|s| s.branch == line.name) {
                if line.bus0 == switch.bus_open {
                    line.bus0 = switch.bus_closed.clone();
                } else if line.bus1 == switch.bus_open {
                    line.bus1 = switch.bus_closed.clone();
                }
            }
            g.add_line(&line);
        }
        g
    }

    /// Subgraph of one grid (MV or LV) in its current switching state.
    pub fn from_grid(grid: &crate::grids::Grid<'_>) -> Self {
        let mut g = Self::default();
        for name in grid.bus_names() {
            g.add_node(name);
        }
        for line in grid.lines() {
            g.add_line(line);
        }
        g
    }

    pub fn node(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn degree(&self, name: &str) -> usize {
        self.node(name)
            .map_or(0, |n| self.graph.neighbors(n).count())
    }

    /// Number of hops from `source` to every reachable bus.
    pub fn hop_distances(&self, source: &str) -> HashMap<String, usize> {
        let mut out = HashMap::new();
        let Some(start) = self.node(source) else {
            return out;
        };
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut visited = HashSet::from([start]);
        while let Some((node, depth)) = queue.pop_front() {
            out.insert(self.graph[node].clone(), depth);
            for neighbor in self.graph.neighbors(node) {
                if visited.insert(neighbor) {
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }
        out
    }

    /// Shortest path by line length as a list of bus names.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let (start, goal) = (self.node(from)?, self.node(to)?);
        let (_, path) = astar(
            &self.graph,
            start,
            |n| n == goal,
            |e| e.weight().length,
            |_| 0.0,
        )?;
        Some(path.into_iter().map(|n| self.graph[n].clone()).collect())
    }

    /// Length in km of the shortest path.
    pub fn path_length(&self, from: &str, to: &str) -> Option<f64> {
        let (start, goal) = (self.node(from)?, self.node(to)?);
        astar(
            &self.graph,
            start,
            |n| n == goal,
            |e| e.weight().length,
            |_| 0.0,
        )
        .map(|(cost, _)| cost)
    }

    /// Names of the edges along `path`.
    pub fn edges_along(&self, path: &[String]) -> Vec<String> {
        path.windows(2)
            .filter_map(|pair| {
                let a = self.node(&pair[0])?;
                let b = self.node(&pair[1])?;
                let edge = self.graph.find_edge(a, b)?;
                Some(self.graph[edge].name.clone())
            })
            .collect()
    }

    /// True if `to` is reachable from `from` without using the edge `skip`.
    pub fn has_path_without(&self, from: &str, to: &str, skip: &str) -> bool {
        let (Some(start), Some(goal)) = (self.node(from), self.node(to)) else {
            return false;
        };
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if node == goal {
                return true;
            }
            for edge in self.graph.edges(node) {
                if edge.weight().name == skip {
                    continue;
                }
                let next = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Connected components as sorted lists of bus names, largest first.
    pub fn islands(&self) -> Vec<Vec<String>> {
        let mut visited = HashSet::new();
        let mut islands = Vec::new();
        for start in self.graph.node_indices() {
            if visited.contains(&start) {
                continue;
            }
            let mut queue = VecDeque::new();
            queue.push_back(start);
            let mut members = Vec::new();
            while let Some(node) = queue.pop_front() {
                if !visited.insert(node) {
                    continue;
                }
                members.push(self.graph[node].clone());
                for neighbor in self.graph.neighbors(node) {
                    if !visited.contains(&neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
            members.sort();
            islands.push(members);
        }
        islands.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        islands
    }

    /// Buses without any line or transformer.
    pub fn isolated_nodes(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .graph
            .node_indices()
            .filter(|n| self.graph.neighbors(*n).next().is_none())
            .map(|n| self.graph[n].clone())
            .collect();
        out.sort();
        out
    }

    /// Fundamental cycles of the component containing `root`.
    ///
    /// A BFS spanning tree is grown from `root`; every non-tree edge closes
    /// exactly one cycle.
    pub fn cycle_basis(&self, root: &str) -> Vec<Vec<String>> {
        let Some(root) = self.node(root) else {
            return Vec::new();
        };
        let mut parent: HashMap<NodeIndex, (NodeIndex, EdgeIndex)> = HashMap::new();
        let mut depth: HashMap<NodeIndex, usize> = HashMap::from([(root, 0)]);
        let mut tree_edges = HashSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            for edge in self.graph.edges(node) {
                let next = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                if depth.contains_key(&next) {
                    continue;
                }
                let d = depth[&node] + 1;
                depth.insert(next, d);
                parent.insert(next, (node, edge.id()));
                tree_edges.insert(edge.id());
                queue.push_back(next);
            }
        }

        let mut cycles = Vec::new();
        for edge in self.graph.edge_references() {
            if tree_edges.contains(&edge.id()) || edge.source() == edge.target() {
                continue;
            }
            let (mut a, mut b) = (edge.source(), edge.target());
            if !depth.contains_key(&a) || !depth.contains_key(&b) {
                continue;
            }
            let mut left = vec![a];
            let mut right = vec![b];
            while a != b {
                if depth[&a] >= depth[&b] {
                    a = parent[&a].0;
                    left.push(a);
                } else {
                    b = parent[&b].0;
                    right.push(b);
                }
            }
            right.pop();
            right.reverse();
            left.extend(right);
            cycles.push(left.into_iter().map(|n| self.graph[n].clone()).collect());
        }
        cycles
    }

    pub fn stats(&self) -> GraphStats {
        let node_count = self.graph.node_count();
        let edge_count = self.graph.edge_count();
        let degrees: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors(n).count())
            .collect();
        let min_degree = *degrees.iter().min().unwrap_or(&0);
        let max_degree = *degrees.iter().max().unwrap_or(&0);
        let avg_degree = if node_count == 0 {
            0.0
        } else {
            degrees.iter().sum::<usize>() as f64 / node_count as f64
        };
        let density = if node_count < 2 {
            0.0
        } else {
            2.0 * edge_count as f64 / (node_count as f64 * (node_count as f64 - 1.0))
        };
        GraphStats {
            node_count,
            edge_count,
            connected_components: connected_components(&self.graph),
            min_degree,
            avg_degree,
            max_degree,
            density,
        }
    }

    /// Graphviz rendering of the graph.
    pub fn to_dot(&self) -> String {
        let mut buffer = String::from("graph gridplan_topology {\n");
        for node in self.graph.node_indices() {
            let label = self.graph[node].replace('"', "\\\"");
            buffer.push_str(&format!("  n{} [label=\"{}\"];\n", node.index(), label));
        }
        for edge in self.graph.edge_references() {
            let source = edge.source().index();
            let target = edge.target().index();
            buffer.push_str(&format!(
                "  n{source} -- n{target} [label=\"{}\"];\n",
                edge.weight().name.replace('"', "\\\"")
            ));
        }
        buffer.push('}');
        buffer
    }
}
