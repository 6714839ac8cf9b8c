use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// A step in a user-assembled pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    /// Tool the step runs; the id doubles as the tool name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn tool_name(&self) -> &str {
        self.tool.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    #[serde(alias = "source")]
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
}

impl WorkflowEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> Self {
        Self { nodes, edges }
    }

    /// Shape problems that make the graph meaningless, in discovery order
    pub fn structural_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.nodes.is_empty() {
            errors.push("Workflow has no nodes".to_string());
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                errors.push("Node with an empty id".to_string());
            } else if !ids.insert(node.id.as_str()) {
                errors.push(format!("Duplicate node id '{}'", node.id));
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !ids.contains(endpoint.as_str()) {
                    errors.push(format!(
                        "Edge {} -> {} references unknown node '{}'",
                        edge.from, edge.to, endpoint
                    ));
                }
            }
        }
        errors
    }

    fn adjacency(&self) -> Vec<Vec<usize>> {
        let positions: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();

        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) =
                (positions.get(edge.from.as_str()), positions.get(edge.to.as_str()))
            {
                adjacency[from].push(to);
            }
        }
        adjacency
    }

    /// Depth-first search with an explicit stack; an edge into a node that is
    /// still on the stack closes a cycle. Edges to unknown nodes are ignored.
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let adjacency = self.adjacency();
        let mut marks = vec![Mark::Unvisited; adjacency.len()];

        for root in 0..adjacency.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            // (node, index of the next child to visit)
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::OnStack;

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                if let Some(&child) = adjacency[node].get(frame.1) {
                    frame.1 += 1;
                    match marks[child] {
                        Mark::OnStack => return true,
                        Mark::Unvisited => {
                            marks[child] = Mark::OnStack;
                            stack.push((child, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
        false
    }

    /// Nodes in dependency order, ties broken by declaration order
    ///
    /// Only meaningful for acyclic graphs; nodes on a cycle are appended last.
    pub fn connection_order(&self) -> Vec<&WorkflowNode> {
        let adjacency = self.adjacency();
        let mut indegree = vec![0usize; adjacency.len()];
        for targets in &adjacency {
            for &to in targets {
                indegree[to] += 1;
            }
        }

        let mut ready: VecDeque<usize> = (0..adjacency.len()).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(adjacency.len());
        let mut placed = vec![false; adjacency.len()];

        while let Some(node) = ready.pop_front() {
            order.push(node);
            placed[node] = true;
            let mut unlocked: Vec<usize> = Vec::new();
            for &to in &adjacency[node] {
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    unlocked.push(to);
                }
            }
            unlocked.sort_unstable();
            ready.extend(unlocked);
        }

        order.extend((0..adjacency.len()).filter(|&i| !placed[i]));
        order.into_iter().map(|i| &self.nodes[i]).collect()
    }

    /// Plain-text rendering used in the coherence prompt
    pub fn describe(&self) -> String {
        let mut lines = vec!["Steps in execution order:".to_string()];
        for (i, node) in self.connection_order().into_iter().enumerate() {
            if node.tool_name() == node.id {
                lines.push(format!("{}. {}", i + 1, node.id));
            } else {
                lines.push(format!("{}. {} (tool: {})", i + 1, node.id, node.tool_name()));
            }
        }

        lines.push("Connections:".to_string());
        if self.edges.is_empty() {
            lines.push("(none)".to_string());
        }
        for edge in &self.edges {
            lines.push(format!("{} -> {}", edge.from, edge.to));
        }
        lines.join("\n")
    }
}
