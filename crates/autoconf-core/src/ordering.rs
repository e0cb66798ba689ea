//! Before/after ordering of surviving candidates.
//!
//! Units are nodes of a directed graph. An edge `A → B` means "A must
//! precede B" and comes from either `A.before ∋ B` or `B.after ∋ A`.
//! References to units outside the given set (pruned, excluded or never
//! discovered) are dropped: ordering only binds among survivors.
//!
//! The sort is Kahn's algorithm with the ready set kept ordered by
//! discovery position, so unconstrained units keep their discovery order.
//! When the sort gets stuck the remaining nodes contain a cycle, and the
//! shortest cycle through one of them is reported.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::candidate::{CandidateRegistry, ConfigurationUnit};
use crate::error::OrderingError;

/// Unit identifiers in an order consistent with every surviving constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedPlan {
    order: Vec<String>,
}

impl OrderedPlan {
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|x| x == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Directed precedence graph over a candidate subset.
///
/// Adjacency is kept in both directions as ordered sets of discovery
/// positions, which makes every traversal deterministic.
#[derive(Debug, Clone)]
pub struct OrderingGraph<'a> {
    ids: Vec<&'a str>,
    /// `node → {successor, ...}`
    downstream: Vec<BTreeSet<usize>>,
    /// `node → {predecessor, ...}`
    upstream: Vec<BTreeSet<usize>>,
    dropped_hints: usize,
}

impl<'a> OrderingGraph<'a> {
    /// Build the graph for `units`, whose slice order is the discovery order.
    pub fn build(units: &[&'a ConfigurationUnit]) -> Self {
        let ids: Vec<&'a str> = units.iter().map(|u| u.id.as_str()).collect();
        let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut graph = Self {
            downstream: vec![BTreeSet::new(); ids.len()],
            upstream: vec![BTreeSet::new(); ids.len()],
            ids,
            dropped_hints: 0,
        };

        for (pos, unit) in units.iter().enumerate() {
            for later in &unit.before {
                match index.get(later.as_str()) {
                    Some(&succ) => graph.add_edge(pos, succ),
                    None => graph.drop_hint(&unit.id, "before", later),
                }
            }
            for earlier in &unit.after {
                match index.get(earlier.as_str()) {
                    Some(&pred) => graph.add_edge(pred, pos),
                    None => graph.drop_hint(&unit.id, "after", earlier),
                }
            }
        }
        graph
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        self.downstream[from].insert(to);
        self.upstream[to].insert(from);
    }

    fn drop_hint(&mut self, unit_id: &str, relation: &str, target: &str) {
        self.dropped_hints += 1;
        tracing::debug!(
            unit_id = %unit_id,
            relation = relation,
            target = %target,
            "ordering hint references a unit outside the candidate set; ignored"
        );
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.downstream.iter().map(BTreeSet::len).sum()
    }

    /// Number of before/after references that named no node of this graph.
    pub fn dropped_hints(&self) -> usize {
        self.dropped_hints
    }

    /// Direct predecessors of `id`.
    pub fn predecessors_of(&self, id: &str) -> Vec<&'a str> {
        self.position(id)
            .map(|p| self.upstream[p].iter().map(|&i| self.ids[i]).collect())
            .unwrap_or_default()
    }

    /// Direct successors of `id`.
    pub fn successors_of(&self, id: &str) -> Vec<&'a str> {
        self.position(id)
            .map(|p| self.downstream[p].iter().map(|&i| self.ids[i]).collect())
            .unwrap_or_default()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|&x| x == id)
    }

    /// Stable topological sort.
    pub fn sort(&self) -> Result<OrderedPlan, OrderingError> {
        let mut in_degree: Vec<usize> = self.upstream.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut sorted = Vec::with_capacity(self.ids.len());
        while let Some(next) = ready.pop_first() {
            sorted.push(next);
            for &succ in &self.downstream[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.insert(succ);
                }
            }
        }

        if sorted.len() != self.ids.len() {
            let stuck: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
            return Err(self.cycle_error(&stuck));
        }

        Ok(OrderedPlan {
            order: sorted.into_iter().map(|i| self.ids[i].to_string()).collect(),
        })
    }

    /// Walk predecessor edges among stuck nodes until one repeats, then find
    /// the shortest cycle through the repeated node.
    fn cycle_error(&self, stuck: &[bool]) -> OrderingError {
        let Some(start) = stuck.iter().position(|&s| s) else {
            return OrderingError {
                cycle_members: Vec::new(),
            };
        };

        // Every stuck node keeps at least one stuck predecessor, so this walk
        // always revisits a node within `stuck.len()` steps.
        let mut seen = vec![false; stuck.len()];
        let mut current = start;
        while !seen[current] {
            seen[current] = true;
            match self.upstream[current].iter().find(|&&p| stuck[p]) {
                Some(&pred) => current = pred,
                None => break,
            }
        }
        let anchor = current;

        let members = self
            .shortest_cycle_through(anchor, stuck)
            .unwrap_or_else(|| vec![anchor]);
        OrderingError {
            cycle_members: members.into_iter().map(|i| self.ids[i].to_string()).collect(),
        }
    }

    /// BFS over stuck successors from `anchor` back to `anchor`. The result
    /// is rotated to start at its earliest-discovered member.
    fn shortest_cycle_through(&self, anchor: usize, stuck: &[bool]) -> Option<Vec<usize>> {
        let mut parent: Vec<Option<usize>> = vec![None; stuck.len()];
        let mut queue = VecDeque::from([anchor]);
        let mut closing = None;

        'search: while let Some(node) = queue.pop_front() {
            for &succ in &self.downstream[node] {
                if !stuck[succ] {
                    continue;
                }
                if succ == anchor {
                    closing = Some(node);
                    break 'search;
                }
                if parent[succ].is_none() {
                    parent[succ] = Some(node);
                    queue.push_back(succ);
                }
            }
        }

        let mut cycle = vec![closing?];
        while let Some(&last) = cycle.last() {
            if last == anchor {
                break;
            }
            cycle.push(parent[last]?);
        }
        cycle.reverse();

        let min_pos = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, &node)| node)
            .map(|(i, _)| i)
            .unwrap_or(0);
        cycle.rotate_left(min_pos);
        Some(cycle)
    }
}

/// Computes [`OrderedPlan`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderingResolver;

impl OrderingResolver {
    /// Order `units` (given in discovery order).
    pub fn resolve(units: &[&ConfigurationUnit]) -> Result<OrderedPlan, OrderingError> {
        let graph = OrderingGraph::build(units);
        let plan = graph.sort()?;
        tracing::debug!(
            units = graph.node_count(),
            edges = graph.edge_count(),
            dropped_hints = graph.dropped_hints(),
            "ordering resolved"
        );
        Ok(plan)
    }

    /// Order every unit of `registry`, with no pruning.
    pub fn resolve_all(registry: &CandidateRegistry) -> Result<OrderedPlan, OrderingError> {
        let units: Vec<&ConfigurationUnit> = registry.iter().collect();
        Self::resolve(&units)
    }
}
