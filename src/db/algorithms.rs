//! Graph algorithms executed over a [`super::projection::ProjectedGraph`].
//!
//! Traversal, PageRank and connectivity come from `petgraph`; Louvain and
//! k-core are computed here over the same graph. Component and community ids
//! are renumbered by first appearance in node order, which keeps output
//! deterministic for a given projection.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

use petgraph::algo::{astar, dijkstra, kosaraju_scc, page_rank};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{EdgeRef, IntoEdges, Reversed, Visitable};
use petgraph::Undirected;

use super::projection::Direction;

#[derive(Debug, Clone, Copy)]
pub struct PageRankConfig {
    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 20,
            tolerance: 1e-7,
        }
    }
}

/// PageRank indexed by node. `on_iteration(iteration, delta)` is called after
/// each sweep with the L1 change against the previous one.
///
/// `page_rank` cannot resume from earlier ranks, so sweep `i` re-runs from the
/// uniform start for `i` iterations.
pub fn pagerank<N, E>(
    graph: &DiGraph<N, E>,
    config: PageRankConfig,
    mut on_iteration: impl FnMut(usize, f64),
) -> Vec<f64> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }
    let mut ranks = vec![1.0 / n as f64; n];
    for iteration in 1..=config.max_iterations {
        let next = page_rank(graph, config.damping, iteration);
        let delta: f64 = next.iter().zip(&ranks).map(|(a, b)| (a - b).abs()).sum();
        ranks = next;
        on_iteration(iteration, delta);
        if delta < config.tolerance {
            break;
        }
    }
    ranks
}

/// Component id per node, ignoring edge direction.
pub fn weakly_connected_components<N, E>(graph: &DiGraph<N, E>) -> Vec<usize> {
    let mut sets = UnionFind::<usize>::new(graph.node_count());
    for edge in graph.edge_references() {
        sets.union(edge.source().index(), edge.target().index());
    }
    renumber(&sets.into_labeling()).0
}

/// Component id per node where every pair in a component reaches each other
/// along directed edges.
pub fn strongly_connected_components<N, E>(graph: &DiGraph<N, E>) -> Vec<usize> {
    let mut labels = vec![0; graph.node_count()];
    for (component, members) in kosaraju_scc(graph).into_iter().enumerate() {
        for node in members {
            labels[node.index()] = component;
        }
    }
    renumber(&labels).0
}

/// Neighbor sets of the undirected simple graph underneath `graph`.
fn simple_neighbors<N, E>(graph: &DiGraph<N, E>) -> Vec<BTreeSet<usize>> {
    graph
        .node_indices()
        .map(|v| {
            graph
                .neighbors_undirected(v)
                .filter(|w| *w != v)
                .map(NodeIndex::index)
                .collect()
        })
        .collect()
}

/// Core number per node, ignoring direction and parallel edges (peeling).
pub fn k_core<N, E>(graph: &DiGraph<N, E>) -> Vec<usize> {
    let neighbors = simple_neighbors(graph);
    let n = neighbors.len();
    let mut degree: Vec<usize> = neighbors.iter().map(BTreeSet::len).collect();
    let mut removed = vec![false; n];
    let mut core = vec![0; n];
    let mut k = 0;

    for _ in 0..n {
        let Some(v) = (0..n).filter(|&i| !removed[i]).min_by_key(|&i| (degree[i], i)) else {
            break;
        };
        k = k.max(degree[v]);
        core[v] = k;
        removed[v] = true;
        for &w in &neighbors[v] {
            if !removed[w] {
                degree[w] = degree[w].saturating_sub(1);
            }
        }
    }
    core
}

#[derive(Debug, Clone)]
pub struct LouvainResult {
    /// Community id per node.
    pub communities: Vec<usize>,
    pub modularity: f64,
    pub levels: usize,
}

type Weighted = Vec<BTreeMap<usize, f64>>;

/// Louvain community detection on the undirected view of `graph`, one unit of
/// weight per directed edge. `on_level(level, communities, modularity)` is
/// called after each aggregation.
pub fn louvain<N, E>(
    graph: &DiGraph<N, E>,
    max_levels: usize,
    mut on_level: impl FnMut(usize, usize, f64),
) -> LouvainResult {
    let node_count = graph.node_count();
    let mut adj: Weighted = vec![BTreeMap::new(); node_count];
    for edge in graph.edge_references() {
        let (u, v) = (edge.source().index(), edge.target().index());
        if u == v {
            continue;
        }
        *adj[u].entry(v).or_insert(0.0) += 1.0;
        *adj[v].entry(u).or_insert(0.0) += 1.0;
    }
    let original = adj.clone();
    let mut membership: Vec<usize> = (0..node_count).collect();
    let mut current = adj;
    let mut levels = 0;

    while levels < max_levels {
        let (assignment, moved) = local_moving(&current);
        if !moved {
            break;
        }
        let (renumbered, count) = renumber(&assignment);
        for m in membership.iter_mut() {
            *m = renumbered[*m];
        }
        current = aggregate(&current, &renumbered, count);
        levels += 1;
        on_level(levels, count, modularity(&original, &membership));
    }

    let (communities, _) = renumber(&membership);
    LouvainResult {
        modularity: modularity(&original, &communities),
        communities,
        levels,
    }
}

fn local_moving(adj: &Weighted) -> (Vec<usize>, bool) {
    let n = adj.len();
    let degree: Vec<f64> = adj.iter().map(|a| a.values().sum()).collect();
    let m2: f64 = degree.iter().sum();
    let mut community: Vec<usize> = (0..n).collect();
    if m2 == 0.0 {
        return (community, false);
    }
    let mut total = degree.clone();
    let mut moved_any = false;

    loop {
        let mut moved = false;
        for i in 0..n {
            let current = community[i];
            let ki = degree[i];
            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for (&j, &w) in &adj[i] {
                if j != i {
                    *links.entry(community[j]).or_insert(0.0) += w;
                }
            }

            total[current] -= ki;
            let mut best = current;
            let mut best_gain =
                links.get(&current).copied().unwrap_or(0.0) - total[current] * ki / m2;
            for (&c, &w) in &links {
                let gain = w - total[c] * ki / m2;
                if gain > best_gain + 1e-12 {
                    best = c;
                    best_gain = gain;
                }
            }
            total[best] += ki;

            if best != current {
                community[i] = best;
                moved = true;
                moved_any = true;
            }
        }
        if !moved {
            break;
        }
    }
    (community, moved_any)
}

fn aggregate(adj: &Weighted, assignment: &[usize], count: usize) -> Weighted {
    let mut next: Weighted = vec![BTreeMap::new(); count];
    for (i, neighbors) in adj.iter().enumerate() {
        for (&j, &w) in neighbors {
            *next[assignment[i]].entry(assignment[j]).or_insert(0.0) += w;
        }
    }
    next
}

/// Newman modularity of `communities` over the weighted adjacency.
fn modularity(adj: &Weighted, communities: &[usize]) -> f64 {
    let degree: Vec<f64> = adj.iter().map(|a| a.values().sum()).collect();
    let m2: f64 = degree.iter().sum();
    if m2 == 0.0 {
        return 0.0;
    }
    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut total: HashMap<usize, f64> = HashMap::new();
    for (i, neighbors) in adj.iter().enumerate() {
        *total.entry(communities[i]).or_insert(0.0) += degree[i];
        for (&j, &w) in neighbors {
            if communities[i] == communities[j] {
                *internal.entry(communities[i]).or_insert(0.0) += w;
            }
        }
    }
    total
        .iter()
        .map(|(c, tot)| internal.get(c).copied().unwrap_or(0.0) / m2 - (tot / m2).powi(2))
        .sum()
}

/// Relabel ids by first appearance. Returns the labels and their count.
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping = HashMap::new();
    let out = labels
        .iter()
        .map(|l| {
            let next = mapping.len();
            *mapping.entry(*l).or_insert(next)
        })
        .collect();
    (out, mapping.len())
}

fn hop_path<G>(graph: G, start: G::NodeId, end: G::NodeId) -> Option<Vec<G::NodeId>>
where
    G: IntoEdges + Visitable,
    G::NodeId: Eq + Hash,
{
    astar(graph, start, |n| n == end, |_| 1usize, |_| 0).map(|(_, path)| path)
}

fn hop_distances<G>(graph: G, start: G::NodeId) -> HashMap<G::NodeId, usize>
where
    G: IntoEdges + Visitable,
    G::NodeId: Eq + Hash,
{
    dijkstra(graph, start, None, |_| 1usize).into_iter().collect()
}

/// Fewest-hop path from `start` to `end`, inclusive of both.
pub fn shortest_path<N: Clone, E: Clone>(
    graph: &DiGraph<N, E>,
    start: NodeIndex,
    end: NodeIndex,
    direction: Direction,
) -> Option<Vec<NodeIndex>> {
    match direction {
        Direction::Outgoing => hop_path(graph, start, end),
        Direction::Incoming => hop_path(Reversed(graph), start, end),
        Direction::Both => {
            let undirected = graph.clone().into_edge_type::<Undirected>();
            hop_path(&undirected, start, end)
        }
    }
}

/// Nodes reachable from `start` within `max_depth` hops as `(node, distance)`,
/// ordered by distance then index. `start` itself is excluded.
pub fn within_hops<N: Clone, E: Clone>(
    graph: &DiGraph<N, E>,
    start: NodeIndex,
    max_depth: usize,
    direction: Direction,
) -> Vec<(NodeIndex, usize)> {
    let distances = match direction {
        Direction::Outgoing => hop_distances(graph, start),
        Direction::Incoming => hop_distances(Reversed(graph), start),
        Direction::Both => {
            let undirected = graph.clone().into_edge_type::<Undirected>();
            hop_distances(&undirected, start)
        }
    };
    let mut out: Vec<(NodeIndex, usize)> = distances
        .into_iter()
        .filter(|&(_, d)| d >= 1 && d <= max_depth)
        .collect();
    out.sort_by_key(|&(node, d)| (d, node.index()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(u32, u32)]) -> DiGraph<(), ()> {
        DiGraph::from_edges(edges)
    }

    fn two_triangles() -> DiGraph<(), ()> {
        graph(&[(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (2, 3)])
    }

    fn indices(path: &[NodeIndex]) -> Vec<usize> {
        path.iter().map(|n| n.index()).collect()
    }

    #[test]
    fn pagerank_on_cycle_is_uniform() {
        let g = graph(&[(0, 1), (1, 2), (2, 0)]);
        let mut iterations = 0;
        let ranks = pagerank(&g, PageRankConfig::default(), |i, _| iterations = i);
        assert!(iterations >= 1);
        for r in &ranks {
            assert!((r - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn pagerank_favors_sink_of_star() {
        let g = graph(&[(1, 0), (2, 0), (3, 0)]);
        let ranks = pagerank(&g, PageRankConfig::default(), |_, _| {});
        let total: f64 = ranks.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(ranks[0] > ranks[1]);
        assert!((ranks[1] - ranks[2]).abs() < 1e-9);
    }

    #[test]
    fn pagerank_of_empty_graph_is_empty() {
        let mut called = false;
        let ranks = pagerank(&graph(&[]), PageRankConfig::default(), |_, _| called = true);
        assert!(ranks.is_empty());
        assert!(!called);
    }

    #[test]
    fn wcc_splits_disconnected_parts() {
        let g = graph(&[(0, 1), (3, 4)]);
        assert_eq!(weakly_connected_components(&g), vec![0, 0, 1, 2, 2]);
    }

    #[test]
    fn scc_finds_cycle() {
        let g = graph(&[(0, 1), (1, 2), (2, 0), (2, 3)]);
        let scc = strongly_connected_components(&g);
        assert_eq!(scc[0], 0);
        assert_eq!(scc[0], scc[1]);
        assert_eq!(scc[1], scc[2]);
        assert_ne!(scc[2], scc[3]);
    }

    #[test]
    fn k_core_of_triangle_with_tail() {
        let g = graph(&[(0, 1), (1, 2), (2, 0), (2, 3), (3, 2)]);
        assert_eq!(k_core(&g), vec![2, 2, 2, 1]);
    }

    #[test]
    fn louvain_separates_two_triangles() {
        let mut levels_seen = 0;
        let result = louvain(&two_triangles(), 10, |level, _, _| levels_seen = level);
        assert_eq!(result.communities[0], result.communities[1]);
        assert_eq!(result.communities[1], result.communities[2]);
        assert_eq!(result.communities[3], result.communities[4]);
        assert_eq!(result.communities[4], result.communities[5]);
        assert_ne!(result.communities[0], result.communities[3]);
        assert!((result.modularity - 0.357).abs() < 0.01);
        assert_eq!(levels_seen, result.levels);
    }

    #[test]
    fn louvain_without_edges_keeps_singletons() {
        let mut g = DiGraph::<(), ()>::new();
        for _ in 0..3 {
            g.add_node(());
        }
        let result = louvain(&g, 10, |_, _, _| {});
        assert_eq!(result.communities, vec![0, 1, 2]);
        assert_eq!(result.modularity, 0.0);
        assert_eq!(result.levels, 0);
    }

    #[test]
    fn shortest_path_follows_direction() {
        let g = graph(&[(0, 1), (1, 2), (0, 3), (3, 2)]);
        let (a, c) = (NodeIndex::new(0), NodeIndex::new(2));

        let forward = shortest_path(&g, a, c, Direction::Outgoing).unwrap();
        assert_eq!(forward.len(), 3);
        assert_eq!(forward.first(), Some(&a));
        assert!(shortest_path(&g, c, a, Direction::Outgoing).is_none());

        let back = shortest_path(&g, c, a, Direction::Incoming).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(shortest_path(&g, c, a, Direction::Both).map(|p| p.len()), Some(3));
    }

    #[test]
    fn both_directions_cross_opposing_edges() {
        let g = graph(&[(0, 1), (2, 1)]);
        let path = shortest_path(&g, NodeIndex::new(0), NodeIndex::new(2), Direction::Both).unwrap();
        assert_eq!(indices(&path), vec![0, 1, 2]);
        assert!(shortest_path(&g, NodeIndex::new(0), NodeIndex::new(2), Direction::Outgoing).is_none());
    }

    #[test]
    fn within_hops_respects_depth_and_direction() {
        let g = graph(&[(0, 1), (1, 2), (2, 3)]);
        let hops = within_hops(&g, NodeIndex::new(0), 2, Direction::Outgoing);
        assert_eq!(
            hops,
            vec![(NodeIndex::new(1), 1), (NodeIndex::new(2), 2)]
        );
        assert!(within_hops(&g, NodeIndex::new(0), 2, Direction::Incoming).is_empty());
        assert_eq!(within_hops(&g, NodeIndex::new(3), 3, Direction::Incoming).len(), 3);
    }
}
