// no_std support
#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
use std::collections::HashMap;

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};
#[cfg(not(feature = "std"))]
use hashbrown::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::tensor::{mean, percentile, population_std, Matrix, ShapeError};

/// One node of the thresholded connectivity graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GraphNode {
    pub id: u32,
    pub degree: u32,
    pub in_degree: u32,
    pub out_degree: u32,
    pub is_hub: bool,
}

/// One directed edge. Self-loops are ordinary edges here.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GraphEdge {
    pub source: u32,
    pub target: u32,
    pub weight: f32,
}

/// Aggregate graph metrics.
///
/// Under top-k filtering, `num_nodes`/`num_edges` describe the retained
/// subgraph while the degree statistics and `degree_distribution` stay on the
/// full unfiltered graph, as does the hub classification.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TopologyMetrics {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub avg_degree: f32,
    pub max_degree: u32,
    pub min_degree: u32,
    pub std_degree: f32,
    pub modularity: f32,
    pub num_communities: usize,
    pub hub_threshold: f32,
    pub num_hubs: usize,
    pub hubs: Vec<u32>,
    pub degree_distribution: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GraphTopology {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metrics: TopologyMetrics,
}

/// Disjoint node sets plus the modularity of that split.
///
/// Degenerate on edge-free graphs: no communities, modularity 0.0.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CommunityPartition {
    pub communities: Vec<Vec<u32>>,
    pub modularity: f32,
}

/// Threshold a square connectivity matrix into a directed graph with degree,
/// hub, and community statistics.
///
/// An edge (i, j) exists iff `|matrix[i][j]| > threshold`; self-loops pass the
/// same test. Hubs are nodes whose total degree reaches the 90th percentile of
/// the degree distribution. With `top_k_nodes = Some(k)`, `k < N`, only the
/// top-k nodes by total degree are retained (stable descending sort, so the
/// lower id wins ties) and only edges between retained nodes survive.
///
/// Degenerate inputs (zero nodes, zero surviving edges) produce zero-valued
/// metrics; the only error is a non-square matrix.
pub fn extract_topology(
    matrix: &Matrix,
    threshold: f32,
    top_k_nodes: Option<usize>,
) -> Result<GraphTopology, ShapeError> {
    if !matrix.is_square() {
        return Err(ShapeError::NotSquare {
            rows: matrix.rows(),
            cols: matrix.cols(),
        });
    }
    let n = matrix.rows();

    let mut edges: Vec<GraphEdge> = Vec::new();
    let mut in_degree = vec![0u32; n];
    let mut out_degree = vec![0u32; n];
    for i in 0..n {
        for j in 0..n {
            let weight = matrix.get(i, j);
            if weight.abs() > threshold {
                edges.push(GraphEdge {
                    source: i as u32,
                    target: j as u32,
                    weight,
                });
                out_degree[i] += 1;
                in_degree[j] += 1;
            }
        }
    }

    let degree: Vec<u32> = (0..n).map(|i| in_degree[i] + out_degree[i]).collect();

    // Hub classification runs on the full distribution, before any filtering.
    let (hub_threshold, hubs) = if n > 0 {
        let degrees_f: Vec<f32> = degree.iter().map(|&d| d as f32).collect();
        let thr = percentile(&degrees_f, 90.0);
        let hubs: Vec<u32> = (0..n)
            .filter(|&i| degree[i] as f32 >= thr)
            .map(|i| i as u32)
            .collect();
        (thr, hubs)
    } else {
        (0.0, Vec::new())
    };

    let retained: Vec<u32> = match top_k_nodes {
        Some(k) if k < n => {
            let mut by_degree: Vec<u32> = (0..n as u32).collect();
            // Stable sort: equal degrees keep ascending id order.
            by_degree.sort_by(|&a, &b| degree[b as usize].cmp(&degree[a as usize]));
            let mut kept: Vec<u32> = by_degree.into_iter().take(k).collect();
            kept.sort_unstable();
            kept
        }
        _ => (0..n as u32).collect(),
    };

    if retained.len() < n {
        let mut keep = vec![false; n];
        for &id in &retained {
            keep[id as usize] = true;
        }
        edges.retain(|e| keep[e.source as usize] && keep[e.target as usize]);
    }

    let nodes: Vec<GraphNode> = retained
        .iter()
        .map(|&id| {
            let i = id as usize;
            GraphNode {
                id,
                degree: degree[i],
                in_degree: in_degree[i],
                out_degree: out_degree[i],
                is_hub: n > 0 && degree[i] as f32 >= hub_threshold,
            }
        })
        .collect();

    let partition = detect_communities(&retained, &edges);

    let degrees_f: Vec<f32> = degree.iter().map(|&d| d as f32).collect();
    let metrics = TopologyMetrics {
        num_nodes: nodes.len(),
        num_edges: edges.len(),
        avg_degree: mean(&degrees_f),
        max_degree: degree.iter().copied().max().unwrap_or(0),
        min_degree: degree.iter().copied().min().unwrap_or(0),
        std_degree: population_std(&degrees_f),
        modularity: partition.modularity,
        num_communities: partition.communities.len(),
        hub_threshold,
        num_hubs: hubs.len(),
        hubs,
        degree_distribution: degree,
    };

    Ok(GraphTopology {
        nodes,
        edges,
        metrics,
    })
}

/// Greedy modularity-maximization over the undirected projection of `edges`.
///
/// The projection is simple: self-loops are dropped and antiparallel edge
/// pairs collapse to a single undirected edge, unweighted. Starting from
/// singleton communities, the connected pair with the largest positive
/// modularity gain is merged until no merge improves modularity. Ties pick
/// the smallest community-id pair, so the result is deterministic for a
/// fixed graph.
///
/// An edge-free graph degrades to zero communities and modularity 0.0.
pub fn detect_communities(node_ids: &[u32], edges: &[GraphEdge]) -> CommunityPartition {
    // Undirected simple projection.
    let mut und: Vec<(u32, u32)> = edges
        .iter()
        .filter(|e| e.source != e.target)
        .map(|e| {
            if e.source <= e.target {
                (e.source, e.target)
            } else {
                (e.target, e.source)
            }
        })
        .collect();
    und.sort_unstable();
    und.dedup();

    let m = und.len();
    if m == 0 {
        return CommunityPartition {
            communities: Vec::new(),
            modularity: 0.0,
        };
    }

    // Singleton communities, keyed by node id.
    struct Community {
        members: Vec<u32>,
        internal: u32,
        degree_sum: u32,
    }
    let mut comms: HashMap<u32, Community> = HashMap::with_capacity(node_ids.len());
    for &id in node_ids {
        comms.insert(
            id,
            Community {
                members: vec![id],
                internal: 0,
                degree_sum: 0,
            },
        );
    }
    // Edge counts between community pairs, keyed (low, high).
    let mut between: HashMap<(u32, u32), u32> = HashMap::with_capacity(m);
    for &(a, b) in &und {
        *between.entry((a, b)).or_insert(0) += 1;
        if let Some(c) = comms.get_mut(&a) {
            c.degree_sum += 1;
        }
        if let Some(c) = comms.get_mut(&b) {
            c.degree_sum += 1;
        }
    }

    let m_f = m as f64;
    loop {
        // Best positive-gain merge among connected pairs; ties pick the
        // smallest (low, high) pair for determinism.
        let mut best: Option<((u32, u32), f64)> = None;
        for (&(a, b), &cnt) in between.iter() {
            let (Some(ca), Some(cb)) = (comms.get(&a), comms.get(&b)) else {
                continue;
            };
            let da = ca.degree_sum as f64;
            let db = cb.degree_sum as f64;
            let gain = cnt as f64 / m_f - da * db / (2.0 * m_f * m_f);
            let candidate = ((a, b), gain);
            best = match best {
                None => Some(candidate),
                Some((pair, g)) => {
                    if gain > g || (gain == g && (a, b) < pair) {
                        Some(candidate)
                    } else {
                        Some((pair, g))
                    }
                }
            };
        }
        let Some(((a, b), gain)) = best else { break };
        if gain <= 0.0 {
            break;
        }

        // Merge b into a (a < b by key construction).
        let Some(absorbed) = comms.remove(&b) else { break };
        let link = between.remove(&(a, b)).unwrap_or(0);
        if let Some(host) = comms.get_mut(&a) {
            host.members.extend_from_slice(&absorbed.members);
            host.internal += absorbed.internal + link;
            host.degree_sum += absorbed.degree_sum;
        }
        // Retarget b's remaining inter-community counts onto a.
        let stale: Vec<((u32, u32), u32)> = between
            .iter()
            .filter(|((x, y), _)| *x == b || *y == b)
            .map(|(&k, &v)| (k, v))
            .collect();
        for ((x, y), cnt) in stale {
            between.remove(&(x, y));
            let other = if x == b { y } else { x };
            let key = if other <= a { (other, a) } else { (a, other) };
            *between.entry(key).or_insert(0) += cnt;
        }
    }

    // Q = sum over communities of (internal/m - (degree_sum/(2m))^2).
    let mut q = 0.0f64;
    for c in comms.values() {
        let frac = c.degree_sum as f64 / (2.0 * m_f);
        q += c.internal as f64 / m_f - frac * frac;
    }

    let mut communities: Vec<Vec<u32>> = comms
        .into_values()
        .map(|mut c| {
            c.members.sort_unstable();
            c.members
        })
        .collect();
    communities.sort_by_key(|c| c.first().copied().unwrap_or(u32::MAX));

    CommunityPartition {
        communities,
        modularity: q as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Prng;

    #[test]
    fn zero_threshold_keeps_every_ordered_pair() {
        // No exact-zero entries, threshold 0: every (i, j) pair survives,
        // self-loops included.
        let m = Matrix::from_fn(4, 4, |i, j| 0.5 + (i * 4 + j) as f32);
        let topo = extract_topology(&m, 0.0, None).unwrap();
        assert_eq!(topo.metrics.num_edges, 16);
        assert_eq!(topo.metrics.num_nodes, 4);
        assert!(topo.edges.iter().any(|e| e.source == e.target));
    }

    #[test]
    fn negative_weights_pass_by_magnitude() {
        let mut m = Matrix::zeros(3, 3);
        m.set(0, 1, -0.9);
        m.set(1, 2, 0.05);
        let topo = extract_topology(&m, 0.1, None).unwrap();
        assert_eq!(topo.metrics.num_edges, 1);
        assert_eq!(topo.edges[0].weight, -0.9);
    }

    #[test]
    fn non_square_matrix_is_rejected() {
        let m = Matrix::zeros(3, 4);
        let err = extract_topology(&m, 0.1, None).unwrap_err();
        assert_eq!(err, ShapeError::NotSquare { rows: 3, cols: 4 });
    }

    #[test]
    fn empty_matrix_yields_zero_metrics() {
        let m = Matrix::zeros(0, 0);
        let topo = extract_topology(&m, 0.1, None).unwrap();
        assert_eq!(topo.metrics.num_nodes, 0);
        assert_eq!(topo.metrics.num_edges, 0);
        assert_eq!(topo.metrics.avg_degree, 0.0);
        assert_eq!(topo.metrics.modularity, 0.0);
        assert_eq!(topo.metrics.num_communities, 0);
        assert!(topo.metrics.hubs.is_empty());
    }

    #[test]
    fn edge_free_graph_skips_community_detection() {
        let m = Matrix::zeros(5, 5);
        let topo = extract_topology(&m, 0.1, None).unwrap();
        assert_eq!(topo.metrics.num_edges, 0);
        assert_eq!(topo.metrics.modularity, 0.0);
        assert_eq!(topo.metrics.num_communities, 0);
    }

    #[test]
    fn top_k_returns_exactly_k_nodes_with_internal_edges() {
        let mut r = Prng::new(11);
        let m = Matrix::from_fn(20, 20, |_, _| r.gen_range_f32(-1.0, 1.0));
        let topo = extract_topology(&m, 0.4, Some(6)).unwrap();
        assert_eq!(topo.nodes.len(), 6);
        assert_eq!(topo.metrics.num_nodes, 6);
        let kept: Vec<u32> = topo.nodes.iter().map(|n| n.id).collect();
        for e in &topo.edges {
            assert!(kept.contains(&e.source));
            assert!(kept.contains(&e.target));
        }
    }

    #[test]
    fn top_k_keeps_full_graph_degree_stats() {
        let mut r = Prng::new(5);
        let m = Matrix::from_fn(12, 12, |_, _| r.gen_range_f32(-1.0, 1.0));
        let full = extract_topology(&m, 0.5, None).unwrap();
        let cut = extract_topology(&m, 0.5, Some(4)).unwrap();
        // Degree statistics and distribution come from the unfiltered graph.
        assert_eq!(cut.metrics.avg_degree, full.metrics.avg_degree);
        assert_eq!(cut.metrics.degree_distribution, full.metrics.degree_distribution);
        // Retained nodes carry their original degrees.
        for node in &cut.nodes {
            assert_eq!(node.degree, full.metrics.degree_distribution[node.id as usize]);
        }
    }

    #[test]
    fn hub_count_is_near_ten_percent_on_uniform_matrix() {
        let n = 100;
        let mut r = Prng::new(1234);
        let m = Matrix::from_fn(n, n, |_, _| r.next_f32_01());
        let topo = extract_topology(&m, 0.5, None).unwrap();
        // 90th-percentile rule: ~10% of nodes, give or take sampling noise
        // and ties on integer degrees.
        assert!(
            topo.metrics.num_hubs >= n / 20 && topo.metrics.num_hubs <= n / 4,
            "unexpected hub count {}",
            topo.metrics.num_hubs
        );
        for node in &topo.nodes {
            let expected = node.degree as f32 >= topo.metrics.hub_threshold;
            assert_eq!(node.is_hub, expected);
        }
    }

    #[test]
    fn two_cliques_form_two_communities() {
        // Two directed triangles, no cross edges.
        let mut m = Matrix::zeros(6, 6);
        for &(a, b) in &[(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3)] {
            m.set(a, b, 1.0);
        }
        let topo = extract_topology(&m, 0.5, None).unwrap();
        assert_eq!(topo.metrics.num_communities, 2);
        // Q for the triangle split is exactly 1/2.
        assert!((topo.metrics.modularity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn antiparallel_edges_collapse_in_projection() {
        let mut m = Matrix::zeros(2, 2);
        m.set(0, 1, 1.0);
        m.set(1, 0, 1.0);
        let topo = extract_topology(&m, 0.5, None).unwrap();
        assert_eq!(topo.metrics.num_edges, 2);
        let part = detect_communities(&[0, 1], &topo.edges);
        // One undirected edge; merging both nodes is the best split.
        assert_eq!(part.communities.len(), 1);
        assert_eq!(part.communities[0], vec![0, 1]);
    }

    #[test]
    fn detection_is_deterministic() {
        let mut r = Prng::new(77);
        let m = Matrix::from_fn(16, 16, |_, _| r.gen_range_f32(-1.0, 1.0));
        let a = extract_topology(&m, 0.6, None).unwrap();
        let b = extract_topology(&m, 0.6, None).unwrap();
        assert_eq!(a.metrics.modularity, b.metrics.modularity);
        assert_eq!(a.metrics.num_communities, b.metrics.num_communities);
    }
}
