//! SimilarityBuilder: pairwise cosine similarity over post/media embedding
//! vectors, reduced to a per-item top-K neighbor map (spec §4.7).

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SimilarityConfig;
use crate::issues::IssueCollector;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Neighbor {
    pub hash: String,
    pub score: f32,
}

/// `hashA-hashB` (hashA < hashB lexicographically) keyed symmetric score
/// table, matching the `posts-similarity.json` artifact shape.
pub type PairScores = HashMap<String, f32>;

/// Per-item top-K neighbor lists, matching the `posts-similar-hash.json`
/// artifact shape.
pub type NeighborMap = HashMap<String, Vec<Neighbor>>;

fn pair_key(a: &str, b: &str) -> String {
    if a < b {
        format!("{a}-{b}")
    } else {
        format!("{b}-{a}")
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Computes pairwise cosine similarity across every unordered pair of the
/// given embedding map, then reduces to the top-`k` neighbors per item.
/// Returns empty maps (with a warning recorded) when fewer than two items
/// carry an embedding, since no pair exists to compare.
pub fn build_similarity(
    embeddings: &HashMap<String, Vec<f32>>,
    config: &SimilarityConfig,
    stage: &str,
    issues: &IssueCollector,
) -> (PairScores, NeighborMap) {
    let mut hashes: Vec<&String> = embeddings.keys().collect();
    hashes.sort();

    if hashes.len() < 2 {
        issues.warn(
            stage.to_string(),
            String::new(),
            "fewer than two embedded items, skipping similarity computation".to_string(),
        );
        return (PairScores::new(), NeighborMap::new());
    }

    let pairs: Vec<(usize, usize)> = (0..hashes.len())
        .flat_map(|i| ((i + 1)..hashes.len()).map(move |j| (i, j)))
        .collect();

    let scored: Vec<(String, String, f32)> = pairs
        .par_iter()
        .map(|&(i, j)| {
            let hash_a = hashes[i];
            let hash_b = hashes[j];
            let score = cosine_similarity(&embeddings[hash_a], &embeddings[hash_b]);
            (hash_a.clone(), hash_b.clone(), score)
        })
        .collect();

    let mut pair_scores = PairScores::new();
    let mut adjacency: HashMap<String, Vec<Neighbor>> = HashMap::new();

    for (hash_a, hash_b, score) in scored {
        pair_scores.insert(pair_key(&hash_a, &hash_b), score);
        adjacency
            .entry(hash_a.clone())
            .or_default()
            .push(Neighbor { hash: hash_b.clone(), score });
        adjacency
            .entry(hash_b.clone())
            .or_default()
            .push(Neighbor { hash: hash_a, score });
    }

    let mut neighbor_map = NeighborMap::new();
    for hash in hashes {
        let mut neighbors = adjacency.remove(hash).unwrap_or_default();
        neighbors.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.hash.cmp(&b.hash))
        });
        neighbors.truncate(config.k);
        neighbor_map.insert(hash.clone(), neighbors);
    }

    (pair_scores, neighbor_map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issues() -> IssueCollector {
        IssueCollector::new()
    }

    #[test]
    fn fewer_than_two_embeddings_yields_empty_output_with_warning() {
        let mut embeddings = HashMap::new();
        embeddings.insert("a".to_string(), vec![1.0, 0.0]);
        let collector = issues();
        let (pairs, neighbors) = build_similarity(&embeddings, &SimilarityConfig::default(), "similarity", &collector);
        assert!(pairs.is_empty());
        assert!(neighbors.is_empty());
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn identical_vectors_score_one() {
        let mut embeddings = HashMap::new();
        embeddings.insert("a".to_string(), vec![1.0, 0.0]);
        embeddings.insert("b".to_string(), vec![1.0, 0.0]);
        let (pairs, _) = build_similarity(&embeddings, &SimilarityConfig::default(), "similarity", &issues());
        assert!((pairs["a-b"] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pair_key_is_symmetric_regardless_of_argument_order() {
        assert_eq!(pair_key("b", "a"), pair_key("a", "b"));
    }

    #[test]
    fn neighbor_map_truncates_to_k_and_breaks_ties_by_hash() {
        let mut embeddings = HashMap::new();
        embeddings.insert("a".to_string(), vec![1.0, 0.0]);
        embeddings.insert("b".to_string(), vec![1.0, 0.0]);
        embeddings.insert("c".to_string(), vec![1.0, 0.0]);
        embeddings.insert("d".to_string(), vec![0.0, 1.0]);
        let config = SimilarityConfig { k: 2 };
        let (_, neighbors) = build_similarity(&embeddings, &config, "similarity", &issues());
        let a_neighbors = &neighbors["a"];
        assert_eq!(a_neighbors.len(), 2);
        assert_eq!(a_neighbors[0].hash, "b");
        assert_eq!(a_neighbors[1].hash, "c");
    }
}
