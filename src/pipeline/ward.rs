use std::collections::HashMap;

use tracing::warn;

/// A single merge step in the dendrogram.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Merge {
    pub a: usize,
    pub b: usize,
    /// Euclidean merge distance (the recurrence works in squared space).
    pub distance: f64,
    pub size: usize,
}

/// Condensed squared-Euclidean distance matrix: n*(n-1)/2 entries in
/// row-major upper-triangle order.
pub(crate) fn pairwise_distances(embeddings: &[Vec<f64>]) -> Vec<f64> {
    let n = embeddings.len();
    let mut dist = Vec::with_capacity(n * (n - 1) / 2);

    for i in 0..n {
        for j in (i + 1)..n {
            let d: f64 = embeddings[i]
                .iter()
                .zip(&embeddings[j])
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            dist.push(d);
        }
    }
    dist
}

fn condensed_index(n: usize, i: usize, j: usize) -> usize {
    let (i, j) = if i > j { (j, i) } else { (i, j) };
    n * i - i * (i + 1) / 2 + j - i - 1
}

/// Distance storage: the condensed matrix for original-point pairs plus a
/// sparse map for pairs involving merged clusters.
struct DistanceMatrix {
    n: usize,
    condensed: Vec<f64>,
    extended: HashMap<(usize, usize), f64>,
}

impl DistanceMatrix {
    fn new(n: usize, condensed: Vec<f64>) -> Self {
        Self {
            n,
            condensed,
            extended: HashMap::new(),
        }
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        let (i, j) = if i > j { (j, i) } else { (i, j) };
        if i < self.n && j < self.n {
            self.condensed[condensed_index(self.n, i, j)]
        } else {
            self.extended.get(&(i, j)).copied().unwrap_or(0.0)
        }
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        let (i, j) = if i > j { (j, i) } else { (i, j) };
        if i < self.n && j < self.n {
            self.condensed[condensed_index(self.n, i, j)] = value;
        } else {
            self.extended.insert((i, j), value);
        }
    }
}

/// Ward's agglomerative linkage over a condensed squared-distance matrix,
/// using the Lance-Williams recurrence. Produces n-1 merges; cluster k from
/// step s gets index n+s. Ties on the minimum pick the lexicographically
/// smallest (i, j).
pub(crate) fn ward_linkage(dist: &[f64], n: usize) -> Vec<Merge> {
    let total = 2 * n - 1;
    let mut active = vec![false; total];
    let mut size = vec![0usize; total];
    for i in 0..n {
        active[i] = true;
        size[i] = 1;
    }

    let mut d = DistanceMatrix::new(n, dist.to_vec());
    let mut merges = Vec::with_capacity(n - 1);
    let mut last_distance = 0.0f64;

    for step in 0..n - 1 {
        let upper = n + step;
        let mut min_dist = f64::MAX;
        let mut min_i = 0;
        let mut min_j = 0;

        for i in 0..upper {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..upper {
                if !active[j] {
                    continue;
                }
                let dij = d.get(i, j);
                if dij < min_dist {
                    min_dist = dij;
                    min_i = i;
                    min_j = j;
                }
            }
        }

        let new_cluster = n + step;
        let new_size = size[min_i] + size[min_j];
        active[min_i] = false;
        active[min_j] = false;
        active[new_cluster] = true;
        size[new_cluster] = new_size;

        // Reported as Euclidean; a decreasing sequence would mean the
        // linkage lost monotonicity.
        let distance = min_dist.sqrt();
        if distance < last_distance - 1e-12 {
            warn!(step, distance, last_distance, "non-monotonic merge distance");
        }
        last_distance = distance;

        merges.push(Merge {
            a: min_i,
            b: min_j,
            distance,
            size: new_size,
        });

        // Lance-Williams update, all in squared space:
        // d(new,k) = ((n_k+n_i)*d(i,k) + (n_k+n_j)*d(j,k) - n_k*d(i,j)) / (n_k+n_i+n_j)
        for k in 0..new_cluster {
            if !active[k] {
                continue;
            }
            let ni = size[min_i] as f64;
            let nj = size[min_j] as f64;
            let nk = size[k] as f64;

            let dik = d.get(min_i, k);
            let djk = d.get(min_j, k);
            let dij = min_dist;

            let new_dist = ((nk + ni) * dik + (nk + nj) * djk - nk * dij) / (nk + ni + nj);
            d.set(new_cluster, k, new_dist);
        }
    }

    merges
}

/// Cuts the dendrogram at a Euclidean threshold and returns dense 0-based
/// cluster labels for the n original points. Merges above the threshold
/// leave their participants separate.
pub(crate) fn cut_dendrogram(merges: &[Merge], n: usize, threshold: f64) -> Vec<usize> {
    let mut labels: Vec<usize> = (0..2 * n - 1).collect();

    for (step, m) in merges.iter().enumerate() {
        let new_cluster = n + step;
        if m.distance <= threshold {
            let label_a = find(&mut labels, m.a);
            labels[new_cluster] = label_a;
            set_label(&mut labels, m.b, label_a);
        } else {
            labels[new_cluster] = new_cluster;
        }
    }

    // Resolve roots for the original points and compact to sequential IDs.
    let mut final_labels = vec![0usize; n];
    let mut label_map = HashMap::new();
    let mut next_id = 0;

    for (i, slot) in final_labels.iter_mut().enumerate() {
        let root = find(&mut labels, i);
        let id = *label_map.entry(root).or_insert_with(|| {
            let id = next_id;
            next_id += 1;
            id
        });
        *slot = id;
    }

    final_labels
}

/// Root label with path compression.
fn find(labels: &mut [usize], mut i: usize) -> usize {
    while labels[i] != i {
        labels[i] = labels[labels[i]];
        i = labels[i];
    }
    i
}

/// Relabels the chain rooted at b.
fn set_label(labels: &mut [usize], mut b: usize, label: usize) {
    while labels[b] != b {
        let next = labels[b];
        labels[b] = label;
        b = next;
    }
    labels[b] = label;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairwise_distances_are_squared_euclidean() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let dist = pairwise_distances(&embeddings);
        // d(0,1) = 2, d(0,2) = 1, d(1,2) = 1
        let expected = [2.0, 1.0, 1.0];
        assert_eq!(dist.len(), expected.len());
        for (d, e) in dist.iter().zip(expected) {
            assert!((d - e).abs() < 1e-10);
        }
    }

    #[test]
    fn ward_linkage_merges_close_points_first() {
        // 3 similar points + 1 outlier.
        let embeddings = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.95, 0.05, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let dist = pairwise_distances(&embeddings);
        let merges = ward_linkage(&dist, 4);

        assert_eq!(merges.len(), 3);
        let m0 = merges[0];
        assert!(m0.a < 3 && m0.b < 3, "first merge should pair close points, got {} and {}", m0.a, m0.b);

        for pair in merges.windows(2) {
            assert!(
                pair[1].distance >= pair[0].distance - 1e-10,
                "merge distances should be non-decreasing: {} < {}",
                pair[1].distance,
                pair[0].distance
            );
        }
    }

    #[test]
    fn ward_linkage_breaks_ties_lexicographically() {
        // Points 0/1 and 2/3 are equidistant pairs; (0,1) must merge first.
        let embeddings = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![10.0, 0.0],
            vec![11.0, 0.0],
        ];
        let dist = pairwise_distances(&embeddings);
        let merges = ward_linkage(&dist, 4);
        assert_eq!((merges[0].a, merges[0].b), (0, 1));
    }

    #[test]
    fn cut_separates_outlier_at_threshold() {
        let embeddings = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.95, 0.05, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let dist = pairwise_distances(&embeddings);
        let merges = ward_linkage(&dist, 4);
        let labels = cut_dendrogram(&merges, 4, 1.0);

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_ne!(labels[3], labels[0]);
    }

    #[test]
    fn tiny_threshold_leaves_every_point_alone() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]];
        let dist = pairwise_distances(&embeddings);
        let merges = ward_linkage(&dist, 3);
        let labels = cut_dendrogram(&merges, 3, 0.001);

        assert_ne!(labels[0], labels[1]);
        assert_ne!(labels[1], labels[2]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn huge_threshold_merges_everything() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]];
        let dist = pairwise_distances(&embeddings);
        let merges = ward_linkage(&dist, 3);
        let labels = cut_dendrogram(&merges, 3, 100.0);

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
    }

    #[test]
    fn labels_are_dense_and_zero_based() {
        let embeddings = vec![vec![0.0], vec![0.1], vec![5.0], vec![5.1]];
        let dist = pairwise_distances(&embeddings);
        let merges = ward_linkage(&dist, 4);
        let labels = cut_dendrogram(&merges, 4, 1.0);

        let max = *labels.iter().max().unwrap();
        assert_eq!(max, 1);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
    }
}
