//! Density-based clustering (DBSCAN) over one-dimensional points.

/// Cluster assignment of one point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Noise,
    Cluster(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub labels: Vec<Label>,
    pub n_clusters: usize,
}

impl Clustering {
    pub fn is_noise(&self, idx: usize) -> bool {
        matches!(self.labels.get(idx), Some(Label::Noise))
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| **l == Label::Noise).count()
    }
}

/// Label every point. A point is a core point when at least `min_samples`
/// points, itself included, lie within `eps` of it. Clusters grow from core
/// points; points reachable from no core point are noise.
pub fn dbscan(points: &[f64], eps: f64, min_samples: usize) -> Clustering {
    let n = points.len();
    let mut labels: Vec<Option<Label>> = vec![None; n];
    let mut cluster_id = 0usize;

    for i in 0..n {
        if labels[i].is_some() {
            continue;
        }

        let neighbors = range_query(points, i, eps);
        if neighbors.len() < min_samples {
            labels[i] = Some(Label::Noise);
            continue;
        }

        labels[i] = Some(Label::Cluster(cluster_id));
        let mut seeds = neighbors;
        while let Some(q) = seeds.pop() {
            match labels[q] {
                // Border point: joins the cluster but does not extend it
                Some(Label::Noise) => labels[q] = Some(Label::Cluster(cluster_id)),
                Some(Label::Cluster(_)) => {}
                None => {
                    labels[q] = Some(Label::Cluster(cluster_id));
                    let q_neighbors = range_query(points, q, eps);
                    if q_neighbors.len() >= min_samples {
                        seeds.extend(q_neighbors);
                    }
                }
            }
        }
        cluster_id += 1;
    }

    Clustering {
        labels: labels.into_iter().map(|l| l.unwrap_or(Label::Noise)).collect(),
        n_clusters: cluster_id,
    }
}

fn range_query(points: &[f64], idx: usize, eps: f64) -> Vec<usize> {
    let p = points[idx];
    points
        .iter()
        .enumerate()
        .filter(|(_, q)| (p - **q).abs() <= eps)
        .map(|(i, _)| i)
        .collect()
}
