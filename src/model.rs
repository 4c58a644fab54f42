//! K-Means segmentation of users into usage tiers

use linfa::metrics::SilhouetteScore;
use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::{Distance, L2Dist};
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};
use crate::summary::UserUsageSummary;

/// Number of usage tiers, and so of K-Means clusters
pub const USAGE_TIERS: usize = 3;

/// Semantic label of a cluster, ordered from least to most use
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UsageTier {
    Occasional,
    Frequent,
    Heavy,
}

impl UsageTier {
    /// Tiers by rank
    pub const ALL: [UsageTier; USAGE_TIERS] =
        [UsageTier::Occasional, UsageTier::Frequent, UsageTier::Heavy];

    pub fn rank(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UsageTier::Occasional => "Occasional",
            UsageTier::Frequent => "Frequent",
            UsageTier::Heavy => "Heavy",
        }
    }
}

impl fmt::Display for UsageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// K-Means fitting parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    /// Seed for centroid initialization; the same seed gives the same tiers
    pub seed: u64,
    pub max_iters: u64,
    pub tolerance: f64,
    /// Independent initializations; the run with the lowest inertia is kept
    pub n_runs: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iters: 300,
            tolerance: 1e-4,
            n_runs: 10,
        }
    }
}

impl ClusterParams {
    fn validate(&self) -> Result<()> {
        if self.max_iters == 0 {
            return Err(AnalysisError::Configuration(
                "max iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(AnalysisError::Configuration(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.n_runs == 0 {
            return Err(AnalysisError::Configuration(
                "number of runs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A user summary with its assigned tier
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedUser {
    pub summary: UserUsageSummary,
    pub tier: UsageTier,
}

/// Per-tier view of the fitted clusters
#[derive(Debug, Clone, PartialEq)]
pub struct TierProfile {
    pub tier: UsageTier,
    /// Arbitrary index assigned by K-Means
    pub cluster_index: usize,
    pub size: usize,
    /// (activity days, sleep-or-weight days)
    pub centroid: (f64, f64),
    /// `None` for an empty cluster
    pub mean_activity_days: Option<f64>,
    pub mean_sleep_or_weight_days: Option<f64>,
}

/// Result of segmenting users into tiers
#[derive(Debug, Clone)]
pub struct Classification {
    /// Users in input order
    pub users: Vec<ClassifiedUser>,
    /// Feature rows in input order: (activity days, sleep-or-weight days)
    pub features: Array2<f64>,
    /// Raw K-Means cluster index per user
    pub cluster_labels: Array1<usize>,
    /// Centroids by raw cluster index
    pub centroids: Array2<f64>,
    /// Tier of each raw cluster index
    pub tier_of_cluster: [UsageTier; USAGE_TIERS],
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl Classification {
    /// Raw cluster index carrying `tier`
    pub fn cluster_of(&self, tier: UsageTier) -> usize {
        self.tier_of_cluster
            .iter()
            .position(|&t| t == tier)
            .unwrap_or(tier.rank())
    }

    pub fn centroid(&self, tier: UsageTier) -> ArrayView1<'_, f64> {
        self.centroids.row(self.cluster_of(tier))
    }

    /// Users per tier, indexed by tier rank
    pub fn tier_sizes(&self) -> [usize; USAGE_TIERS] {
        let mut sizes = [0; USAGE_TIERS];
        for user in &self.users {
            sizes[user.tier.rank()] += 1;
        }
        sizes
    }

    pub fn users_in(&self, tier: UsageTier) -> impl Iterator<Item = &ClassifiedUser> {
        self.users.iter().filter(move |u| u.tier == tier)
    }

    /// Tier profiles from Occasional to Heavy
    pub fn tier_profiles(&self) -> Vec<TierProfile> {
        UsageTier::ALL
            .iter()
            .map(|&tier| {
                let cluster_index = self.cluster_of(tier);
                let centroid = self.centroids.row(cluster_index);
                let members: Vec<usize> = self
                    .cluster_labels
                    .iter()
                    .enumerate()
                    .filter(|(_, label)| **label == cluster_index)
                    .map(|(i, _)| i)
                    .collect();
                let column_mean = |col: usize| {
                    (!members.is_empty()).then(|| {
                        members.iter().map(|&i| self.features[[i, col]]).sum::<f64>()
                            / members.len() as f64
                    })
                };

                TierProfile {
                    tier,
                    cluster_index,
                    size: members.len(),
                    centroid: (centroid[0], centroid[1]),
                    mean_activity_days: column_mean(0),
                    mean_sleep_or_weight_days: column_mean(1),
                }
            })
            .collect()
    }

    /// Tier of a hypothetical user with the given day counts
    pub fn predict(&self, activity_days: f64, sleep_or_weight_days: f64) -> UsageTier {
        let point = Array1::from(vec![activity_days, sleep_or_weight_days]);
        let cluster = nearest_centroid(point.view(), &self.centroids);
        self.tier_of_cluster[cluster]
    }

    /// Mean silhouette coefficient over all users, by Euclidean distance
    ///
    /// A single populated cluster scores 1.
    pub fn silhouette_score(&self) -> Result<f64> {
        DatasetBase::new(self.features.view(), self.cluster_labels.view())
            .silhouette_score()
            .map_err(|e| AnalysisError::Clustering(e.to_string()))
    }
}

/// Feature matrix (n_users, 2): activity days used, sleep-or-weight days used
pub fn feature_matrix(summaries: &[UserUsageSummary]) -> Array2<f64> {
    let mut features = Array2::zeros((summaries.len(), 2));
    for (i, summary) in summaries.iter().enumerate() {
        features[[i, 0]] = summary.activity_days_used as f64;
        features[[i, 1]] = summary.sleep_or_weight_days_used as f64;
    }
    features
}

/// Segment users into Occasional, Frequent and Heavy tiers
///
/// # Arguments
/// * `summaries` - One summary per user
/// * `params` - K-Means parameters; the seed makes a run reproducible
///
/// # Returns
/// * `Classification` with a tier per user, centroids and fit metrics
///
/// Fails with `Configuration` when there are fewer than three distinct users.
/// Users sharing a usage profile are valid input: with fewer than three
/// distinct profiles the seeding repeats a point, the extra centroids
/// coincide and their clusters stay empty.
pub fn classify(summaries: &[UserUsageSummary], params: &ClusterParams) -> Result<Classification> {
    params.validate()?;

    let distinct_users: HashSet<i64> = summaries.iter().map(|s| s.user_id).collect();
    if distinct_users.len() < USAGE_TIERS {
        return Err(AnalysisError::Configuration(format!(
            "clustering into {} usage tiers needs at least {} distinct users, found {}",
            USAGE_TIERS,
            USAGE_TIERS,
            distinct_users.len()
        )));
    }

    let features = feature_matrix(summaries);
    let dataset = DatasetBase::from(features.clone());
    let rng = StdRng::seed_from_u64(params.seed);

    let model = KMeans::params_with(USAGE_TIERS, rng, L2Dist)
        .n_runs(params.n_runs)
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)
        .map_err(|e| AnalysisError::Clustering(e.to_string()))?;

    let centroids = model.centroids().clone();
    let cluster_labels: Array1<usize> = features
        .outer_iter()
        .map(|point| nearest_centroid(point, &centroids))
        .collect();
    let inertia = compute_inertia(&features, &cluster_labels, &centroids);
    let tier_of_cluster = rank_clusters(&features, &cluster_labels, &centroids);

    debug!(?centroids, ?tier_of_cluster, "fitted k-means");
    info!(users = summaries.len(), inertia, "segmented users into usage tiers");

    let users = summaries
        .iter()
        .zip(cluster_labels.iter())
        .map(|(summary, &cluster)| ClassifiedUser {
            summary: summary.clone(),
            tier: tier_of_cluster[cluster],
        })
        .collect();

    Ok(Classification {
        users,
        features,
        cluster_labels,
        centroids,
        tier_of_cluster,
        inertia,
    })
}

/// Label raw clusters by ascending mean activity days of their members
///
/// An empty cluster is ranked by its centroid's activity coordinate. Equal
/// criteria keep the lower cluster index first.
pub fn rank_clusters(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    centroids: &Array2<f64>,
) -> [UsageTier; USAGE_TIERS] {
    let mut sums = [0.0; USAGE_TIERS];
    let mut counts = [0usize; USAGE_TIERS];
    for (point, &label) in features.outer_iter().zip(labels.iter()) {
        sums[label] += point[0];
        counts[label] += 1;
    }

    let criterion: Vec<f64> = (0..USAGE_TIERS)
        .map(|c| {
            if counts[c] > 0 {
                sums[c] / counts[c] as f64
            } else {
                centroids[[c, 0]]
            }
        })
        .collect();

    let mut order: Vec<usize> = (0..USAGE_TIERS).collect();
    order.sort_by(|&a, &b| criterion[a].total_cmp(&criterion[b]).then(a.cmp(&b)));

    let mut tiers = UsageTier::ALL;
    for (rank, &cluster) in order.iter().enumerate() {
        tiers[cluster] = UsageTier::ALL[rank];
    }
    tiers
}

/// Index of the closest centroid; ties go to the lowest index
fn nearest_centroid(point: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> usize {
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = 0;

    for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = L2Dist.distance(point, centroid);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = cluster_idx;
        }
    }

    closest_cluster
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter())
        .map(|(point, &cluster)| L2Dist.rdistance(point, centroids.row(cluster)))
        .sum()
}
