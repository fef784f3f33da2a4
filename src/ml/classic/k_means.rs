//! K-means clustering of [`PointDescriptor`]s in `(x, y, r, g, b)` space.
//!
//! Each run alternates two barrier-separated steps until the partition stops
//! changing, the centroids stop moving, or the iteration cap is hit:
//!
//! 1. **Assignment**: every point takes the id of its nearest centroid (lowest
//!    id wins ties). Parallel over points, centroids are read-only.
//! 2. **Update**: per-cluster sums are accumulated in fixed-size chunks, folded
//!    in chunk order and then divided by the counts. A cluster left without
//!    points keeps its previous centroid.
//!
//! The chunking is independent of the thread pool, so two runs over the same
//! input produce bit-identical results.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

use super::feature_space::{DistanceMetric, FeatureVector, PointDescriptor, DIMENSIONS};
use crate::error::{Error, Result};

/// Points handled per parallel work item.
const CHUNK_SIZE: usize = 4096;

/// Chunks reduced in parallel before folding into the running total.
const ACCUMULATOR_BATCH: usize = 16;

/// How the initial centroids are picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Seeding {
    /// Centroid `i` starts at point `i * n / k`, a uniformly spaced sample of
    /// the input sequence.
    #[default]
    Uniform,
    /// k-means++ driven by a ChaCha20 generator seeded with `seed`.
    KMeansPlusPlus { seed: u64 },
}

/// Configuration options for k-means clustering.
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters to find.
    pub k: usize,
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// The run stops once the total squared movement of all centroids in one
    /// iteration falls below this value. Movement is measured with `metric`,
    /// so under [`DistanceMetric::Weighted`] it is in weighted units.
    pub tolerance: f64,
    /// How the initial centroids are picked.
    pub seeding: Seeding,
    /// Distance used for assignment and for centroid movement.
    pub metric: DistanceMetric,
}

impl KMeansConfig {
    /// Create a new config with default values for max_iterations (100) and tolerance (1e-12).
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: 100,
            tolerance: 1e-12,
            seeding: Seeding::Uniform,
            metric: DistanceMetric::SquaredEuclidean,
        }
    }

    /// Customize the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Customize the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Customize the centroid seeding policy.
    pub fn with_seeding(mut self, seeding: Seeding) -> Self {
        self.seeding = seeding;
        self
    }

    /// Customize the distance metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if !self.metric.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "metric weights must be finite and non-negative, got {:?}",
                self.metric
            )));
        }
        Ok(())
    }
}

/// Aggregate statistics of one cluster.
///
/// When `count > 0` the `mean_*` fields are the arithmetic means over the
/// points carrying this `id`. An empty cluster keeps its last centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub id: usize,
    pub count: usize,
    pub mean_x: f64,
    pub mean_y: f64,
    pub mean_r: f64,
    pub mean_g: f64,
    pub mean_b: f64,
}

impl ClusterSummary {
    fn seeded(id: usize, centroid: FeatureVector) -> Self {
        let mut summary = Self {
            id,
            count: 0,
            mean_x: 0.0,
            mean_y: 0.0,
            mean_r: 0.0,
            mean_g: 0.0,
            mean_b: 0.0,
        };
        summary.set_centroid(centroid);
        summary
    }

    /// The centroid as a feature vector.
    pub fn centroid(&self) -> FeatureVector {
        FeatureVector::new(self.mean_x, self.mean_y, self.mean_r, self.mean_g, self.mean_b)
    }

    fn set_centroid(&mut self, c: FeatureVector) {
        let [x, y, r, g, b] = c.0;
        self.mean_x = x;
        self.mean_y = y;
        self.mean_r = r;
        self.mean_g = g;
        self.mean_b = b;
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// An iteration left every assignment unchanged.
    Converged,
    /// Total squared centroid movement fell below the tolerance. The partition
    /// is not necessarily a fixed point: another assignment step may still
    /// move some points.
    ToleranceReached,
    /// The iteration cap was hit first. The partition is still valid.
    MaxIterations,
    /// The abort flag was raised between iterations.
    Aborted,
}

impl Termination {
    /// True for [`Termination::Converged`] and [`Termination::ToleranceReached`].
    /// Only `Converged` guarantees a fixed point.
    pub fn converged(&self) -> bool {
        matches!(self, Termination::Converged | Termination::ToleranceReached)
    }
}

/// Cluster summaries plus diagnostics about the run that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansReport {
    /// Final summaries, index-aligned with cluster ids.
    pub summaries: Vec<ClusterSummary>,
    /// Number of completed assignment/update iterations.
    pub iterations: usize,
    pub termination: Termination,
    /// Sum of squared distances from each point to its centroid, measured
    /// during the last assignment step.
    pub inertia: f64,
}

/// Runs k-means on `points`, writing each point's final `cluster_id` in place
/// and returning the `k` cluster summaries ordered by id.
///
/// Hitting `max_iterations` is not an error; use [`kmeans_with_report`] to see
/// how the run terminated.
///
/// # Errors
///
/// - [`Error::EmptyInput`] if `points` is empty.
/// - [`Error::InvalidClusterCount`] if `k == 0` or `k > points.len()`.
/// - [`Error::InvalidConfig`] for a zero iteration cap, a negative or NaN
///   tolerance, or invalid metric weights.
/// - [`Error::NonFinitePoint`] if a point has a NaN or infinite coordinate.
///
/// # Example
///
/// ```
/// use pixel_kmeans::{kmeans, KMeansConfig, PointDescriptor};
///
/// let mut points = vec![
///     PointDescriptor::new(0.0, 0.0, 0.0, 0.0, 0.0),
///     PointDescriptor::new(0.0, 0.0, 1.0, 1.0, 1.0),
///     PointDescriptor::new(10.0, 10.0, 0.0, 0.0, 0.0),
///     PointDescriptor::new(10.0, 10.0, 1.0, 1.0, 1.0),
/// ];
///
/// let summaries = kmeans(&mut points, &KMeansConfig::new(2)).unwrap();
/// assert_eq!(summaries.len(), 2);
/// assert_eq!(points[0].cluster_id, points[1].cluster_id);
/// ```
pub fn kmeans(
    points: &mut [PointDescriptor],
    config: &KMeansConfig,
) -> Result<Vec<ClusterSummary>> {
    kmeans_with_report(points, config).map(|report| report.summaries)
}

/// Like [`kmeans`], but also reports iteration count, termination reason and
/// inertia.
pub fn kmeans_with_report(
    points: &mut [PointDescriptor],
    config: &KMeansConfig,
) -> Result<KMeansReport> {
    run(points, config, None)
}

/// Like [`kmeans_with_report`], but stops early once `abort` is set.
///
/// The flag is checked at the top of every iteration after the first, so an
/// aborted run still returns a complete partition.
pub fn kmeans_with_abort(
    points: &mut [PointDescriptor],
    config: &KMeansConfig,
    abort: &AtomicBool,
) -> Result<KMeansReport> {
    run(points, config, Some(abort))
}

/// Assigns every point to its nearest centroid in `summaries` (lowest id wins
/// ties) and returns how many points changed cluster.
///
/// This is the assignment step on its own. It can classify new points
/// against a finished clustering, or check that a result is a fixed point.
///
/// # Errors
///
/// [`Error::InvalidClusterCount`] if `summaries` is empty.
pub fn assign_points(
    points: &mut [PointDescriptor],
    summaries: &[ClusterSummary],
    metric: DistanceMetric,
) -> Result<usize> {
    if summaries.is_empty() {
        return Err(Error::InvalidClusterCount {
            k: 0,
            n: points.len(),
        });
    }
    Ok(assignment_step(points, summaries, metric).0)
}

/// The assignment vector, one entry per point.
pub fn assignments(points: &[PointDescriptor]) -> Vec<Option<usize>> {
    points.iter().map(|p| p.cluster_id).collect()
}

fn validate(points: &[PointDescriptor], config: &KMeansConfig) -> Result<()> {
    let n = points.len();
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    if config.k == 0 || config.k > n {
        return Err(Error::InvalidClusterCount { k: config.k, n });
    }
    config.validate()?;
    if let Some(index) = points.iter().position(|p| !p.is_finite()) {
        return Err(Error::NonFinitePoint { index });
    }
    Ok(())
}

fn run(
    points: &mut [PointDescriptor],
    config: &KMeansConfig,
    abort: Option<&AtomicBool>,
) -> Result<KMeansReport> {
    validate(points, config)?;

    // Stale ids from an earlier run would make the first iteration look
    // partially converged.
    points.iter_mut().for_each(|p| p.cluster_id = None);

    let mut summaries: Vec<ClusterSummary> = initial_centroids(points, config)
        .into_iter()
        .enumerate()
        .map(|(id, c)| ClusterSummary::seeded(id, c))
        .collect();

    let mut termination = Termination::MaxIterations;
    let mut iterations = 0;
    let mut inertia = 0.0;

    for iteration in 1..=config.max_iterations {
        if iteration > 1 && abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            termination = Termination::Aborted;
            break;
        }

        let (changed, step_inertia) = assignment_step(points, &summaries, config.metric);
        let movement = update_step(points, &mut summaries, config.metric);
        iterations = iteration;
        inertia = step_inertia;

        debug!(
            "k-means iteration {}: {} reassigned, movement {:e}, inertia {:e}",
            iteration, changed, movement, inertia
        );

        if changed == 0 {
            termination = Termination::Converged;
            break;
        }
        if movement < config.tolerance {
            termination = Termination::ToleranceReached;
            break;
        }
    }

    match termination {
        Termination::MaxIterations => warn!(
            "k-means hit the iteration cap ({}) before converging, k = {}, n = {}",
            config.max_iterations,
            config.k,
            points.len()
        ),
        Termination::Aborted => info!("k-means aborted after {} iterations", iterations),
        _ => info!(
            "k-means converged ({:?}) after {} iterations, k = {}, n = {}",
            termination,
            iterations,
            config.k,
            points.len()
        ),
    }

    Ok(KMeansReport {
        summaries,
        iterations,
        termination,
        inertia,
    })
}

fn initial_centroids(points: &[PointDescriptor], config: &KMeansConfig) -> Vec<FeatureVector> {
    let n = points.len();
    let k = config.k;
    match config.seeding {
        Seeding::Uniform => (0..k).map(|i| points[i * n / k].features()).collect(),
        Seeding::KMeansPlusPlus { seed } => plus_plus(points, k, config.metric, seed),
    }
}

/// k-means++: each new centroid is drawn with probability proportional to the
/// squared distance to the closest centroid chosen so far.
fn plus_plus(
    points: &[PointDescriptor],
    k: usize,
    metric: DistanceMetric,
    seed: u64,
) -> Vec<FeatureVector> {
    let n = points.len();
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut centroids = Vec::with_capacity(k);

    let first = points[rng.gen_range(0..n)].features();
    let mut closest: Vec<f64> = points
        .par_iter()
        .map(|p| metric.distance(&p.features(), &first))
        .collect();
    centroids.push(first);

    while centroids.len() < k {
        // All weights zero: every point already sits on a centroid.
        let next = match WeightedIndex::new(&closest) {
            Ok(dist) => dist.sample(&mut rng),
            Err(_) => rng.gen_range(0..n),
        };
        let c = points[next].features();
        closest
            .par_iter_mut()
            .zip(points.par_iter())
            .for_each(|(d, p)| *d = d.min(metric.distance(&p.features(), &c)));
        centroids.push(c);
    }
    centroids
}

/// Index and distance of the nearest centroid. Strict `<` keeps the lowest id
/// on ties.
#[inline]
fn nearest(
    point: &FeatureVector,
    centroids: &[FeatureVector],
    metric: DistanceMetric,
) -> (usize, f64) {
    let mut best = 0;
    let mut best_dist = metric.distance(point, &centroids[0]);
    for (idx, c) in centroids.iter().enumerate().skip(1) {
        let dist = metric.distance(point, c);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    (best, best_dist)
}

/// Returns (points reassigned, inertia).
fn assignment_step(
    points: &mut [PointDescriptor],
    summaries: &[ClusterSummary],
    metric: DistanceMetric,
) -> (usize, f64) {
    let centroids: Vec<FeatureVector> = summaries.iter().map(ClusterSummary::centroid).collect();

    let partials: Vec<(usize, f64)> = points
        .par_chunks_mut(CHUNK_SIZE)
        .map(|chunk| {
            let mut changed = 0;
            let mut inertia = 0.0;
            for p in chunk.iter_mut() {
                let (best, dist) = nearest(&p.features(), &centroids, metric);
                if p.cluster_id != Some(best) {
                    p.cluster_id = Some(best);
                    changed += 1;
                }
                inertia += dist;
            }
            (changed, inertia)
        })
        .collect();

    partials
        .into_iter()
        .fold((0, 0.0), |(changed, inertia), (c, i)| (changed + c, inertia + i))
}

/// Per-cluster point counts and coordinate sums.
struct Accumulator {
    counts: Vec<usize>,
    sums: Vec<[f64; DIMENSIONS]>,
}

impl Accumulator {
    fn new(k: usize) -> Self {
        Self {
            counts: vec![0; k],
            sums: vec![[0.0; DIMENSIONS]; k],
        }
    }

    fn add(&mut self, id: usize, features: &FeatureVector) {
        self.counts[id] += 1;
        for (s, v) in self.sums[id].iter_mut().zip(features.0.iter()) {
            *s += v;
        }
    }

    fn merge(mut self, other: Accumulator) -> Self {
        for (c, o) in self.counts.iter_mut().zip(other.counts) {
            *c += o;
        }
        for (s, o) in self.sums.iter_mut().zip(other.sums) {
            for (a, b) in s.iter_mut().zip(o.iter()) {
                *a += b;
            }
        }
        self
    }
}

/// Recomputes every summary from the current assignments and returns the total
/// squared centroid movement, measured with `metric`.
///
/// Chunks are reduced in parallel one batch at a time and folded into a single
/// running total in chunk order, so at most `ACCUMULATOR_BATCH + 1`
/// accumulators are alive at once.
fn update_step(
    points: &[PointDescriptor],
    summaries: &mut [ClusterSummary],
    metric: DistanceMetric,
) -> f64 {
    let k = summaries.len();

    let mut total = Accumulator::new(k);
    for batch in points.chunks(CHUNK_SIZE * ACCUMULATOR_BATCH) {
        let partials: Vec<Accumulator> = batch
            .par_chunks(CHUNK_SIZE)
            .map(|chunk| {
                let mut acc = Accumulator::new(k);
                for p in chunk {
                    if let Some(id) = p.cluster_id {
                        acc.add(id, &p.features());
                    }
                }
                acc
            })
            .collect();
        total = partials.into_iter().fold(total, Accumulator::merge);
    }

    let mut movement = 0.0;
    for ((summary, count), sums) in summaries
        .iter_mut()
        .zip(total.counts)
        .zip(total.sums)
    {
        summary.count = count;
        if count == 0 {
            continue;
        }
        let n = count as f64;
        let centroid = FeatureVector(sums.map(|s| s / n));
        movement += metric.distance(&summary.centroid(), &centroid);
        summary.set_centroid(centroid);
    }
    movement
}

#[cfg(test)]
mod properties;
