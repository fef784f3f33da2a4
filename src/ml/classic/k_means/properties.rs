use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::Error;
use crate::ml::classic::{
    assign_points, assignments, kmeans, kmeans_with_report, DistanceMetric, KMeansConfig,
    PointDescriptor, Seeding, Termination,
};

const CENTERS: [[f64; 5]; 3] = [
    [20.0, 20.0, 200.0, 30.0, 30.0],
    [100.0, 40.0, 30.0, 200.0, 30.0],
    [60.0, 120.0, 30.0, 30.0, 200.0],
];

/// Three well separated blobs, stored blob after blob.
fn blobs(per_blob: usize, seed: u64) -> Vec<PointDescriptor> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(per_blob * CENTERS.len());
    for c in CENTERS.iter() {
        for _ in 0..per_blob {
            let mut jitter = || rng.gen_range(-5.0..5.0_f64);
            points.push(PointDescriptor::new(
                c[0] + jitter(),
                c[1] + jitter(),
                c[2] + jitter(),
                c[3] + jitter(),
                c[4] + jitter(),
            ));
        }
    }
    points
}

fn fixed_point_config(k: usize) -> KMeansConfig {
    KMeansConfig::new(k)
        .with_tolerance(0.0)
        .with_max_iterations(1000)
}

#[test]
fn test_ids_in_range_and_counts_sum_to_n() {
    // More points than one parallel chunk.
    let mut points = blobs(4000, 1);
    let summaries = kmeans(&mut points, &KMeansConfig::new(5)).unwrap();

    assert_eq!(summaries.len(), 5);
    for (i, s) in summaries.iter().enumerate() {
        assert_eq!(s.id, i);
    }
    assert!(points
        .iter()
        .all(|p| matches!(p.cluster_id, Some(id) if id < 5)));
    assert_eq!(
        summaries.iter().map(|s| s.count).sum::<usize>(),
        points.len()
    );
}

#[test]
fn test_means_match_assigned_points() {
    let mut points = blobs(3000, 2);
    let summaries = kmeans(&mut points, &KMeansConfig::new(4)).unwrap();

    for s in summaries.iter().filter(|s| s.count > 0) {
        let members: Vec<&PointDescriptor> = points
            .iter()
            .filter(|p| p.cluster_id == Some(s.id))
            .collect();
        assert_eq!(members.len(), s.count);
        let n = members.len() as f64;
        let mean = |f: fn(&PointDescriptor) -> f64| members.iter().map(|p| f(p)).sum::<f64>() / n;
        assert_relative_eq!(s.mean_x, mean(|p| p.x), max_relative = 1e-9);
        assert_relative_eq!(s.mean_y, mean(|p| p.y), max_relative = 1e-9);
        assert_relative_eq!(s.mean_r, mean(|p| p.r), max_relative = 1e-9);
        assert_relative_eq!(s.mean_g, mean(|p| p.g), max_relative = 1e-9);
        assert_relative_eq!(s.mean_b, mean(|p| p.b), max_relative = 1e-9);
    }
}

#[test]
fn test_recovers_blobs() {
    let per_blob = 2000;
    let mut points = blobs(per_blob, 3);
    let report = kmeans_with_report(&mut points, &KMeansConfig::new(3)).unwrap();

    assert!(report.termination.converged());
    for (blob, (chunk, center)) in points.chunks(per_blob).zip(CENTERS.iter()).enumerate() {
        let id = chunk[0].cluster_id;
        assert!(chunk.iter().all(|p| p.cluster_id == id), "blob {blob} split");
        let s = &report.summaries[id.unwrap()];
        assert_eq!(s.count, per_blob);
        assert!((s.mean_x - center[0]).abs() < 1.0);
        assert!((s.mean_b - center[4]).abs() < 1.0);
    }
}

#[test]
fn test_result_is_fixed_point() {
    let mut points = blobs(1500, 4);
    let report = kmeans_with_report(&mut points, &fixed_point_config(6)).unwrap();
    assert_eq!(report.termination, Termination::Converged);

    let before = assignments(&points);
    let changed = assign_points(&mut points, &report.summaries, DistanceMetric::default()).unwrap();
    assert_eq!(changed, 0);
    assert_eq!(assignments(&points), before);
}

#[test]
fn test_runs_are_deterministic() {
    for seeding in [Seeding::Uniform, Seeding::KMeansPlusPlus { seed: 99 }] {
        let config = KMeansConfig::new(7).with_seeding(seeding);
        let mut a = blobs(5000, 5);
        let mut b = a.clone();
        let ra = kmeans_with_report(&mut a, &config).unwrap();
        let rb = kmeans_with_report(&mut b, &config).unwrap();
        assert_eq!(ra, rb);
        assert_eq!(assignments(&a), assignments(&b));
    }
}

#[test]
fn test_k_equals_n_has_zero_variance() {
    let mut points = blobs(20, 6);
    let original = points.clone();
    let n = points.len();
    let report = kmeans_with_report(&mut points, &KMeansConfig::new(n)).unwrap();

    assert!(report.summaries.iter().all(|s| s.count == 1));
    assert_eq!(report.inertia, 0.0);
    for (p, o) in points.iter().zip(&original) {
        let s = &report.summaries[p.cluster_id.unwrap()];
        assert_eq!(s.centroid(), o.features());
    }
}

#[test]
fn test_iteration_cap_is_not_an_error() {
    let mut points = blobs(500, 7);
    let config = KMeansConfig::new(8)
        .with_seeding(Seeding::KMeansPlusPlus { seed: 3 })
        .with_tolerance(0.0)
        .with_max_iterations(1);
    let report = kmeans_with_report(&mut points, &config).unwrap();

    assert_eq!(report.termination, Termination::MaxIterations);
    assert_eq!(report.iterations, 1);
    assert_eq!(
        report.summaries.iter().map(|s| s.count).sum::<usize>(),
        points.len()
    );
}

#[test]
fn test_too_many_clusters_fails() {
    let mut points = blobs(1, 8);
    points.truncate(2);
    assert_eq!(
        kmeans(&mut points, &KMeansConfig::new(3)).unwrap_err(),
        Error::InvalidClusterCount { k: 3, n: 2 }
    );
}
