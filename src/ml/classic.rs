pub mod feature_space;
pub mod k_means;

// Re-export public types and functions
pub use feature_space::{distance_squared, DistanceMetric, FeatureVector, PointDescriptor};
pub use k_means::{
    assign_points, assignments, kmeans, kmeans_with_abort, kmeans_with_report, ClusterSummary,
    KMeansConfig, KMeansReport, Seeding, Termination,
};
