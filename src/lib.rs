pub mod error;
pub mod ml;

pub use error::{Error, Result};
pub use ml::classic::{
    assign_points, assignments, distance_squared, kmeans, kmeans_with_abort, kmeans_with_report,
    ClusterSummary, DistanceMetric, FeatureVector, KMeansConfig, KMeansReport, PointDescriptor,
    Seeding, Termination,
};
