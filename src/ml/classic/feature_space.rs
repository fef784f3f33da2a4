//! The 5-dimensional feature space used by [`k_means`](super::k_means).
//!
//! A point is described by its spatial position `(x, y)` and its color
//! `(r, g, b)`. No normalization is applied: with the default metric one unit
//! of position weighs exactly as much as one unit of color intensity. Callers
//! that want position and color to be comparably weighted must pre-scale their
//! inputs, or pick [`DistanceMetric::Weighted`].

/// Number of dimensions of a feature vector.
pub const DIMENSIONS: usize = 5;

/// One sample to be clustered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointDescriptor {
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub g: f64,
    pub b: f64,
    /// Index of the cluster this point belongs to. `None` until a clustering
    /// run has processed the point.
    pub cluster_id: Option<usize>,
}

impl PointDescriptor {
    /// Creates an unassigned point.
    pub fn new(x: f64, y: f64, r: f64, g: f64, b: f64) -> Self {
        Self {
            x,
            y,
            r,
            g,
            b,
            cluster_id: None,
        }
    }

    /// The point's position and color as a feature vector.
    ///
    /// ```
    /// use pixel_kmeans::{FeatureVector, PointDescriptor};
    ///
    /// let p = PointDescriptor::new(3.0, 4.0, 255.0, 0.0, 128.0);
    /// assert_eq!(p.features(), FeatureVector::new(3.0, 4.0, 255.0, 0.0, 128.0));
    /// ```
    pub fn features(&self) -> FeatureVector {
        FeatureVector([self.x, self.y, self.r, self.g, self.b])
    }

    /// Returns true if none of the five coordinates is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.features().0.iter().all(|v| v.is_finite())
    }
}

/// A point or centroid in `(x, y, r, g, b)` space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureVector(pub [f64; DIMENSIONS]);

impl FeatureVector {
    /// Builds a vector from its five components.
    pub fn new(x: f64, y: f64, r: f64, g: f64, b: f64) -> Self {
        Self([x, y, r, g, b])
    }

    pub fn x(&self) -> f64 {
        self.0[0]
    }

    pub fn y(&self) -> f64 {
        self.0[1]
    }

    pub fn r(&self) -> f64 {
        self.0[2]
    }

    pub fn g(&self) -> f64 {
        self.0[3]
    }

    pub fn b(&self) -> f64 {
        self.0[4]
    }
}

impl From<&PointDescriptor> for FeatureVector {
    fn from(p: &PointDescriptor) -> Self {
        p.features()
    }
}

/// Distance used to compare a point with a centroid.
///
/// Both variants are (weighted) squared Euclidean distances, so the arithmetic
/// mean stays the optimal centroid for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DistanceMetric {
    /// Plain squared Euclidean distance over all five components.
    #[default]
    SquaredEuclidean,
    /// `spatial * (dx² + dy²) + color * (dr² + dg² + db²)`.
    Weighted { spatial: f64, color: f64 },
}

impl DistanceMetric {
    /// Squared distance between `a` and `b` under this metric.
    #[inline]
    pub fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> f64 {
        match *self {
            DistanceMetric::SquaredEuclidean => distance_squared(a, b),
            DistanceMetric::Weighted { spatial, color } => {
                let (pos, col) = split_distance(a, b);
                spatial * pos + color * col
            }
        }
    }

    /// Weights must be finite and non-negative.
    pub(crate) fn is_valid(&self) -> bool {
        match *self {
            DistanceMetric::SquaredEuclidean => true,
            DistanceMetric::Weighted { spatial, color } => {
                spatial.is_finite() && color.is_finite() && spatial >= 0.0 && color >= 0.0
            }
        }
    }
}

/// Squared Euclidean distance between two feature vectors.
///
/// Commutative, never negative, and zero only when all five components are
/// equal. Only used for ordering, so the square root is never taken.
#[inline]
pub fn distance_squared(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.0.iter()
        .zip(b.0.iter())
        .fold(0.0, |acc, (&p, &q)| acc + (p - q) * (p - q))
}

// (spatial part, color part)
#[inline]
fn split_distance(a: &FeatureVector, b: &FeatureVector) -> (f64, f64) {
    let sq = |i: usize| (a.0[i] - b.0[i]) * (a.0[i] - b.0[i]);
    (sq(0) + sq(1), sq(2) + sq(3) + sq(4))
}
