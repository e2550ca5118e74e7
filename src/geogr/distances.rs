//! Pairwise distances between the geometries of two tables

use std::str::FromStr;

use geo::{EuclideanDistance, FrechetDistance, Geometry};

use super::{geom_type, haversine_dist};
use crate::frame::Frame;
use crate::{Error, Result};

/// Distance used by [`calculate_distance_matrix`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Great circle distance between points, meters
    Haversine,
    /// Planar distance between points, coordinate units
    Euclidean,
    /// Discrete Fréchet distance between lines, coordinate units
    Frechet,
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "haversine" => Ok(DistanceMetric::Haversine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "frechet" => Ok(DistanceMetric::Frechet),
            other => Err(Error::UnknownMethod {
                method: other.to_string(),
                purpose: "calculating distances",
            }),
        }
    }
}

/// Distance of every geometry in `a` to every geometry in `b` (or in `a`
/// itself). Rows follow `a`, columns follow `b`; null geometries give NaN.
pub fn calculate_distance_matrix(
    a: &Frame,
    b: Option<&Frame>,
    metric: DistanceMetric,
) -> Result<Vec<Vec<f64>>> {
    let left = a
        .geometries()
        .ok_or(Error::MissingGeometry { entity: "distance matrix" })?;
    let right = match b {
        Some(b) => b
            .geometries()
            .ok_or(Error::MissingGeometry { entity: "distance matrix" })?,
        None => left,
    };

    let mut matrix = Vec::with_capacity(left.len());
    for l in left {
        let mut row = Vec::with_capacity(right.len());
        for r in right {
            let d = match (l, r) {
                (Some(l), Some(r)) => distance(l, r, metric)?,
                _ => f64::NAN,
            };
            row.push(d);
        }
        matrix.push(row);
    }

    Ok(matrix)
}

fn distance(a: &Geometry<f64>, b: &Geometry<f64>, metric: DistanceMetric) -> Result<f64> {
    match (metric, a, b) {
        (DistanceMetric::Haversine, Geometry::Point(a), Geometry::Point(b)) => {
            Ok(haversine_dist(a.x(), a.y(), b.x(), b.y()))
        }
        (DistanceMetric::Euclidean, Geometry::Point(a), Geometry::Point(b)) => {
            Ok(a.euclidean_distance(b))
        }
        (DistanceMetric::Frechet, Geometry::LineString(a), Geometry::LineString(b)) => {
            Ok(a.frechet_distance(b))
        }
        _ => {
            let expected = match metric {
                DistanceMetric::Frechet => "LineString",
                _ => "Point",
            };
            let found = [a, b]
                .into_iter()
                .map(geom_type)
                .find(|t| *t != expected)
                .unwrap_or(expected);

            Err(Error::GeometryType {
                entity: "distance matrix",
                expected,
                found,
            })
        }
    }
}
