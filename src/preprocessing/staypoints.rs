//! Staypoint extraction

use std::str::FromStr;

use geo::{Geometry, Point};
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::analysis::timestamps;
use crate::frame::{Column, Frame};
use crate::geogr::haversine_dist;
use crate::model::{retag, Kind, Positionfixes, Staypoints, Tagged};
use crate::{Error, Result};

/// Staypoint extraction algorithm
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Window anchored at a fix, closed by the first fix farther away than
    /// the distance threshold
    Sliding,
}

impl FromStr for ExtractionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sliding" => Ok(ExtractionMethod::Sliding),
            other => Err(Error::UnknownMethod {
                method: other.to_string(),
                purpose: "extracting staypoints",
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StaypointOptions {
    pub method: ExtractionMethod,
    /// How far someone has to travel to leave a staypoint, meters
    pub dist_threshold: f64,
    /// How long someone has to stay to make a staypoint
    pub time_threshold: Duration,
}

impl Default for StaypointOptions {
    fn default() -> Self {
        Self {
            method: ExtractionMethod::Sliding,
            dist_threshold: 100.0,
            time_threshold: Duration::minutes(5),
        }
    }
}

/// Position of a fix usable by the extraction
struct Fix {
    pos: usize,
    at: OffsetDateTime,
    point: Point<f64>,
}

struct Staypoint {
    /// Row of the user in the positionfixes
    user_pos: usize,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
    point: Point<f64>,
}

impl Positionfixes {
    /// Extract the staypoints of every user
    ///
    /// The result is tagged like any derived table: without a single
    /// staypoint it is the generic container.
    pub fn extract_staypoints(&self, options: &StaypointOptions) -> Result<Tagged> {
        let frame = self.frame();
        let tracked = timestamps(frame, "tracked_at")?;
        let geometries = frame.geometries().unwrap_or_default();
        let users = frame.column_or_err("user_id")?;

        let mut staypoints = vec![];
        for (_, positions) in frame.group_positions(&["user_id"])? {
            let mut fixes: Vec<Fix> = positions
                .into_iter()
                .filter_map(|pos| {
                    let at = tracked[pos]?;
                    match geometries.get(pos) {
                        Some(Some(Geometry::Point(point))) => Some(Fix {
                            pos,
                            at,
                            point: *point,
                        }),
                        _ => None,
                    }
                })
                .collect();
            fixes.sort_by_key(|f| f.at);

            match options.method {
                ExtractionMethod::Sliding => {
                    sliding(&fixes, options, &mut staypoints);
                }
            }
        }

        info!(
            "Extracted {} staypoints from {} positionfixes",
            staypoints.len(),
            frame.len()
        );

        let user_pos: Vec<usize> = staypoints.iter().map(|s| s.user_pos).collect();
        let out = Frame::new(vec![
            ("user_id", users.take(&user_pos)?),
            (
                "started_at",
                Column::from(staypoints.iter().map(|s| s.started_at).collect::<Vec<_>>()),
            ),
            (
                "finished_at",
                Column::from(staypoints.iter().map(|s| s.finished_at).collect::<Vec<_>>()),
            ),
            (
                "geom",
                Column::geometries(staypoints.iter().map(|s| s.point)),
            ),
        ])?
        .with_geometry("geom")?;

        Ok(retag(out, Kind::Staypoints, self.validate_geometry()))
    }
}

impl Staypoints {
    /// Mean longitude and latitude of the staypoint points, `None` without any
    pub fn center(&self) -> Option<Point<f64>> {
        let points: Vec<Point<f64>> = self
            .frame()
            .geometries()?
            .iter()
            .filter_map(|g| match g {
                Some(Geometry::Point(p)) => Some(*p),
                _ => None,
            })
            .collect();
        if points.is_empty() {
            return None;
        }

        let n = points.len() as f64;
        let (x, y) = points
            .iter()
            .fold((0.0, 0.0), |(x, y), p| (x + p.x(), y + p.y()));

        Some(Point::new(x / n, y / n))
    }
}

/// Fixes `i..j` make a staypoint when `j` is the first fix farther than the
/// distance threshold from `i` and came after more than the time threshold
fn sliding(fixes: &[Fix], options: &StaypointOptions, out: &mut Vec<Staypoint>) {
    let mut i = 0;
    while i + 1 < fixes.len() {
        let anchor = &fixes[i];

        let left = (i + 1..fixes.len()).find(|j| {
            let p = fixes[*j].point;
            haversine_dist(anchor.point.x(), anchor.point.y(), p.x(), p.y()) > options.dist_threshold
        });
        let Some(j) = left else {
            break;
        };

        if fixes[j].at - anchor.at > options.time_threshold {
            let n = (j - i) as f64;
            let (x, y) = fixes[i..j]
                .iter()
                .fold((0.0, 0.0), |(x, y), f| (x + f.point.x(), y + f.point.y()));

            out.push(Staypoint {
                user_pos: anchor.pos,
                started_at: anchor.at,
                finished_at: fixes[j].at,
                point: Point::new(x / n, y / n),
            });
        }
        i = j;
    }
}
