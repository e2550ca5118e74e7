//! Modal split of triplegs

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use arrow::array::Array;
use geo::Geometry;

use super::durations;
use crate::frame::{Column, DType, Frame};
use crate::geogr::haversine_length;
use crate::model::Triplegs;
use crate::{Error, Result};

/// Quantity summed per mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModalSplitMetric {
    /// Number of triplegs
    Count,
    /// Haversine length, meters
    Distance,
    /// Duration, seconds
    Duration,
}

impl FromStr for ModalSplitMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(ModalSplitMetric::Count),
            "distance" => Ok(ModalSplitMetric::Distance),
            "duration" => Ok(ModalSplitMetric::Duration),
            other => Err(Error::UnknownMethod {
                method: other.to_string(),
                purpose: "calculating the modal split",
            }),
        }
    }
}

impl Triplegs {
    /// Per user share of every transport mode
    ///
    /// Needs a `mode` column. The result has a `user_id` column and one
    /// column per mode, sorted by name; with `normalize` every row sums up
    /// to one.
    pub fn modal_split(&self, metric: ModalSplitMetric, normalize: bool) -> Result<Frame> {
        let frame = self.frame();
        let column = frame.column_or_err("mode")?;
        let Some(modes) = column.as_str() else {
            return Err(Error::DTypeMismatch {
                column: "mode".to_string(),
                expected: DType::Str.to_string(),
                found: column.dtype().to_string(),
            });
        };

        let values: Vec<f64> = match metric {
            ModalSplitMetric::Count => vec![1.0; frame.len()],
            ModalSplitMetric::Distance => {
                let geometries = frame.geometries().unwrap_or_default();
                (0..frame.len())
                    .map(|pos| match geometries.get(pos) {
                        Some(Some(Geometry::LineString(line))) => haversine_length(line),
                        _ => 0.0,
                    })
                    .collect()
            }
            ModalSplitMetric::Duration => durations(frame)?
                .into_iter()
                .map(|d| d.map_or(0.0, |d| d.as_seconds_f64()))
                .collect(),
        };

        let names: BTreeSet<&str> = modes.iter().flatten().collect();

        let groups = frame.group_positions(&["user_id"])?;
        let mut firsts = Vec::with_capacity(groups.len());
        let mut split: BTreeMap<&str, Vec<Option<f64>>> =
            names.iter().map(|m| (*m, vec![])).collect();

        for (_, positions) in &groups {
            firsts.push(positions[0]);

            let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
            for pos in positions {
                if modes.is_valid(*pos) {
                    *sums.entry(modes.value(*pos)).or_default() += values[*pos];
                }
            }
            let total: f64 = sums.values().sum();

            for (mode, column) in split.iter_mut() {
                let mut v = sums.get(mode).copied().unwrap_or_default();
                if normalize && total > 0.0 {
                    v /= total;
                }
                column.push(Some(v));
            }
        }

        let mut columns = vec![(
            "user_id".to_string(),
            frame.column_or_err("user_id")?.take(&firsts)?,
        )];
        for (mode, values) in split {
            columns.push((mode.to_string(), Column::from(values)));
        }

        Frame::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use geo::line_string;
    use time::macros::datetime;

    use super::*;
    use crate::frame::Value;

    fn triplegs() -> Result<Triplegs> {
        let frame = Frame::new(vec![
            ("user_id", Column::from(vec![2, 1, 1, 1])),
            (
                "started_at",
                Column::from(vec![
                    datetime!(2021-05-24 8:00 UTC),
                    datetime!(2021-05-24 9:00 UTC),
                    datetime!(2021-05-24 10:00 UTC),
                    datetime!(2021-05-24 11:00 UTC),
                ]),
            ),
            (
                "finished_at",
                Column::from(vec![
                    datetime!(2021-05-24 8:30 UTC),
                    datetime!(2021-05-24 9:30 UTC),
                    datetime!(2021-05-24 11:00 UTC),
                    datetime!(2021-05-24 11:30 UTC),
                ]),
            ),
            ("mode", Column::from(vec!["walk", "walk", "car", "walk"])),
            (
                "geom",
                Column::geometries(vec![
                    line_string![(x: 0., y: 0.), (x: 0.1, y: 0.)],
                    line_string![(x: 0., y: 0.), (x: 0.1, y: 0.)],
                    line_string![(x: 0., y: 0.), (x: 0.1, y: 0.)],
                    line_string![(x: 0., y: 0.), (x: 0.1, y: 0.)],
                ]),
            ),
        ])?
        .with_geometry("geom")?;

        Triplegs::new(frame)
    }

    #[test]
    fn count_split() -> Result<()> {
        let split = triplegs()?.modal_split(ModalSplitMetric::Count, false)?;

        assert_eq!(vec!["user_id", "car", "walk"], split.column_names());
        assert_eq!(Column::from(vec![1, 2]), split.column_or_err("user_id")?);
        assert_eq!(Column::from(vec![1.0, 0.0]), split.column_or_err("car")?);
        assert_eq!(Column::from(vec![2.0, 1.0]), split.column_or_err("walk")?);

        Ok(())
    }

    #[test]
    fn normalized_duration_split() -> Result<()> {
        let split = triplegs()?.modal_split(ModalSplitMetric::Duration, true)?;

        // user 1: 60 min walking, 60 min by car
        assert_eq!(Value::Float(0.5), split.column_or_err("car")?.get(0));
        assert_eq!(Value::Float(1.0), split.column_or_err("walk")?.get(1));

        Ok(())
    }

    #[test]
    fn needs_mode() -> Result<()> {
        let tpls: Triplegs = triplegs()?.drop(&["mode"])?.expect_view()?;

        assert!(matches!(
            tpls.modal_split(ModalSplitMetric::Count, false),
            Err(Error::ColumnNotFound(_))
        ));
        assert!("speed".parse::<ModalSplitMetric>().is_err());

        Ok(())
    }
}
