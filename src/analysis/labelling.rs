//! Activity flag and transport mode labelling

use std::str::FromStr;


use super::durations;
use crate::frame::Column;
use crate::model::{Staypoints, Triplegs};
use crate::{Error, Result};

/// How to decide whether a staypoint is an activity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityMethod {
    /// Staypoints lasting longer than the time threshold are activities
    TimeThreshold,
}

impl FromStr for ActivityMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "time_threshold" => Ok(ActivityMethod::TimeThreshold),
            other => Err(Error::UnknownMethod {
                method: other.to_string(),
                purpose: "creating activity flag",
            }),
        }
    }
}

/// How to predict the transport mode of triplegs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportModeMethod {
    /// Speed bands over the whole tripleg
    SimpleCoarse,
}

impl FromStr for TransportModeMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple-coarse" => Ok(TransportModeMethod::SimpleCoarse),
            other => Err(Error::UnknownMethod {
                method: other.to_string(),
                purpose: "predicting tripleg transport modes",
            }),
        }
    }
}

/// Ordered speed bands: `(upper bound in m/s, label)`
#[derive(Clone, Debug, PartialEq)]
pub struct SpeedCategories {
    bands: Vec<(f64, String)>,
}

impl SpeedCategories {
    /// Bands have to be given with strictly increasing upper bounds
    pub fn new(bands: Vec<(f64, String)>) -> Result<Self> {
        if bands.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(Error::UnorderedCategories);
        }

        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[(f64, String)] {
        &self.bands
    }

    /// Label of the first band whose upper bound exceeds `speed`
    pub fn classify(&self, speed: f64) -> Option<&str> {
        self.bands
            .iter()
            .find(|(bound, _)| speed < *bound)
            .map(|(_, label)| label.as_str())
    }
}

impl Default for SpeedCategories {
    /// slow (< 15 km/h), motorized (< 100 km/h) and fast mobility
    fn default() -> Self {
        Self {
            bands: vec![
                (15.0 / 3.6, "slow_mobility".to_string()),
                (100.0 / 3.6, "motorized_mobility".to_string()),
                (f64::INFINITY, "fast_mobility".to_string()),
            ],
        }
    }
}

impl Staypoints {
    /// Flag the staypoints considered an activity in the `column` column
    ///
    /// With [`ActivityMethod::TimeThreshold`] a staypoint is an activity when
    /// it lasts longer than `time_threshold` minutes.
    pub fn create_activity_flag(
        &self,
        method: ActivityMethod,
        time_threshold: f64,
        column: &str,
    ) -> Result<Staypoints> {
        let flags = match method {
            ActivityMethod::TimeThreshold => {
                let threshold = time_threshold * 60.0;
                durations(self.frame())?
                    .into_iter()
                    .map(|d| d.map(|d| d.as_seconds_f64() > threshold))
                    .collect::<Vec<_>>()
            }
        };

        self.derive_same(|f| f.with_column(column, Column::from(flags)))
    }
}

impl Triplegs {
    /// Predict the transport mode of every tripleg into a `mode` column
    pub fn predict_transport_mode(
        &self,
        method: TransportModeMethod,
        categories: &SpeedCategories,
    ) -> Result<Triplegs> {
        let modes = match method {
            TransportModeMethod::SimpleCoarse => self
                .speeds()?
                .into_iter()
                .map(|speed| {
                    speed
                        .and_then(|s| categories.classify(s))
                        .map(str::to_string)
                })
                .collect::<Vec<Option<String>>>(),
        };

        self.derive_same(|f| f.with_column("mode", Column::from(modes)))
    }
}

#[cfg(test)]
mod tests {
    use geo::{line_string, Point};
    use time::macros::datetime;

    use super::*;
    use crate::frame::{Frame, Value};
    use crate::geogr::meters_to_decimal_degrees;

    #[test]
    fn default_bands() {
        let categories = SpeedCategories::default();

        let modes: Vec<Option<&str>> = [2.0, 5.0, 30.0, 200.0]
            .iter()
            .map(|s| categories.classify(*s))
            .collect();
        assert_eq!(
            vec![
                Some("slow_mobility"),
                Some("motorized_mobility"),
                Some("fast_mobility"),
                Some("fast_mobility")
            ],
            modes
        );
        assert_eq!(None, categories.classify(f64::NAN));
    }

    #[test]
    fn bands_must_increase() {
        let res = SpeedCategories::new(vec![
            (10.0, "a".to_string()),
            (10.0, "b".to_string()),
        ]);
        assert!(matches!(res, Err(Error::UnorderedCategories)));

        let res = SpeedCategories::new(vec![(10.0, "a".to_string()), (5.0, "b".to_string())]);
        assert!(matches!(res, Err(Error::UnorderedCategories)));
    }

    #[test]
    fn unknown_methods() {
        assert!(matches!(
            "random".parse::<TransportModeMethod>(),
            Err(Error::UnknownMethod { .. })
        ));
        assert_eq!(
            "Method nope not known for creating activity flag",
            "nope".parse::<ActivityMethod>().unwrap_err().to_string()
        );
    }

    fn staypoints() -> Result<Staypoints> {
        let frame = Frame::new(vec![
            ("user_id", Column::from(vec![1, 1])),
            (
                "started_at",
                Column::from(vec![
                    datetime!(2021-05-24 8:00 UTC),
                    datetime!(2021-05-24 9:00 UTC),
                ]),
            ),
            (
                "finished_at",
                Column::from(vec![
                    datetime!(2021-05-24 8:20 UTC),
                    datetime!(2021-05-24 9:10 UTC),
                ]),
            ),
            (
                "geom",
                Column::geometries(vec![Point::new(8.5, 47.3), Point::new(8.6, 47.3)]),
            ),
        ])?
        .with_geometry("geom")?;

        Staypoints::new(frame)
    }

    #[test]
    fn activity_flag() -> Result<()> {
        let sp = staypoints()?.create_activity_flag(ActivityMethod::TimeThreshold, 15.0, "is_activity")?;
        assert_eq!(
            Some(Column::from(vec![true, false])),
            sp.column("is_activity")
        );

        Ok(())
    }

    #[test]
    fn activity_flag_with_unbounded_threshold() -> Result<()> {
        let sp = staypoints()?;

        let flagged = sp.create_activity_flag(ActivityMethod::TimeThreshold, f64::INFINITY, "a")?;
        assert_eq!(Some(Column::from(vec![false, false])), flagged.column("a"));

        let flagged = sp.create_activity_flag(ActivityMethod::TimeThreshold, f64::NAN, "a")?;
        assert_eq!(Some(Column::from(vec![false, false])), flagged.column("a"));

        // a negative threshold makes every staypoint an activity
        let flagged = sp.create_activity_flag(ActivityMethod::TimeThreshold, -1.0, "a")?;
        assert_eq!(Some(Column::from(vec![true, true])), flagged.column("a"));

        Ok(())
    }

    #[test]
    fn transport_modes() -> Result<()> {
        // one hour per leg, lengths set to 2, 30 and 200 m/s along the equator
        let lengths = [2.0 * 3600.0, 30.0 * 3600.0, 200.0 * 3600.0];
        let lines: Vec<_> = lengths
            .iter()
            .map(|m| {
                let deg = meters_to_decimal_degrees(*m, 0.0);
                line_string![(x: 0., y: 0.), (x: deg, y: 0.)]
            })
            .collect();

        let frame = Frame::new(vec![
            ("user_id", Column::from(vec![1, 1, 1])),
            (
                "started_at",
                Column::from(vec![
                    datetime!(2021-05-24 8:00 UTC),
                    datetime!(2021-05-24 9:00 UTC),
                    datetime!(2021-05-24 10:00 UTC),
                ]),
            ),
            (
                "finished_at",
                Column::from(vec![
                    datetime!(2021-05-24 9:00 UTC),
                    datetime!(2021-05-24 10:00 UTC),
                    datetime!(2021-05-24 11:00 UTC),
                ]),
            ),
            ("geom", Column::geometries(lines)),
        ])?
        .with_geometry("geom")?;
        let tpls = Triplegs::new(frame)?;

        let tpls =
            tpls.predict_transport_mode(TransportModeMethod::SimpleCoarse, &SpeedCategories::default())?;
        let modes = tpls.column("mode").map(|c| (0..3).map(|i| c.get(i)).collect::<Vec<_>>());
        assert_eq!(
            Some(vec![
                Value::Str("slow_mobility".to_string()),
                Value::Str("fast_mobility".to_string()),
                Value::Str("fast_mobility".to_string()),
            ]),
            modes
        );

        Ok(())
    }
}
