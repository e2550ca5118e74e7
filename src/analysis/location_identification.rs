//! Home and work location identification on staypoints

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use time::{Duration, OffsetDateTime, Weekday};
use tracing::warn;

use super::timestamps;
use crate::frame::{Column, Frame, Key};
use crate::model::Staypoints;
use crate::{Error, Result};

/// Labelling strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocationMethod {
    /// Longest visited location is `home`, the second one `work`
    Freq,
    /// Weekday time frames: rest and leisure vote for `home`, work hours
    /// for `work`
    Osna,
}

impl FromStr for LocationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FREQ" => Ok(LocationMethod::Freq),
            "OSNA" => Ok(LocationMethod::Osna),
            other => Err(Error::UnknownMethod {
                method: other.to_string(),
                purpose: "identifying locations",
            }),
        }
    }
}

/// Level locations are aggregated on by the pre filter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggLevel {
    /// A location is judged separately for every user
    User,
    /// A location is judged over all users
    Dataset,
}

impl FromStr for AggLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(AggLevel::User),
            "dataset" => Ok(AggLevel::Dataset),
            other => Err(Error::UnknownMethod {
                method: other.to_string(),
                purpose: "aggregating locations",
            }),
        }
    }
}

/// Thresholds excluding users and locations without enough data
///
/// A zero threshold disables the check.
#[derive(Clone, Debug, PartialEq)]
pub struct PreFilter {
    pub agg_level: AggLevel,
    /// Minimum distinct staypoints of a user
    pub thresh_sp: usize,
    /// Minimum distinct locations of a user
    pub thresh_loc: usize,
    /// Minimum staypoints at a location
    pub thresh_sp_at_loc: usize,
    /// Minimum time spent at a location
    pub thresh_loc_time: Duration,
    /// Minimum span from the first to the last visit of a location
    pub thresh_loc_period: Duration,
}

impl Default for PreFilter {
    fn default() -> Self {
        Self {
            agg_level: AggLevel::User,
            thresh_sp: 10,
            thresh_loc: 10,
            thresh_sp_at_loc: 10,
            thresh_loc_time: Duration::hours(1),
            thresh_loc_period: Duration::hours(5),
        }
    }
}

#[derive(Default)]
struct UserStats {
    started: BTreeSet<OffsetDateTime>,
    locations: BTreeSet<Key>,
}

#[derive(Default)]
struct LocationStats {
    count: usize,
    duration: Duration,
    first: Option<OffsetDateTime>,
    last: Option<OffsetDateTime>,
}

/// Weekday time frame a staypoint falls in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimeFrame {
    Rest,
    Work,
    Leisure,
}

impl TimeFrame {
    fn of(at: OffsetDateTime) -> Option<TimeFrame> {
        if matches!(at.weekday(), Weekday::Saturday | Weekday::Sunday) {
            return None;
        }

        Some(match at.hour() {
            2..=7 => TimeFrame::Rest,
            8..=18 => TimeFrame::Work,
            _ => TimeFrame::Leisure,
        })
    }

    fn weight(&self) -> f64 {
        match self {
            TimeFrame::Rest => 0.739,
            TimeFrame::Work => 1.0,
            TimeFrame::Leisure => 0.358,
        }
    }
}

/// Columns the identification works on
struct Visits {
    users: Column,
    locations: Column,
    started: Vec<Option<OffsetDateTime>>,
    finished: Vec<Option<OffsetDateTime>>,
}

impl Visits {
    fn of(frame: &Frame) -> Result<Self> {
        let locations = frame.column("location_id").ok_or_else(|| {
            Error::ColumnNotFound(format!(
                "location_id, needed to derive activity labels, columns are [{}]",
                frame.column_names().join(", ")
            ))
        })?;

        Ok(Self {
            users: frame.column_or_err("user_id")?,
            locations,
            started: timestamps(frame, "started_at")?,
            finished: timestamps(frame, "finished_at")?,
        })
    }

    fn len(&self) -> usize {
        self.started.len()
    }

    fn duration(&self, pos: usize) -> Option<Duration> {
        match (self.started[pos], self.finished[pos]) {
            (Some(s), Some(f)) => Some(f - s),
            _ => None,
        }
    }
}

impl Staypoints {
    /// Mask of the staypoints whose user and location have enough data
    ///
    /// Staypoints without a location never pass.
    pub fn pre_filter_locations(&self, filter: &PreFilter) -> Result<Vec<bool>> {
        let visits = Visits::of(self.frame())?;

        let mut users: HashMap<Key, UserStats> = HashMap::new();
        let mut locations: HashMap<Vec<Key>, LocationStats> = HashMap::new();
        let mut location_keys = Vec::with_capacity(visits.len());

        for pos in 0..visits.len() {
            let user = visits.users.key(pos);
            let location = visits.locations.key(pos);

            if let Some(user) = &user {
                let stats = users.entry(user.clone()).or_default();
                if let Some(s) = visits.started[pos] {
                    stats.started.insert(s);
                }
                if let Some(location) = &location {
                    stats.locations.insert(location.clone());
                }
            }

            let key = match (filter.agg_level, user, location) {
                (_, _, None) => None,
                (AggLevel::User, Some(user), Some(location)) => Some(vec![user, location]),
                (AggLevel::User, None, Some(_)) => None,
                (AggLevel::Dataset, _, Some(location)) => Some(vec![location]),
            };

            if let Some(key) = &key {
                let stats = locations.entry(key.clone()).or_default();
                if visits.started[pos].is_some() {
                    stats.count += 1;
                }
                if let Some(d) = visits.duration(pos) {
                    stats.duration += d;
                }
                if let Some(s) = visits.started[pos] {
                    stats.first = Some(stats.first.map_or(s, |v| v.min(s)));
                }
                if let Some(f) = visits.finished[pos] {
                    stats.last = Some(stats.last.map_or(f, |v| v.max(f)));
                }
            }
            location_keys.push(key);
        }

        let user_ok = |user: &Key| {
            users.get(user).map_or(false, |stats| {
                stats.started.len() >= filter.thresh_sp
                    && stats.locations.len() >= filter.thresh_loc
            })
        };
        let location_ok = |key: &Vec<Key>| {
            locations.get(key).map_or(false, |stats| {
                let period = match (stats.first, stats.last) {
                    (Some(first), Some(last)) => last - first,
                    _ => Duration::ZERO,
                };
                stats.count >= filter.thresh_sp_at_loc
                    && stats.duration >= filter.thresh_loc_time
                    && period >= filter.thresh_loc_period
            })
        };

        Ok(location_keys
            .iter()
            .enumerate()
            .map(|(pos, key)| {
                let user = visits.users.key(pos);
                match (user, key) {
                    (Some(user), Some(key)) => user_ok(&user) && location_ok(key),
                    _ => false,
                }
            })
            .collect())
    }

    /// Label the `home` and `work` locations of every user into a `purpose`
    /// column
    ///
    /// Needs a `location_id` column. With a pre filter, staypoints failing it
    /// take no part and get no purpose.
    pub fn identify_locations(
        &self,
        method: LocationMethod,
        pre_filter: Option<&PreFilter>,
    ) -> Result<Staypoints> {
        let visits = Visits::of(self.frame())?;
        let mask = match pre_filter {
            Some(filter) => self.pre_filter_locations(filter)?,
            None => vec![true; visits.len()],
        };

        let labels = match method {
            LocationMethod::Freq => freq(&visits, &mask),
            LocationMethod::Osna => osna(&visits, &mask),
        };

        let purpose = (0..visits.len())
            .map(|pos| {
                if !mask[pos] {
                    return None;
                }
                let key = (visits.users.key(pos)?, visits.locations.key(pos)?);
                labels.get(&key).map(|l| l.to_string())
            })
            .collect::<Vec<Option<String>>>();

        self.derive_same(|f| f.with_column("purpose", Column::from(purpose)))
    }
}

type Labels = HashMap<(Key, Key), &'static str>;

/// Per user, the location with the longest total stay is home, the second
/// one work
fn freq(visits: &Visits, mask: &[bool]) -> Labels {
    let mut spent: BTreeMap<Key, BTreeMap<Key, Duration>> = BTreeMap::new();
    for pos in (0..visits.len()).filter(|p| mask[*p]) {
        let (Some(user), Some(location)) = (visits.users.key(pos), visits.locations.key(pos)) else {
            continue;
        };
        let duration = visits.duration(pos).unwrap_or_default();
        *spent.entry(user).or_default().entry(location).or_default() += duration;
    }

    let mut labels = Labels::new();
    for (user, locations) in spent {
        let mut ranked: Vec<(Key, Duration)> = locations.into_iter().collect();
        // stable: equal durations keep location order
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        for ((location, _), label) in ranked.into_iter().zip(["home", "work"]) {
            labels.insert((user.clone(), location), label);
        }
    }

    labels
}

#[derive(Default)]
struct Scores {
    home: Option<f64>,
    work: Option<f64>,
}

/// Weighted weekday time frames: rest and leisure score the home, work hours
/// the work location
fn osna(visits: &Visits, mask: &[bool]) -> Labels {
    let mut scores: BTreeMap<Key, BTreeMap<Key, Scores>> = BTreeMap::new();

    for pos in (0..visits.len()).filter(|p| mask[*p]) {
        let (Some(user), Some(location), Some(started), Some(duration)) = (
            visits.users.key(pos),
            visits.locations.key(pos),
            visits.started[pos],
            visits.duration(pos),
        ) else {
            continue;
        };

        let Some(timeframe) = TimeFrame::of(started + duration / 2) else {
            continue;
        };
        let weighted = duration.as_seconds_f64() * timeframe.weight();

        let entry = scores.entry(user).or_default().entry(location).or_default();
        let score = match timeframe {
            TimeFrame::Work => &mut entry.work,
            TimeFrame::Rest | TimeFrame::Leisure => &mut entry.home,
        };
        *score = Some(score.unwrap_or_default() + weighted);
    }

    let mut labels = Labels::new();
    if scores.is_empty() {
        warn!("No weekday staypoints for the OSNA method, no purpose assigned");
        return labels;
    }

    for (user, locations) in scores {
        let home = best(locations.iter().filter_map(|(l, s)| s.home.map(|v| (l, v))));
        let work = best(
            locations
                .iter()
                .filter(|(l, _)| Some(*l) != home)
                .filter_map(|(l, s)| s.work.map(|v| (l, v))),
        );

        if let Some(work) = work {
            labels.insert((user.clone(), work.clone()), "work");
        }
        if let Some(home) = home {
            labels.insert((user.clone(), home.clone()), "home");
        }
    }

    labels
}

/// Location with the highest score, the first one on ties
fn best<'a>(scores: impl Iterator<Item = (&'a Key, f64)>) -> Option<&'a Key> {
    let mut out: Option<(&Key, f64)> = None;
    for (location, score) in scores {
        if out.map_or(true, |(_, max)| score > max) {
            out = Some((location, score));
        }
    }

    out.map(|(location, _)| location)
}

#[cfg(test)]
mod tests {
    use geo::Point;
    use time::macros::datetime;

    use super::*;
    use crate::frame::Value;

    /// `(user, location, started, finished)`
    fn staypoints(rows: &[(i64, Option<i64>, OffsetDateTime, OffsetDateTime)]) -> Result<Staypoints> {
        let frame = Frame::new(vec![
            ("user_id", Column::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
            ("location_id", Column::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
            ("started_at", Column::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
            ("finished_at", Column::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())),
            (
                "geom",
                Column::geometries(rows.iter().map(|_| Point::new(8.5, 47.3))),
            ),
        ])?
        .with_geometry("geom")?;

        Staypoints::new(frame)
    }

    fn purposes(sp: &Staypoints) -> Vec<Value> {
        sp.column("purpose")
            .map(|c| (0..c.len()).map(|i| c.get(i)).collect())
            .unwrap_or_default()
    }

    fn label(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    #[test]
    fn freq_labels_longest_stays() -> Result<()> {
        let sp = staypoints(&[
            (0, Some(1), datetime!(2021-05-24 0:00 UTC), datetime!(2021-05-24 1:00 UTC)),
            (0, Some(2), datetime!(2021-05-24 2:00 UTC), datetime!(2021-05-24 6:00 UTC)),
            (0, Some(3), datetime!(2021-05-24 7:00 UTC), datetime!(2021-05-24 9:00 UTC)),
            (0, Some(1), datetime!(2021-05-24 10:00 UTC), datetime!(2021-05-24 11:30 UTC)),
            (1, Some(1), datetime!(2021-05-24 0:00 UTC), datetime!(2021-05-24 1:00 UTC)),
            (1, None, datetime!(2021-05-24 2:00 UTC), datetime!(2021-05-24 9:00 UTC)),
        ])?;

        let sp = sp.identify_locations(LocationMethod::Freq, None)?;
        assert_eq!(
            vec![
                label("work"),
                label("home"),
                Value::Null,
                label("work"),
                label("home"),
                Value::Null
            ],
            purposes(&sp)
        );

        Ok(())
    }

    #[test]
    fn osna_uses_weekday_frames() -> Result<()> {
        // 2021-05-24 is a monday
        let sp = staypoints(&[
            // night at 1: rest
            (0, Some(1), datetime!(2021-05-24 1:00 UTC), datetime!(2021-05-24 7:00 UTC)),
            // office hours at 2: work
            (0, Some(2), datetime!(2021-05-24 9:00 UTC), datetime!(2021-05-24 17:00 UTC)),
            // long evening at 3: leisure, below the weighted rest
            (0, Some(3), datetime!(2021-05-24 19:00 UTC), datetime!(2021-05-24 23:00 UTC)),
            // saturday at 2 does not count
            (0, Some(3), datetime!(2021-05-29 9:00 UTC), datetime!(2021-05-29 23:00 UTC)),
        ])?;

        let sp = sp.identify_locations(LocationMethod::Osna, None)?;
        assert_eq!(
            vec![label("home"), label("work"), Value::Null, Value::Null],
            purposes(&sp)
        );

        Ok(())
    }

    #[test]
    fn osna_work_is_not_home() -> Result<()> {
        let sp = staypoints(&[
            (0, Some(1), datetime!(2021-05-24 1:00 UTC), datetime!(2021-05-24 7:00 UTC)),
            (0, Some(1), datetime!(2021-05-24 9:00 UTC), datetime!(2021-05-24 17:00 UTC)),
            (0, Some(2), datetime!(2021-05-25 9:00 UTC), datetime!(2021-05-25 10:00 UTC)),
        ])?;

        let sp = sp.identify_locations(LocationMethod::Osna, None)?;
        assert_eq!(
            vec![label("home"), label("home"), label("work")],
            purposes(&sp)
        );

        Ok(())
    }

    #[test]
    fn osna_weekend_only() -> Result<()> {
        let sp = staypoints(&[(
            0,
            Some(1),
            datetime!(2021-05-29 1:00 UTC),
            datetime!(2021-05-29 7:00 UTC),
        )])?;

        let sp = sp.identify_locations(LocationMethod::Osna, None)?;
        assert_eq!(vec![Value::Null], purposes(&sp));

        Ok(())
    }

    #[test]
    fn pre_filter() -> Result<()> {
        let sp = staypoints(&[
            (0, Some(1), datetime!(2021-05-24 0:00 UTC), datetime!(2021-05-24 1:00 UTC)),
            (0, Some(1), datetime!(2021-05-24 5:00 UTC), datetime!(2021-05-24 6:00 UTC)),
            (0, Some(2), datetime!(2021-05-24 7:00 UTC), datetime!(2021-05-24 7:30 UTC)),
            (0, None, datetime!(2021-05-24 8:00 UTC), datetime!(2021-05-24 9:00 UTC)),
            (1, Some(1), datetime!(2021-05-24 0:00 UTC), datetime!(2021-05-24 9:00 UTC)),
        ])?;

        let filter = PreFilter {
            agg_level: AggLevel::User,
            thresh_sp: 2,
            thresh_loc: 2,
            thresh_sp_at_loc: 2,
            thresh_loc_time: Duration::hours(1),
            thresh_loc_period: Duration::hours(5),
        };
        // location 2 has one visit only, user 1 too little data
        assert_eq!(
            vec![true, true, false, false, false],
            sp.pre_filter_locations(&filter)?
        );

        let filter = PreFilter {
            agg_level: AggLevel::Dataset,
            thresh_sp: 0,
            thresh_loc: 0,
            ..filter
        };
        assert_eq!(
            vec![true, true, false, false, true],
            sp.pre_filter_locations(&filter)?
        );

        let labelled = sp.identify_locations(LocationMethod::Freq, Some(&filter))?;
        assert_eq!(label("home"), purposes(&labelled)[0]);
        assert_eq!(Value::Null, purposes(&labelled)[2]);

        Ok(())
    }

    #[test]
    fn needs_location_id() -> Result<()> {
        let sp: Staypoints = staypoints(&[(
            0,
            Some(1),
            datetime!(2021-05-24 0:00 UTC),
            datetime!(2021-05-24 1:00 UTC),
        )])?
        .drop(&["location_id"])?
        .expect_view()?;

        assert!(matches!(
            sp.identify_locations(LocationMethod::Freq, None),
            Err(Error::ColumnNotFound(_))
        ));
        assert!("home".parse::<LocationMethod>().is_err());

        Ok(())
    }
}
