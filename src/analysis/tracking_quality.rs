//! Temporal tracking quality: how much of the observed time is covered by records

use std::collections::BTreeMap;
use std::str::FromStr;

use time::{Date, Duration, OffsetDateTime, UtcOffset};

use super::timestamps;
use crate::frame::{Column, Frame, Key};
use crate::model::{Staypoints, Triplegs};
use crate::{Error, Result};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Period the quality is computed over
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    /// Whole tracking period of every user
    All,
    /// Every UTC day
    Day,
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Granularity::All),
            "day" => Ok(Granularity::Day),
            other => Err(Error::UnknownMethod {
                method: other.to_string(),
                purpose: "temporal tracking quality granularity",
            }),
        }
    }
}

/// Share of time covered by the records of every user
///
/// Works on any table with `user_id`, `started_at` and `finished_at`, so
/// staypoints and triplegs can be concatenated before. With
/// [`Granularity::All`] the result has `user_id` and `quality` columns, with
/// [`Granularity::Day`] there is an extra `day` column holding the UTC
/// midnight of the day.
pub fn temporal_tracking_quality(frame: &Frame, granularity: Granularity) -> Result<Frame> {
    let started = timestamps(frame, "started_at")?;
    let finished = timestamps(frame, "finished_at")?;
    let users = frame.column_or_err("user_id")?;

    match granularity {
        Granularity::All => {
            let groups = frame.group_positions(&["user_id"])?;

            let mut firsts = vec![];
            let mut quality = vec![];
            for (_, positions) in &groups {
                firsts.push(positions[0]);

                let mut recorded = Duration::ZERO;
                let mut first: Option<OffsetDateTime> = None;
                let mut last: Option<OffsetDateTime> = None;
                for pos in positions {
                    let (Some(s), Some(f)) = (started[*pos], finished[*pos]) else {
                        continue;
                    };
                    recorded += f - s;
                    first = Some(first.map_or(s, |v| v.min(s)));
                    last = Some(last.map_or(f, |v| v.max(f)));
                }

                let span = match (first, last) {
                    (Some(first), Some(last)) => last - first,
                    _ => Duration::ZERO,
                };
                quality.push(if span.is_positive() {
                    Some(recorded.as_seconds_f64() / span.as_seconds_f64())
                } else {
                    None
                });
            }

            Frame::new(vec![
                ("user_id", users.take(&firsts)?),
                ("quality", Column::from(quality)),
            ])
        }
        Granularity::Day => {
            // (user, day) -> (a row of the user, recorded seconds)
            let mut days: BTreeMap<(Key, Date), (usize, f64)> = BTreeMap::new();

            for pos in 0..frame.len() {
                let (Some(user), Some(s), Some(f)) = (users.key(pos), started[pos], finished[pos])
                else {
                    continue;
                };
                for (day, secs) in split_by_day(s, f) {
                    let entry = days.entry((user.clone(), day)).or_insert((pos, 0.0));
                    entry.1 += secs;
                }
            }

            let mut positions = vec![];
            let mut midnights = vec![];
            let mut quality = vec![];
            for ((_, day), (pos, secs)) in days {
                positions.push(pos);
                midnights.push(Some(day.midnight().assume_utc()));
                quality.push(Some(secs / SECONDS_PER_DAY));
            }

            Frame::new(vec![
                ("user_id", users.take(&positions)?),
                ("day", Column::from(midnights)),
                ("quality", Column::from(quality)),
            ])
        }
    }
}

/// Seconds of `[start, end)` falling in every UTC day
fn split_by_day(start: OffsetDateTime, end: OffsetDateTime) -> Vec<(Date, f64)> {
    let start = start.to_offset(UtcOffset::UTC);
    let end = end.to_offset(UtcOffset::UTC);

    let mut out = vec![];
    let mut day = start.date();
    while day <= end.date() {
        let from = day.midnight().assume_utc().max(start);
        let to = match day.next_day() {
            Some(next) => next.midnight().assume_utc().min(end),
            None => end,
        };
        if to > from {
            out.push((day, (to - from).as_seconds_f64()));
        }

        match day.next_day() {
            Some(next) => day = next,
            None => break,
        }
    }

    out
}

impl Triplegs {
    pub fn temporal_tracking_quality(&self, granularity: Granularity) -> Result<Frame> {
        temporal_tracking_quality(self.frame(), granularity)
    }
}

impl Staypoints {
    pub fn temporal_tracking_quality(&self, granularity: Granularity) -> Result<Frame> {
        temporal_tracking_quality(self.frame(), granularity)
    }
}
