//! GPX export

use std::collections::BTreeMap;

use geo::{Geometry, Point};
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use time::{Date, OffsetDateTime, UtcOffset};

use crate::analysis::timestamps;
use crate::frame::{Frame, Key};
use crate::model::{Positionfixes, Triplegs};
use crate::Result;

fn document(tracks: Vec<Track>) -> Gpx {
    let mut gpx: Gpx = Default::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some("trajframe".to_string());
    gpx.tracks = tracks;

    gpx
}

fn track(user: &Key) -> Track {
    let mut track = Track::new();
    track.name = Some(format!("user {}", user));
    track.description = Some(format!("Tracked by `{}`", user));

    track
}

/// Rows of every user, users in key order
fn by_user(frame: &Frame) -> Result<Vec<(Key, Vec<usize>)>> {
    Ok(frame
        .group_positions(&["user_id"])?
        .into_iter()
        .filter_map(|(mut key, positions)| key.pop().map(|k| (k, positions)))
        .collect())
}

/// One track per user, one segment per tripleg
///
/// The first and last waypoints of a segment carry the start and end time
/// of the tripleg.
pub fn triplegs_to_gpx(triplegs: &Triplegs) -> Result<Gpx> {
    let frame = triplegs.frame();
    let started = timestamps(frame, "started_at")?;
    let finished = timestamps(frame, "finished_at")?;
    let geometries = frame.geometries().unwrap_or_default();

    let mut tracks = vec![];
    for (user, mut positions) in by_user(frame)? {
        positions.sort_by_key(|p| started[*p]);

        let mut trk = track(&user);
        for pos in positions {
            let Some(Some(Geometry::LineString(line))) = geometries.get(pos) else {
                continue;
            };

            let mut tseg = TrackSegment::new();
            tseg.points = line.points().map(Waypoint::new).collect();

            if let (Some(first), Some(at)) = (tseg.points.first_mut(), started[pos]) {
                first.time = Some(at.into());
            }
            if let (Some(last), Some(at)) = (tseg.points.last_mut(), finished[pos]) {
                last.time = Some(at.into());
            }

            trk.segments.push(tseg);
        }
        tracks.push(trk);
    }

    Ok(document(tracks))
}

/// One track per user, one segment per UTC day, fixes in time order
pub fn positionfixes_to_gpx(positionfixes: &Positionfixes) -> Result<Gpx> {
    let frame = positionfixes.frame();
    let tracked = timestamps(frame, "tracked_at")?;
    let geometries = frame.geometries().unwrap_or_default();

    let mut tracks = vec![];
    for (user, positions) in by_user(frame)? {
        let mut fixes: Vec<(OffsetDateTime, Point<f64>)> = positions
            .into_iter()
            .filter_map(|pos| match (tracked[pos], geometries.get(pos)) {
                (Some(at), Some(Some(Geometry::Point(p)))) => Some((at, *p)),
                _ => None,
            })
            .collect();
        fixes.sort_by_key(|(at, _)| *at);

        let mut segs: BTreeMap<Date, TrackSegment> = BTreeMap::new();
        for (at, point) in fixes {
            let day = at.to_offset(UtcOffset::UTC).date();
            let tseg = segs.entry(day).or_insert_with(TrackSegment::new);

            let mut wp = Waypoint::new(point);
            wp.time = Some(at.into());
            tseg.points.push(wp);
        }

        let mut trk = track(&user);
        trk.segments = segs.into_values().collect();
        tracks.push(trk);
    }

    Ok(document(tracks))
}
