//! Tour generation: chains of trips that come back to where they started

use std::collections::HashMap;

use geo::{Geometry, Point};
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::analysis::timestamps;
use crate::frame::{Column, Frame, Key};
use crate::geogr::haversine_dist;
use crate::model::{retag, Kind, Tagged, Trips};
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct TourOptions {
    /// Farthest a tour may end from its start, meters; unused when locations
    /// are given
    pub max_dist: f64,
    /// Longest a tour may last, start of its first trip to end of its last
    pub max_time: Duration,
    /// Spatial gaps allowed between consecutive trips of a tour
    pub max_nr_gaps: usize,
}

impl Default for TourOptions {
    fn default() -> Self {
        Self {
            max_dist: 100.0,
            max_time: Duration::days(1),
            max_nr_gaps: 0,
        }
    }
}

/// Where a trip starts or ends
#[derive(Clone, Debug, PartialEq)]
enum Place {
    Location(Key),
    Point(Point<f64>),
}

struct Leg {
    pos: usize,
    started: OffsetDateTime,
    finished: OffsetDateTime,
    origin: Option<Place>,
    destination: Option<Place>,
}

fn same_place(a: &Option<Place>, b: &Option<Place>, max_dist: f64) -> bool {
    match (a, b) {
        (Some(Place::Location(a)), Some(Place::Location(b))) => a == b,
        (Some(Place::Point(a)), Some(Place::Point(b))) => {
            haversine_dist(a.x(), a.y(), b.x(), b.y()) <= max_dist
        }
        _ => false,
    }
}

/// Staypoint positions by staypoint id, with their locations
struct StaypointLocations {
    positions: HashMap<i64, usize>,
    locations: Column,
}

impl StaypointLocations {
    fn of(frame: &Frame) -> Result<Self> {
        let locations = frame.column("location_id").ok_or_else(|| {
            Error::ColumnNotFound(format!(
                "location_id, needed to assign tour locations, columns are [{}]",
                frame.column_names().join(", ")
            ))
        })?;
        let positions = frame
            .index()
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();

        Ok(Self {
            positions,
            locations,
        })
    }

    fn position(&self, staypoint: Option<Key>) -> Option<usize> {
        match staypoint? {
            Key::Int(id) => self.positions.get(&id).copied(),
            _ => None,
        }
    }

    fn place(&self, staypoint: Option<Key>) -> Option<Place> {
        self.position(staypoint)
            .and_then(|pos| self.locations.key(pos))
            .map(Place::Location)
    }
}

impl Trips {
    /// Find the tours of every user
    ///
    /// A tour is a sequence of trips of one user whose last destination is
    /// the first origin: the same location when `staypoints` with a
    /// `location_id` column are given, within `max_dist` meters of the trip
    /// geometries' origin and destination points otherwise. Tours last at
    /// most `max_time` and have at most `max_nr_gaps` trips that don't start
    /// where the previous one ended. A trip is part of at most one tour;
    /// nested tours are found first.
    ///
    /// Returns the trips with a `tour_id` column and the tours, labelled by
    /// tour id. Without a single tour the tours are a generic empty table.
    pub fn generate_tours(
        &self,
        options: &TourOptions,
        staypoints: Option<&Frame>,
    ) -> Result<(Trips, Tagged)> {
        let frame = self.frame();
        let started = timestamps(frame, "started_at")?;
        let finished = timestamps(frame, "finished_at")?;
        let origins = frame.column_or_err("origin_staypoint_id")?;
        let destinations = frame.column_or_err("destination_staypoint_id")?;
        let locations = staypoints.map(StaypointLocations::of).transpose()?;
        let geometries = frame.geometries().unwrap_or_default();

        let place = |pos: usize, origin: bool| -> Option<Place> {
            match &locations {
                Some(locations) => {
                    let staypoints = if origin { &origins } else { &destinations };
                    locations.place(staypoints.key(pos))
                }
                None => match geometries.get(pos) {
                    Some(Some(Geometry::MultiPoint(points))) if points.0.len() == 2 => {
                        let point = if origin { points.0[0] } else { points.0[1] };
                        Some(Place::Point(point))
                    }
                    _ => None,
                },
            }
        };

        let mut tours: Vec<Vec<usize>> = vec![];
        for (_, positions) in frame.group_positions(&["user_id"])? {
            let mut legs: Vec<Leg> = positions
                .into_iter()
                .filter_map(|pos| {
                    Some(Leg {
                        pos,
                        started: started[pos]?,
                        finished: finished[pos]?,
                        origin: place(pos, true),
                        destination: place(pos, false),
                    })
                })
                .collect();
            legs.sort_by_key(|l| (l.started, l.pos));

            tours.extend(
                user_tours(&legs, options)
                    .into_iter()
                    .map(|tour| tour.into_iter().map(|i| legs[i].pos).collect()),
            );
        }

        info!("Generated {} tours from {} trips", tours.len(), frame.len());

        let mut tour_ids = vec![None; frame.len()];
        for (id, tour) in tours.iter().enumerate() {
            for pos in tour {
                tour_ids[*pos] = Some(id as i64);
            }
        }
        let trips = self.derive_same(|f| f.with_column("tour_id", Column::from(tour_ids)))?;

        let firsts: Vec<usize> = tours.iter().filter_map(|t| t.first().copied()).collect();
        let lasts: Vec<usize> = tours.iter().filter_map(|t| t.last().copied()).collect();

        let mut columns = vec![
            ("user_id", frame.column_or_err("user_id")?.take(&firsts)?),
            (
                "started_at",
                Column::from(firsts.iter().map(|p| started[*p]).collect::<Vec<_>>()),
            ),
            (
                "finished_at",
                Column::from(lasts.iter().map(|p| finished[*p]).collect::<Vec<_>>()),
            ),
            ("origin_staypoint_id", origins.take(&firsts)?),
            ("destination_staypoint_id", destinations.take(&lasts)?),
        ];
        if let Some(locations) = &locations {
            let at: Vec<Option<usize>> = firsts
                .iter()
                .map(|p| locations.position(origins.key(*p)))
                .collect();
            columns.push(("location_id", locations.locations.gather(&at)?));
        }

        let tours = Frame::new(columns)?;

        Ok((trips, retag(tours, Kind::Tours, self.validate_geometry())))
    }
}

/// Tours of one user's legs in time order, as leg indices
fn user_tours(legs: &[Leg], options: &TourOptions) -> Vec<Vec<usize>> {
    let mut tours = vec![];
    let mut candidates: Vec<usize> = vec![];

    for (i, end) in legs.iter().enumerate() {
        candidates.push(i);

        let closes = |k: usize| {
            let members = &candidates[k..];
            let start = &legs[members[0]];

            let gaps = members
                .windows(2)
                .filter(|w| {
                    !same_place(
                        &legs[w[0]].destination,
                        &legs[w[1]].origin,
                        options.max_dist,
                    )
                })
                .count();

            same_place(&start.origin, &end.destination, options.max_dist)
                && end.finished - start.started <= options.max_time
                && gaps <= options.max_nr_gaps
        };

        // the earliest start makes the longest tour
        if let Some(k) = (0..candidates.len()).find(|k| closes(*k)) {
            tours.push(candidates.split_off(k));
        }
    }

    tours
}
