//! Typed views over the generic [`Frame`]
//!
//! A [`View`] tags a table with the domain entity it holds (triplegs,
//! staypoints, ...). Construction validates the entity's [`Contract`] and
//! fails with a structural error; derivations never fail on the contract,
//! they re-tag their result instead:
//!
//! 1. non-tabular results (rows, columns, scalars) are returned untouched;
//! 2. tables that still meet the contract keep the view;
//! 3. otherwise the [`Kind::fallback`] chain is tried;
//! 4. when nothing holds the result is a generic table.
//!
//! Degradation is one-directional, a generic table is never promoted back
//! on its own.

use std::fmt;
use std::marker::PhantomData;

use crate::frame::{Column, Frame, Row};
use crate::{Error, Result};

mod contract;
mod registry;
mod retag;

#[cfg(test)]
mod tests;

pub use contract::{Contract, GeometryType};
pub use registry::{Factory, Registry};
pub use retag::{retag, Retag, Tag, Tagged};

/// The typed views known to the crate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Positionfixes,
    Staypoints,
    Triplegs,
    /// Triplegs without geometry
    TriplegsTable,
    Trips,
    /// Trips without geometry
    TripsTable,
    Locations,
    Tours,
}

const USER_TIMES: &[&str] = &["user_id", "started_at", "finished_at"];
const TIMES: &[&str] = &["started_at", "finished_at"];
const TRIPS: &[&str] = &[
    "user_id",
    "started_at",
    "finished_at",
    "origin_staypoint_id",
    "destination_staypoint_id",
];

impl Kind {
    pub fn name(&self) -> &'static str {
        self.contract().entity
    }

    pub fn contract(&self) -> Contract {
        match self {
            Kind::Positionfixes => Contract {
                entity: "positionfixes",
                required: &["user_id", "tracked_at"],
                timestamps: &["tracked_at"],
                geometry: Some(GeometryType::Point),
            },
            Kind::Staypoints => Contract {
                entity: "staypoints",
                required: USER_TIMES,
                timestamps: TIMES,
                geometry: Some(GeometryType::Point),
            },
            Kind::Triplegs => Contract {
                entity: "triplegs",
                required: USER_TIMES,
                timestamps: TIMES,
                geometry: Some(GeometryType::LineString),
            },
            Kind::TriplegsTable => Contract {
                entity: "triplegs table",
                required: USER_TIMES,
                timestamps: TIMES,
                geometry: None,
            },
            Kind::Trips => Contract {
                entity: "trips",
                required: TRIPS,
                timestamps: TIMES,
                geometry: Some(GeometryType::MultiPoint),
            },
            Kind::TripsTable => Contract {
                entity: "trips table",
                required: TRIPS,
                timestamps: TIMES,
                geometry: None,
            },
            Kind::Locations => Contract {
                entity: "locations",
                required: &["user_id"],
                timestamps: &[],
                geometry: Some(GeometryType::Point),
            },
            Kind::Tours => Contract {
                entity: "tours",
                required: USER_TIMES,
                timestamps: TIMES,
                geometry: None,
            },
        }
    }

    /// Weaker view to degrade to when the contract fails on a derived table
    pub fn fallback(&self) -> Option<Kind> {
        match self {
            Kind::Triplegs => Some(Kind::TriplegsTable),
            Kind::Trips => Some(Kind::TripsTable),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Marker of the entity held by a [`View`]
pub trait Entity {
    const KIND: Kind;
}

/// Entity markers
pub mod entity {
    use super::{Entity, Kind};

    /// Tracked GPS points
    pub enum Positionfix {}
    /// Stationary periods
    pub enum Staypoint {}
    /// Continuous movement with one mode of transport
    pub enum Tripleg {}
    pub enum TriplegRecord {}
    /// Movement between two activities
    pub enum Trip {}
    pub enum TripRecord {}
    pub enum Location {}
    pub enum Tour {}

    impl Entity for Positionfix {
        const KIND: Kind = Kind::Positionfixes;
    }

    impl Entity for Staypoint {
        const KIND: Kind = Kind::Staypoints;
    }

    impl Entity for Tripleg {
        const KIND: Kind = Kind::Triplegs;
    }

    impl Entity for TriplegRecord {
        const KIND: Kind = Kind::TriplegsTable;
    }

    impl Entity for Trip {
        const KIND: Kind = Kind::Trips;
    }

    impl Entity for TripRecord {
        const KIND: Kind = Kind::TripsTable;
    }

    impl Entity for Location {
        const KIND: Kind = Kind::Locations;
    }

    impl Entity for Tour {
        const KIND: Kind = Kind::Tours;
    }
}

pub type Positionfixes = View<entity::Positionfix>;
pub type Staypoints = View<entity::Staypoint>;
pub type Triplegs = View<entity::Tripleg>;
pub type TriplegsTable = View<entity::TriplegRecord>;
pub type Trips = View<entity::Trip>;
pub type TripsTable = View<entity::TripRecord>;
pub type Locations = View<entity::Location>;
pub type Tours = View<entity::Tour>;

/// A table tagged as holding the entity `E`
pub struct View<E: Entity> {
    frame: Frame,
    validate_geometry: bool,
    entity: PhantomData<E>,
}

impl<E: Entity> Clone for View<E> {
    fn clone(&self) -> Self {
        Self::from_checked(self.frame.clone(), self.validate_geometry)
    }
}

impl<E: Entity> fmt::Debug for View<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("kind", &E::KIND)
            .field("frame", &self.frame)
            .finish()
    }
}

impl<E: Entity> View<E> {
    /// Tag the table, validating geometries too
    pub fn new(frame: Frame) -> Result<Self> {
        Self::with_options(frame, true)
    }

    /// Tag the table after validating its contract
    pub fn with_options(frame: Frame, validate_geometry: bool) -> Result<Self> {
        E::KIND.contract().validate(&frame, validate_geometry)?;

        Ok(Self::from_checked(frame, validate_geometry))
    }

    /// Wrap a table whose contract was already checked
    pub(crate) fn from_checked(frame: Frame, validate_geometry: bool) -> Self {
        Self {
            frame,
            validate_geometry,
            entity: PhantomData,
        }
    }

    pub fn kind(&self) -> Kind {
        E::KIND
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn validate_geometry(&self) -> bool {
        self.validate_geometry
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        self.frame.column(name)
    }

    /// Whether the table still meets the contract
    pub fn check(&self) -> bool {
        E::KIND
            .contract()
            .check(&self.frame, self.validate_geometry)
    }

    /// Run a table operation and re-tag its result
    pub fn derive<O, F>(&self, op: F) -> Result<O::Output>
    where
        O: Retag,
        F: FnOnce(&Frame) -> Result<O>,
    {
        let out = op(&self.frame)?;

        Ok(out.retag(E::KIND, self.validate_geometry))
    }

    /// Like [`View::derive`] but the result has to keep this view
    pub(crate) fn derive_same<F>(&self, op: F) -> Result<Self>
    where
        F: FnOnce(&Frame) -> Result<Frame>,
    {
        self.derive(op)?.expect_view()
    }

    pub fn copy(&self) -> Tagged {
        self.frame.copy().retag(E::KIND, self.validate_geometry)
    }

    pub fn take(&self, positions: &[usize]) -> Result<Tagged> {
        self.derive(|f| f.take(positions))
    }

    pub fn filter(&self, mask: &[bool]) -> Result<Tagged> {
        self.derive(|f| f.filter(mask))
    }

    pub fn head(&self, n: usize) -> Tagged {
        self.frame.head(n).retag(E::KIND, self.validate_geometry)
    }

    pub fn select(&self, names: &[&str]) -> Result<Tagged> {
        self.derive(|f| f.select(names))
    }

    pub fn drop(&self, names: &[&str]) -> Result<Tagged> {
        self.derive(|f| f.drop(names))
    }

    pub fn sort_by(&self, name: &str) -> Result<Tagged> {
        self.derive(|f| f.sort_by(name))
    }

    pub fn with_column(&self, name: &str, column: Column) -> Result<Tagged> {
        self.derive(|f| f.with_column(name, column))
    }

    pub fn merge(&self, other: &Frame, on: &[&str], suffixes: (&str, &str)) -> Result<Tagged> {
        self.derive(|f| f.merge(other, on, suffixes))
    }

    /// Stack `others` below this table
    pub fn concat(&self, others: &[&Frame]) -> Result<Tagged> {
        self.derive(|f| {
            let mut frames = vec![f];
            frames.extend_from_slice(others);
            Frame::concat(&frames)
        })
    }

    /// Row at the position `pos`, never tagged
    pub fn row(&self, pos: usize) -> Option<Row> {
        self.frame.row(pos)
    }
}

impl<E: Entity> From<View<E>> for Tagged {
    fn from(view: View<E>) -> Self {
        let validate_geometry = view.validate_geometry;
        Tagged::new(Tag::View(E::KIND), view.frame, validate_geometry)
    }
}

impl<E: Entity> TryFrom<Tagged> for View<E> {
    type Error = Error;

    fn try_from(tagged: Tagged) -> Result<Self> {
        tagged.expect_view()
    }
}
