//! trajframe - typed mobility trajectory tables
//!
//! Positionfixes, staypoints, triplegs, trips, locations and tours are
//! plain [`Frame`] tables tagged with the entity they hold. Every table
//! operation re-tags its result, so a typed view silently degrades to a
//! less specific one (or to a plain table) when the result no longer
//! satisfies the entity's contract.

mod error;

pub mod analysis;
pub mod config;
pub mod frame;
pub mod geogr;
pub mod io;
pub mod model;
pub mod preprocessing;

pub use error::{Error, Result};
pub use frame::{Column, DType, Frame, Value};
pub use model::{
    Kind, Locations, Positionfixes, Registry, Staypoints, Tag, Tagged, Tours, Triplegs,
    TriplegsTable, Trips, TripsTable, View,
};
