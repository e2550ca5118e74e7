//! Re-tagging of derived results

use time::OffsetDateTime;
use tracing::debug;

use super::{Entity, Kind, View};
use crate::frame::{Column, Frame, Row, Value};
use crate::{Error, Result};

/// What a derived table turned out to be
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    View(Kind),
    Generic,
}

/// A derived table together with its tag
#[derive(Clone, Debug, PartialEq)]
pub struct Tagged {
    tag: Tag,
    frame: Frame,
    validate_geometry: bool,
}

impl Tagged {
    pub(crate) fn new(tag: Tag, frame: Frame, validate_geometry: bool) -> Self {
        Self {
            tag,
            frame,
            validate_geometry,
        }
    }

    pub fn generic(frame: Frame) -> Self {
        Self::new(Tag::Generic, frame, true)
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn kind(&self) -> Option<Kind> {
        match self.tag {
            Tag::View(kind) => Some(kind),
            Tag::Generic => None,
        }
    }

    pub fn is_generic(&self) -> bool {
        self.tag == Tag::Generic
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    /// The typed view, when the table is tagged as `E`
    pub fn into_view<E: Entity>(self) -> Option<View<E>> {
        if self.tag != Tag::View(E::KIND) {
            return None;
        }

        Some(View::from_checked(self.frame, self.validate_geometry))
    }

    /// The typed view, or an error naming what the table degraded to
    pub fn expect_view<E: Entity>(self) -> Result<View<E>> {
        let found = match self.tag {
            Tag::View(kind) => kind.name(),
            Tag::Generic => "a generic table",
        };

        self.into_view().ok_or(Error::Degraded {
            expected: E::KIND.name(),
            found,
        })
    }
}

/// Tag the most specific view of the chain starting at `from` whose contract
/// holds on `frame`, or no view at all
pub fn retag(frame: Frame, from: Kind, validate_geometry: bool) -> Tagged {
    let mut candidate = Some(from);

    while let Some(kind) = candidate {
        if kind.contract().check(&frame, validate_geometry) {
            if kind != from {
                debug!("Derived {} degraded to {}", from, kind);
            }
            return Tagged::new(Tag::View(kind), frame, validate_geometry);
        }
        candidate = kind.fallback();
    }

    debug!("Derived {} degraded to a generic table", from);
    Tagged::new(Tag::Generic, frame, validate_geometry)
}

/// Output of a table operation, as seen after re-tagging
///
/// Only tables are re-tagged, anything lower-dimensional passes through.
pub trait Retag {
    type Output;

    fn retag(self, from: Kind, validate_geometry: bool) -> Self::Output;
}

impl Retag for Frame {
    type Output = Tagged;

    fn retag(self, from: Kind, validate_geometry: bool) -> Tagged {
        retag(self, from, validate_geometry)
    }
}

macro_rules! passthrough {
    ($($t:ty),*) => {
        $(
            impl Retag for $t {
                type Output = $t;

                fn retag(self, _from: Kind, _validate_geometry: bool) -> $t {
                    self
                }
            }
        )*
    };
}

passthrough!(Row, Column, Value, Vec<Value>, Option<Row>, bool, usize, i64, f64, OffsetDateTime);
