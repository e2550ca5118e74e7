//! Analyses bound on the typed views

use time::{Duration, OffsetDateTime};

use crate::frame::Frame;
use crate::{Error, Result};

mod labelling;
mod location_identification;
mod modal_split;
mod speed;
mod tracking_quality;

pub use labelling::{ActivityMethod, SpeedCategories, TransportModeMethod};
pub use location_identification::{AggLevel, LocationMethod, PreFilter};
pub use modal_split::ModalSplitMetric;
pub use tracking_quality::{temporal_tracking_quality, Granularity};

/// Timezone aware timestamps of a column
pub(crate) fn timestamps(frame: &Frame, name: &str) -> Result<Vec<Option<OffsetDateTime>>> {
    let column = frame.column_or_err(name)?;

    column.as_timestamp_tz().ok_or_else(|| Error::NotTimezoneAware {
        column: name.to_string(),
        dtype: column.dtype().to_string(),
    })
}

/// `finished_at - started_at` of every row
pub(crate) fn durations(frame: &Frame) -> Result<Vec<Option<Duration>>> {
    let started = timestamps(frame, "started_at")?;
    let finished = timestamps(frame, "finished_at")?;

    Ok(started
        .iter()
        .zip(finished)
        .map(|(s, f)| match (s, f) {
            (Some(s), Some(f)) => Some(f - *s),
            _ => None,
        })
        .collect())
}
