//! `graspkit-viz` – debug marker side channel.
//!
//! - [`marker`] – [`Marker`], [`MarkerColor`] and the run-stamped
//!   [`MarkerEvent`].
//! - [`sink`] – [`MarkerSink`] and its implementations.

pub mod marker;
pub mod sink;

pub use marker::{Marker, MarkerColor, MarkerEvent};
pub use sink::{JsonLinesSink, MarkerBus, MarkerLog, MarkerSink, VizError};
