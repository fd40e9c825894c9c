//! Data Validation
//!
//! Parses the flat raw record submitted by the data-entry form into a typed
//! [`Observation`], rejecting missing mandatory dates, malformed dates and
//! implausible readings before any feature is derived.

mod error;
mod observation;
mod validator;

pub use error::{ValidationError, ValidationReport};
pub use observation::{field, AncVisit, Observation, RawObservation, RawValue, VISIT_SLOTS};
pub use validator::{check_temporal_order, day_gap, parse_date, ValidationConfig, Validator};
