//! Ride lifecycle engine

pub mod error;
pub mod fare;
pub mod model;
pub mod otp;
pub mod service;

pub use error::{ErrorKind, RideError};
pub use fare::{FareCalculator, RateCard};
pub use model::*;
pub use service::{RidePolicy, RideService};
