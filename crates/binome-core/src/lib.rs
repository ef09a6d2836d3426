//! binome-core - Core library for Binôme
//!
//! This crate contains the record models, zone geometry, access filtering,
//! local replica storage and remote table reconciliation shared by every
//! Binôme interface.

pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod geometry;
pub mod models;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use geometry::{LatLng, Shape};
pub use models::{Distribution, DistributionId, PaymentMethod, Session, VisitStatus, Zone, ZoneId};
pub use state::SyncState;
