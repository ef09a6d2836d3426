//! Data models for Binôme

mod distribution;
mod session;
mod zone;

pub use distribution::{Distribution, DistributionId, PaymentMethod, VisitStatus};
pub use session::Session;
pub use zone::{Zone, ZoneId};
