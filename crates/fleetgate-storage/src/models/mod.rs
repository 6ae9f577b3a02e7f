//! Row types mapped with `sqlx::FromRow` and their conversions into the
//! `fleetgate-core` domain types.

pub mod alarm;
pub mod device;
pub mod zone;

pub use alarm::{AlarmTypeRow, SubscriberRow};
pub use device::DeviceRow;
pub use zone::ZoneRow;
