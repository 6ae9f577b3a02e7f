//! Alarm evaluation for fleetgate.
//!
//! - [`SessionState`] holds what one connection knows about its device: the
//!   tracked object, cached zones and subscribers, the last accepted report
//!   and the alarm latches.
//! - [`AlarmEngine`] rejects implausible reports and runs the alarm rules,
//!   producing an [`Assessment`].
//! - [`Notifier`] hands the assessment to the [`fleetgate_storage::ReportSink`]
//!   and queues subscriber notifications.

pub mod engine;
pub mod notify;
pub mod session;

pub use engine::{AlarmEngine, AlarmEvent, AlarmRule, Assessment, EngineConfig, Rejection};
pub use notify::{AddressResolver, Delivery, NoAddressResolver, Notifier};
pub use session::{Resolution, SessionState, StopAnchor};
