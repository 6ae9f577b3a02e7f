//! Read-only alarm type catalog.
//!
//! The catalog is loaded once at startup from the directory collaborator and
//! shared by every decoder and alarm engine instance. Assigning an alarm goes
//! through [`AlarmCatalog::assign`], which enforces the rule that a missing or
//! deactivated alarm type degrades to a regular report.

use crate::types::{AlarmCode, AlarmType};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct AlarmCatalog {
    types: HashMap<AlarmCode, AlarmType>,
}

impl AlarmCatalog {
    pub fn new(types: impl IntoIterator<Item = AlarmType>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.code.clone(), t)).collect(),
        }
    }

    /// Catalog where every well-known code is active, with no address
    /// resolution and no e-mail. Useful for tests and demo deployments.
    #[must_use]
    pub fn with_defaults() -> Self {
        let entries = [
            (AlarmCode::REGULAR, "Regular"),
            (AlarmCode::SPEEDING, "Speeding"),
            (AlarmCode::STATIONARY, "Stationary"),
            (AlarmCode::FUEL_THEFT, "Fuel theft"),
            (AlarmCode::ZONE_EXIT, "Zone exit"),
            (AlarmCode::ZONE_ENTRY, "Zone entry"),
            (AlarmCode::SOS, "SOS"),
            (AlarmCode::IGNITION_ON, "Ignition on"),
            (AlarmCode::IGNITION_OFF, "Ignition off"),
        ];
        Self::new(entries.into_iter().map(|(code, name)| AlarmType {
            code,
            name: name.to_string(),
            address_resolution_required: false,
            email: false,
            active: true,
        }))
    }

    #[must_use]
    pub fn get(&self, code: &AlarmCode) -> Option<&AlarmType> {
        self.types.get(code)
    }

    /// Resolve the code to assign for `code`: itself if the type exists and
    /// is active, otherwise [`AlarmCode::REGULAR`].
    #[must_use]
    pub fn assign(&self, code: AlarmCode) -> AlarmCode {
        match self.types.get(&code) {
            Some(alarm_type) if alarm_type.active => code,
            _ => AlarmCode::REGULAR,
        }
    }

    /// Iterate over every entry, active or not.
    pub fn types(&self) -> impl Iterator<Item = &AlarmType> {
        self.types.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
