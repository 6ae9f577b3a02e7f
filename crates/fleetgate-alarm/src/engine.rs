//! Alarm evaluation.
//!
//! [`AlarmEngine::evaluate`] takes one decoded report together with the
//! connection's [`SessionState`], rejects physically implausible input,
//! advances the virtual odometer and the stop anchor, then runs the rules
//! in priority order:
//!
//! 1. stationary (stopped for at least the object's dwell time)
//! 2. speeding (rising edge over the object's limit)
//! 3. fuel theft (level drop while stopped)
//! 4. geofence entry / exit
//!
//! Every rule updates its latch, but only the first rule that fires decides
//! the report's alarm code and event text. When no rule fires, an alarm the
//! decoder already assigned (SOS, ignition) is kept.
//!
//! # Examples
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use fleetgate_alarm::{AlarmEngine, SessionState};
//! use fleetgate_core::{AlarmCatalog, AlarmCode, PositionReport, TrackedObject};
//! use std::sync::Arc;
//!
//! let object = TrackedObject {
//!     id: 1,
//!     label: "truck".to_string(),
//!     speed_limit_kmh: 60,
//!     stop_dwell_secs: 0,
//! };
//! let engine = AlarmEngine::new(Arc::new(AlarmCatalog::with_defaults()));
//! let mut state = SessionState::new("359633100458590", object, vec![], vec![]);
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap();
//! let mut report = PositionReport::new(1, t0, 44.81, 20.46);
//! report.speed_kmh = 72;
//!
//! let assessment = engine.evaluate_at(&mut state, report, None, t0).unwrap();
//! assert_eq!(assessment.report.alarm, AlarmCode::SPEEDING);
//! assert_eq!(assessment.report.event_text, "72km/h");
//! ```

use crate::session::SessionState;
use chrono::{DateTime, Duration, Utc};
use fleetgate_core::constants::{
    CLOCK_SKEW_SECS, EPOCH_FLOOR_SECS, FUEL_CHECK_MAX_SPEED_KMH, FUEL_THEFT_DROP_PCT,
    MAX_SPEED_KMH, STOP_SPEED_KMH,
};
use fleetgate_core::geo::{haversine_km, haversine_m};
use fleetgate_core::{AlarmCatalog, AlarmCode, DiagnosticsSnapshot, PositionReport, Zone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Engine policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Entry alarms only consider memberships flagged for exit alarms.
    /// When false, the membership's entry flag is used instead.
    pub geofence_entry_requires_exit_flag: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            geofence_entry_requires_exit_flag: true,
        }
    }
}

impl EngineConfig {
    pub fn geofence_entry_requires_exit_flag(mut self, required: bool) -> Self {
        self.geofence_entry_requires_exit_flag = required;
        self
    }

    fn participates_in_entry(&self, zone: &Zone) -> bool {
        zone.active
            && if self.geofence_entry_requires_exit_flag {
                zone.exit_alarm
            } else {
                zone.entry_alarm
            }
    }
}

/// Data-quality reject; the report is dropped without touching the session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("speed {0} km/h is not plausible")]
    ImplausibleSpeed(u16),

    #[error("timestamp {0} is before the accepted floor")]
    BeforeFloor(DateTime<Utc>),

    #[error("timestamp {0} is in the future")]
    InFuture(DateTime<Utc>),
}

/// Rule that raised an [`AlarmEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmRule {
    Stationary,
    Speeding,
    FuelTheft,
    ZoneEntry,
    ZoneExit,
}

impl AlarmRule {
    #[must_use]
    pub fn code(self) -> AlarmCode {
        match self {
            AlarmRule::Stationary => AlarmCode::STATIONARY,
            AlarmRule::Speeding => AlarmCode::SPEEDING,
            AlarmRule::FuelTheft => AlarmCode::FUEL_THEFT,
            AlarmRule::ZoneEntry => AlarmCode::ZONE_ENTRY,
            AlarmRule::ZoneExit => AlarmCode::ZONE_EXIT,
        }
    }
}

impl fmt::Display for AlarmRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlarmRule::Stationary => "stationary",
            AlarmRule::Speeding => "speeding",
            AlarmRule::FuelTheft => "fuel_theft",
            AlarmRule::ZoneEntry => "zone_entry",
            AlarmRule::ZoneExit => "zone_exit",
        };
        f.write_str(name)
    }
}

/// One rule firing on one report.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmEvent {
    pub rule: AlarmRule,
    pub code: AlarmCode,
    pub text: String,
}

/// Accepted report after evaluation, ready for the notification step.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub report: PositionReport,
    pub diagnostics: Option<DiagnosticsSnapshot>,

    /// Every rule that fired, highest priority first
    pub events: Vec<AlarmEvent>,
}

#[derive(Debug, Clone)]
pub struct AlarmEngine {
    catalog: Arc<AlarmCatalog>,
    config: EngineConfig,
}

impl AlarmEngine {
    pub fn new(catalog: Arc<AlarmCatalog>) -> Self {
        Self::with_config(catalog, EngineConfig::default())
    }

    pub fn with_config(catalog: Arc<AlarmCatalog>, config: EngineConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &Arc<AlarmCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate against the wall clock.
    pub fn evaluate(
        &self,
        state: &mut SessionState,
        report: PositionReport,
        diagnostics: Option<DiagnosticsSnapshot>,
    ) -> Result<Assessment, Rejection> {
        self.evaluate_at(state, report, diagnostics, Utc::now())
    }

    /// Evaluate with `now` as the reference for the clock-skew check.
    pub fn evaluate_at(
        &self,
        state: &mut SessionState,
        mut report: PositionReport,
        diagnostics: Option<DiagnosticsSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<Assessment, Rejection> {
        check_quality(&report, now)?;

        let ordered_after = state.last.as_ref().is_none_or(|last| report.is_after(last));

        if let Some(last) = &state.last {
            report.virtual_odometer_km = if ordered_after {
                last.virtual_odometer_km + haversine_km(last.lat, last.lon, report.lat, report.lon)
            } else {
                last.virtual_odometer_km
            };
        }

        if report.speed_kmh > STOP_SPEED_KMH {
            state.clear_stop();
        } else {
            state.anchor_stop(&report, diagnostics.as_ref());
        }

        let mut fired = Vec::new();
        if ordered_after {
            fired.extend(self.stationary(state, &report));
            fired.extend(self.speeding(state, &report));
            fired.extend(self.fuel_theft(state, &report, diagnostics.as_ref()));
            fired.extend(self.geofence(state, &report));
        }
        report.zone = state.current_zone.clone();

        // Inactive alarm types never win; the rule's latch still holds.
        let events: Vec<AlarmEvent> = fired
            .into_iter()
            .filter(|event| !self.catalog.assign(event.code.clone()).is_regular())
            .collect();

        match events.first() {
            Some(winner) => {
                report.alarm = winner.code.clone();
                report.event_text.clone_from(&winner.text);
            }
            None => {
                report.alarm = self.catalog.assign(report.alarm);
            }
        }

        for event in &events {
            tracing::info!(
                tracked_object_id = state.object.id,
                label = %state.object.label,
                rule = %event.rule,
                alarm = %event.code,
                text = %event.text,
                "alarm raised"
            );
        }

        if ordered_after {
            state.last = Some(report.clone());
        }

        Ok(Assessment {
            report,
            diagnostics,
            events,
        })
    }

    fn stationary(&self, state: &mut SessionState, report: &PositionReport) -> Option<AlarmEvent> {
        let dwell = state.object.stop_dwell_secs;
        if dwell == 0 || state.stationary_latched {
            return None;
        }
        let anchor = state.stop_anchor.as_ref()?;
        let stopped_for = report.timestamp - anchor.report.timestamp;
        if stopped_for < Duration::seconds(i64::from(dwell)) {
            return None;
        }

        state.stationary_latched = true;
        Some(event(AlarmRule::Stationary, report.event_text.clone()))
    }

    fn speeding(&self, state: &mut SessionState, report: &PositionReport) -> Option<AlarmEvent> {
        let limit = state.object.speed_limit_kmh;
        if limit == 0 {
            return None;
        }
        if report.speed_kmh <= limit {
            state.speeding_latched = false;
            return None;
        }
        if state.speeding_latched {
            return None;
        }

        state.speeding_latched = true;
        let text = if report.event_text.is_empty() {
            format!("{}km/h", report.speed_kmh)
        } else {
            format!("{}, {}km/h", report.event_text, report.speed_kmh)
        };
        Some(event(AlarmRule::Speeding, text))
    }

    fn fuel_theft(
        &self,
        state: &mut SessionState,
        report: &PositionReport,
        diagnostics: Option<&DiagnosticsSnapshot>,
    ) -> Option<AlarmEvent> {
        let current = diagnostics?;
        if report.speed_kmh >= FUEL_CHECK_MAX_SPEED_KMH || state.fuel_theft_latched {
            return None;
        }
        let reference = state.stop_anchor.as_ref()?.diagnostics.as_ref()?;
        let drop = reference.fuel_pct - current.fuel_pct;
        if drop <= FUEL_THEFT_DROP_PCT {
            return None;
        }

        tracing::debug!(
            tracked_object_id = state.object.id,
            reference = reference.fuel_pct,
            current = current.fuel_pct,
            "fuel level dropped while stopped"
        );
        state.fuel_theft_latched = true;
        Some(event(AlarmRule::FuelTheft, report.event_text.clone()))
    }

    fn geofence(&self, state: &mut SessionState, report: &PositionReport) -> Option<AlarmEvent> {
        let distance_to = |zone: &Zone| haversine_m(report.lat, report.lon, zone.lat, zone.lon);

        match state.current_zone.take() {
            Some(current) => {
                let zone = state.zones.iter().find(|zone| zone.id == current.id && zone.active)?;
                if distance_to(zone) <= zone.radius_m {
                    state.current_zone = Some(current);
                    return None;
                }
                zone.exit_alarm.then(|| event(AlarmRule::ZoneExit, zone.name.clone()))
            }
            None => {
                let zone = state
                    .zones
                    .iter()
                    .filter(|zone| self.config.participates_in_entry(zone))
                    .find(|zone| distance_to(zone) <= zone.radius_m)?;
                state.current_zone = Some(zone.to_ref());
                Some(event(AlarmRule::ZoneEntry, zone.name.clone()))
            }
        }
    }
}

fn event(rule: AlarmRule, text: String) -> AlarmEvent {
    AlarmEvent {
        rule,
        code: rule.code(),
        text,
    }
}

fn check_quality(report: &PositionReport, now: DateTime<Utc>) -> Result<(), Rejection> {
    if report.speed_kmh >= MAX_SPEED_KMH {
        return Err(Rejection::ImplausibleSpeed(report.speed_kmh));
    }
    if report.timestamp.timestamp() < EPOCH_FLOOR_SECS {
        return Err(Rejection::BeforeFloor(report.timestamp));
    }
    if report.timestamp > now + Duration::seconds(CLOCK_SKEW_SECS) {
        return Err(Rejection::InFuture(report.timestamp));
    }
    Ok(())
}
