//! Hand an accepted report to the outward collaborators.

use crate::engine::Assessment;
use fleetgate_core::constants::MAX_EVENT_TEXT_LEN;
use fleetgate_core::{AlarmCatalog, PositionReport, Subscriber};
use fleetgate_storage::ReportSink;
use std::future::Future;
use std::sync::Arc;

/// Reverse geocoder used to attach an address to alarm reports.
pub trait AddressResolver: Send + Sync {
    fn resolve_address(&self, lat: f64, lon: f64) -> impl Future<Output = Option<String>> + Send;
}

/// Resolver for deployments without a geocoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAddressResolver;

impl AddressResolver for NoAddressResolver {
    async fn resolve_address(&self, _lat: f64, _lon: f64) -> Option<String> {
        None
    }
}

/// What happened to one report on its way out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub position_id: Option<i64>,
    pub notified: usize,
    pub failures: usize,
}

/// Runs the notification step: address, persist, broadcast, notify.
///
/// Collaborator failures are logged and counted, never returned; a broken
/// sink must not take the connection down.
#[derive(Debug)]
pub struct Notifier<S, R = NoAddressResolver> {
    sink: Arc<S>,
    resolver: Arc<R>,
    catalog: Arc<AlarmCatalog>,
}

impl<S, R> Clone for Notifier<S, R> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            resolver: Arc::clone(&self.resolver),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<S: ReportSink> Notifier<S, NoAddressResolver> {
    pub fn new(sink: Arc<S>, catalog: Arc<AlarmCatalog>) -> Self {
        Self::with_resolver(sink, Arc::new(NoAddressResolver), catalog)
    }
}

impl<S: ReportSink, R: AddressResolver> Notifier<S, R> {
    pub fn with_resolver(sink: Arc<S>, resolver: Arc<R>, catalog: Arc<AlarmCatalog>) -> Self {
        Self {
            sink,
            resolver,
            catalog,
        }
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    pub async fn deliver(&self, mut assessment: Assessment, subscribers: &[Subscriber]) -> Delivery {
        let mut delivery = Delivery::default();
        let alarm_type = self.catalog.get(&assessment.report.alarm);

        if !assessment.report.alarm.is_regular()
            && alarm_type.is_some_and(|t| t.address_resolution_required)
        {
            self.attach_address(&mut assessment.report).await;
        }

        let report = &assessment.report;
        match self.sink.persist_position(report).await {
            Ok(id) => delivery.position_id = Some(id),
            Err(e) => {
                delivery.failures += 1;
                tracing::error!(tracked_object_id = report.tracked_object_id, error = %e, "failed to persist position");
            }
        }

        if let Some(diagnostics) = &assessment.diagnostics
            && let Err(e) = self.sink.persist_diagnostics(diagnostics).await
        {
            delivery.failures += 1;
            tracing::error!(tracked_object_id = report.tracked_object_id, error = %e, "failed to persist diagnostics");
        }

        if let Err(e) = self.sink.broadcast(report).await {
            delivery.failures += 1;
            tracing::error!(tracked_object_id = report.tracked_object_id, error = %e, "failed to broadcast report");
        }

        if alarm_type.is_some_and(|t| t.email) {
            for subscriber in subscribers.iter().filter(|s| s.wants(&report.alarm)) {
                match self.sink.notify_subscriber(subscriber, report).await {
                    Ok(()) => delivery.notified += 1,
                    Err(e) => {
                        delivery.failures += 1;
                        tracing::error!(
                            subscriber_id = subscriber.id,
                            alarm = %report.alarm,
                            error = %e,
                            "failed to notify subscriber"
                        );
                    }
                }
            }
        }

        delivery
    }

    async fn attach_address(&self, report: &mut PositionReport) {
        if report.lat == 0.0 || report.lon == 0.0 {
            return;
        }
        let Some(address) = self.resolver.resolve_address(report.lat, report.lon).await else {
            return;
        };
        if address.is_empty() {
            return;
        }
        report.event_text = append_address(&report.event_text, &address);
    }
}

/// Append `address` to `text`, falling back to the address alone when the
/// combination does not fit, and capping the result.
fn append_address(text: &str, address: &str) -> String {
    let combined = if text.trim().is_empty() {
        address.to_string()
    } else {
        let joined = format!("{} {}", text, address).trim().to_string();
        if joined.chars().count() > MAX_EVENT_TEXT_LEN {
            address.to_string()
        } else {
            joined
        }
    };
    combined.chars().take(MAX_EVENT_TEXT_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AlarmEvent, AlarmRule};
    use chrono::{TimeZone, Utc};
    use fleetgate_core::{AlarmCode, AlarmType, DiagnosticsSnapshot};
    use fleetgate_storage::MemorySink;

    struct FixedResolver(&'static str);

    impl AddressResolver for FixedResolver {
        async fn resolve_address(&self, _lat: f64, _lon: f64) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn catalog(address: bool, email: bool) -> Arc<AlarmCatalog> {
        let defaults = AlarmCatalog::with_defaults();
        let types: Vec<AlarmType> = defaults
            .types()
            .cloned()
            .map(|t| AlarmType {
                address_resolution_required: address,
                email,
                ..t
            })
            .collect();
        Arc::new(AlarmCatalog::new(types))
    }

    fn assessment(alarm: AlarmCode, text: &str) -> Assessment {
        let mut report = PositionReport::new(1, Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap(), 44.81, 20.46);
        report.alarm = alarm.clone();
        report.event_text = text.to_string();
        let mut diagnostics = DiagnosticsSnapshot::new(1, report.timestamp);
        diagnostics.rpm = 900;
        Assessment {
            report,
            diagnostics: Some(diagnostics),
            events: vec![AlarmEvent {
                rule: AlarmRule::Speeding,
                code: alarm,
                text: text.to_string(),
            }],
        }
    }

    fn subscriber(id: i64, alarm: AlarmCode) -> Subscriber {
        Subscriber {
            id,
            name: format!("sub{id}"),
            email: format!("sub{id}@example.com"),
            alarm,
            email_enabled: true,
        }
    }

    #[tokio::test]
    async fn test_deliver_persists_broadcasts_and_notifies() {
        let sink = Arc::new(MemorySink::new());
        let notifier = Notifier::new(sink.clone(), catalog(false, true));
        let subscribers = [subscriber(1, AlarmCode::SPEEDING), subscriber(2, AlarmCode::SOS)];

        let delivery = notifier
            .deliver(assessment(AlarmCode::SPEEDING, "97km/h"), &subscribers)
            .await;

        assert_eq!(delivery.position_id, Some(1));
        assert_eq!(delivery.notified, 1);
        assert_eq!(delivery.failures, 0);
        assert_eq!(sink.positions().await.len(), 1);
        assert_eq!(sink.diagnostics().await.len(), 1);
        assert_eq!(sink.broadcasts().await.len(), 1);
        assert_eq!(sink.notifications().await[0].0.id, 1);
    }

    #[tokio::test]
    async fn test_no_mail_when_alarm_type_has_email_disabled() {
        let sink = Arc::new(MemorySink::new());
        let notifier = Notifier::new(sink.clone(), catalog(false, false));

        let delivery = notifier
            .deliver(assessment(AlarmCode::SPEEDING, ""), &[subscriber(1, AlarmCode::SPEEDING)])
            .await;

        assert_eq!(delivery.notified, 0);
        assert!(sink.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_address_appended_for_alarm_reports() {
        let sink = Arc::new(MemorySink::new());
        let notifier = Notifier::with_resolver(
            sink.clone(),
            Arc::new(FixedResolver("Knez Mihailova 1, Beograd")),
            catalog(true, false),
        );

        notifier.deliver(assessment(AlarmCode::SPEEDING, "97km/h"), &[]).await;
        notifier.deliver(assessment(AlarmCode::REGULAR, ""), &[]).await;

        let positions = sink.positions().await;
        assert_eq!(positions[0].event_text, "97km/h Knez Mihailova 1, Beograd");
        assert_eq!(positions[1].event_text, "");
    }

    #[tokio::test]
    async fn test_failing_sink_is_counted_not_raised() {
        let sink = Arc::new(MemorySink::failing());
        let notifier = Notifier::new(sink, catalog(false, true));

        let delivery = notifier
            .deliver(assessment(AlarmCode::SPEEDING, ""), &[subscriber(1, AlarmCode::SPEEDING)])
            .await;

        assert_eq!(delivery.position_id, None);
        assert_eq!(delivery.failures, 4);
    }

    #[test]
    fn test_append_address() {
        assert_eq!(append_address("", "Street 1"), "Street 1");
        assert_eq!(append_address("Depot", "Street 1"), "Depot Street 1");

        let long = "x".repeat(MAX_EVENT_TEXT_LEN);
        assert_eq!(append_address(&long, "Street 1"), "Street 1");

        let huge_address = "y".repeat(MAX_EVENT_TEXT_LEN + 20);
        assert_eq!(append_address("", &huge_address).len(), MAX_EVENT_TEXT_LEN);
    }
}
