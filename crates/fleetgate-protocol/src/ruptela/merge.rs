//! Merging of split extended records.
//!
//! Devices with more IO elements than fit one record send the same fix as a
//! run of parts `0..=last`. Part 0 carries the position; every later part
//! only refines the diagnostics, overlaying its non-zero fields.

use fleetgate_core::{DiagnosticsSnapshot, PositionReport};
use tracing::warn;

use super::record::RecordPart;
use crate::decoder::DecodedReport;

#[derive(Debug)]
struct Pending {
    report: PositionReport,
    diagnostics: DiagnosticsSnapshot,
    last: u8,
}

impl Pending {
    fn finish(self) -> DecodedReport {
        DecodedReport::new(self.report, Some(self.diagnostics))
    }
}

/// Accumulates the parts of one frame.
#[derive(Debug, Default)]
pub struct ExtendedMerger {
    pending: Option<Pending>,
}

impl ExtendedMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one part in. Completed fixes are appended to `out`.
    ///
    /// Returns `false` if the part could not be placed (no part 0 before
    /// it, or an index past the declared last part) and was dropped.
    pub fn push(
        &mut self,
        part: RecordPart,
        report: PositionReport,
        diagnostics: DiagnosticsSnapshot,
        out: &mut Vec<DecodedReport>,
    ) -> bool {
        if part.index == 0 {
            if let Some(previous) = self.pending.take() {
                warn!(
                    expected = previous.last,
                    "Extended record started before previous one completed"
                );
                out.push(previous.finish());
            }
            let pending = Pending {
                report,
                diagnostics,
                last: part.last,
            };
            if part.last == 0 {
                out.push(pending.finish());
            } else {
                self.pending = Some(pending);
            }
            return true;
        }

        let Some(pending) = self.pending.as_mut() else {
            warn!(index = part.index, "Extended record part without part 0");
            return false;
        };
        if part.index > pending.last {
            warn!(
                index = part.index,
                last = pending.last,
                "Extended record part out of range"
            );
            return false;
        }

        pending.diagnostics.merge_nonzero(&diagnostics);
        if part.index == pending.last {
            if let Some(done) = self.pending.take() {
                out.push(done.finish());
            }
        }
        true
    }

    /// Emit a fix whose remaining parts never arrived.
    pub fn flush(&mut self) -> Option<DecodedReport> {
        self.pending.take().map(Pending::finish)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn report() -> PositionReport {
        PositionReport::new(1, Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap(), 44.8, 20.4)
    }

    fn diag(fuel: f32, rpm: u32) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            fuel_pct: fuel,
            rpm,
            ..DiagnosticsSnapshot::new(1, report().timestamp)
        }
    }

    fn part(last: u8, index: u8) -> RecordPart {
        RecordPart { last, index }
    }

    #[test]
    fn test_three_part_merge() {
        let mut merger = ExtendedMerger::new();
        let mut out = Vec::new();

        assert!(merger.push(part(2, 0), report(), diag(0.0, 0), &mut out));
        assert!(merger.push(part(2, 1), report(), diag(55.0, 0), &mut out));
        assert!(out.is_empty());
        assert!(merger.push(part(2, 2), report(), diag(0.0, 1200), &mut out));

        assert_eq!(out.len(), 1);
        let merged = out[0].diagnostics.as_ref().unwrap();
        assert_eq!(merged.fuel_pct, 55.0);
        assert_eq!(merged.rpm, 1200);
        assert!(merger.flush().is_none());
    }

    #[test]
    fn test_single_part_completes_immediately() {
        let mut merger = ExtendedMerger::new();
        let mut out = Vec::new();
        merger.push(part(0, 0), report(), diag(30.0, 0), &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_orphan_part_is_dropped() {
        let mut merger = ExtendedMerger::new();
        let mut out = Vec::new();
        assert!(!merger.push(part(2, 1), report(), diag(55.0, 0), &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_index_past_last_is_dropped() {
        let mut merger = ExtendedMerger::new();
        let mut out = Vec::new();
        merger.push(part(1, 0), report(), diag(10.0, 0), &mut out);
        assert!(!merger.push(part(1, 3), report(), diag(55.0, 0), &mut out));

        let flushed = merger.flush().unwrap();
        assert_eq!(flushed.diagnostics.unwrap().fuel_pct, 10.0);
    }

    #[test]
    fn test_new_part_zero_flushes_incomplete() {
        let mut merger = ExtendedMerger::new();
        let mut out = Vec::new();
        merger.push(part(2, 0), report(), diag(10.0, 0), &mut out);
        merger.push(part(1, 0), report(), diag(20.0, 0), &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].diagnostics.as_ref().unwrap().fuel_pct, 10.0);
        assert!(merger.flush().is_some());
    }

    #[test]
    fn test_all_zero_merge_has_no_diagnostics() {
        let mut merger = ExtendedMerger::new();
        let mut out = Vec::new();
        merger.push(part(1, 0), report(), diag(0.0, 0), &mut out);
        merger.push(part(1, 1), report(), diag(0.0, 0), &mut out);
        assert!(out[0].diagnostics.is_none());
    }
}
