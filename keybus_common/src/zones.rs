//! Per-zone activation tracking.
//!
//! A zone is *active* iff its activation timestamp is strictly greater than
//! its deactivation timestamp; a tie reads as inactive. `ZoneTracker::apply`
//! keeps that invariant incrementally from each zone-group report: an
//! active report only stamps `activated` when the zone currently reads
//! inactive, an inactive report only stamps `deactivated` when it currently
//! reads active. Timestamps are whole seconds on the monotonic clock.

use crate::codec::message::ZoneReport;
use crate::consts::ZONE_COUNT;
use serde::{Deserialize, Serialize};

/// Activation state of one zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneRecord {
    /// Last observed inactive → active transition.
    pub activated: u64,
    /// Last observed active → inactive transition.
    pub deactivated: u64,
}

impl ZoneRecord {
    /// Whether the zone currently reads active.
    #[inline]
    pub const fn is_active(&self) -> bool {
        self.activated > self.deactivated
    }
}

/// Tracker for all 32 zones; owned by the decoder.
#[derive(Debug, Clone, Default)]
pub struct ZoneTracker {
    records: [ZoneRecord; ZONE_COUNT],
}

impl ZoneTracker {
    /// All zones inactive, all timestamps zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one zone-group report observed at `now`.
    ///
    /// Returns the number of records whose timestamps changed. That
    /// includes a re-stamp that ties the other side, which leaves the
    /// zone inactive.
    pub fn apply(&mut self, report: &ZoneReport, now: u64) -> usize {
        let mut changed = 0;
        for (zone, active) in report.zones() {
            let record = &mut self.records[zone - 1];
            let stamp = if active && !record.is_active() {
                &mut record.activated
            } else if !active && record.is_active() {
                &mut record.deactivated
            } else {
                continue;
            };
            if *stamp != now {
                *stamp = now;
                changed += 1;
            }
        }
        changed
    }

    /// Record for zone `id` (1..=32).
    #[inline]
    pub fn get(&self, id: usize) -> Option<&ZoneRecord> {
        id.checked_sub(1).and_then(|i| self.records.get(i))
    }

    /// All records, zone 1 first.
    #[inline]
    pub fn records(&self) -> &[ZoneRecord; ZONE_COUNT] {
        &self.records
    }

    /// Ids of the zones that currently read active.
    pub fn active_zones(&self) -> impl Iterator<Item = usize> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_active())
            .map(|(i, _)| i + 1)
    }
}
