//! Tick-counted publication cadences
//!
//! Every active tick publishes the fast record. Slower groups are derived by counting ticks
//! against a period computed from the current measurement period, so a change of `t_meas`
//! takes effect on the next tick without resetting the counters.

use crate::telemetry::Record;

/// Set of records due on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordSet(u8);

impl RecordSet {
    pub const NONE: Self = Self(0);

    pub const fn new_eq(record: Record) -> Self {
        Self(1 << record as u8)
    }

    pub const fn contains(&self, record: Record) -> bool {
        self.0 & Self::new_eq(record).0 != 0
    }

    pub const fn insert(&mut self, record: Record) {
        self.0 |= Self::new_eq(record).0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates in record declaration order.
    pub fn iter(self) -> impl Iterator<Item = Record> {
        Record::ALL
            .into_iter()
            .filter(move |&record| self.contains(record))
    }
}

/// A counter firing once per `span_ms` worth of measurement periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cadence {
    span_ms: u32,
    count: u32,
}

impl Cadence {
    pub const fn new(span_ms: u32) -> Self {
        Self { span_ms, count: 0 }
    }

    /// Ticks between emissions for measurement period `t_meas` in ms, at least 1
    pub fn period(&self, t_meas: u16) -> u32 {
        let t_meas = u32::from(t_meas).max(1);
        self.span_ms.div_ceil(t_meas).max(1)
    }

    /// Counts one tick. Returns `true` and restarts from zero when the period is reached.
    pub fn advance(&mut self, t_meas: u16) -> bool {
        self.count += 1;
        if self.count >= self.period(t_meas) {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scheduler {
    pub second: Cadence,
    pub five_seconds: Cadence,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            second: Cadence::new(1000),
            five_seconds: Cadence::new(5000),
        }
    }

    /// Advances all cadences by one tick and returns the records due.
    pub fn tick(&mut self, t_meas: u16) -> RecordSet {
        let mut due = RecordSet::new_eq(Record::EnergySource);
        if self.second.advance(t_meas) {
            due.insert(Record::BatteryStatus);
            due.insert(Record::BatteryInfo);
        }
        if self.five_seconds.advance(t_meas) {
            due.insert(Record::BatteryParameters);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use super::*;

    fn firing_ticks(cadence: impl Fn(&Scheduler) -> Cadence, record: Record, t_meas: u16) -> Vec<u32> {
        let mut scheduler = Scheduler::new();
        let ticks = 3 * cadence(&scheduler).period(t_meas);
        (1..=ticks)
            .filter(|_| scheduler.tick(t_meas).contains(record))
            .collect()
    }

    #[test]
    fn test_one_second_group() {
        for t_meas in [1u16, 10, 50, 100] {
            let period = 1000u32.div_ceil(u32::from(t_meas));
            assert_eq!(
                firing_ticks(|s| s.second, Record::BatteryStatus, t_meas),
                [period, 2 * period, 3 * period]
            );
        }
    }

    #[test]
    fn test_five_second_group() {
        for t_meas in [1u16, 10, 50, 100, 300] {
            let period = 5000u32.div_ceil(u32::from(t_meas));
            assert_eq!(
                firing_ticks(|s| s.five_seconds, Record::BatteryParameters, t_meas),
                [period, 2 * period, 3 * period]
            );
        }
    }

    #[test]
    fn test_fast_record_every_tick() {
        let mut scheduler = Scheduler::new();
        let first = scheduler.tick(100);
        assert_eq!(first, RecordSet::new_eq(Record::EnergySource));
        assert_eq!(first.len(), 1);
        assert_eq!(scheduler.second.count(), 1);
        assert_eq!(scheduler.five_seconds.count(), 1);
    }

    #[test]
    fn test_group_content_and_reset() {
        let mut scheduler = Scheduler::new();
        for _ in 1..10 {
            scheduler.tick(100);
        }
        let due = scheduler.tick(100);
        assert_eq!(
            due.iter().collect::<Vec<_>>(),
            [Record::EnergySource, Record::BatteryStatus, Record::BatteryInfo]
        );
        assert_eq!(scheduler.second.count(), 0);
        assert_eq!(scheduler.five_seconds.count(), 10);
    }

    #[test]
    fn test_long_measurement_period() {
        let mut scheduler = Scheduler::new();
        let due = scheduler.tick(u16::MAX);
        assert!(due.contains(Record::BatteryStatus));
        assert!(due.contains(Record::BatteryParameters));
        assert!(!RecordSet::NONE.contains(Record::EnergySource));
        assert!(RecordSet::NONE.is_empty());
    }
}
