use chrono::{DateTime, Duration, FixedOffset};
use log::debug;
use std::collections::HashMap;

/// Last interval we have seen for one meter
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalState {
    pub interval_id: u32,
    pub interval_start: DateTime<FixedOffset>,
}

/// Result of feeding one interval report into the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalWindow {
    pub start: DateTime<FixedOffset>,
    /// True if this report opened a new interval and the start got recomputed
    pub advanced: bool,
}

/// Keeps the start of the current consumption interval per meter.
///
/// Meters repeat the same interval message several times. The start is only
/// computed for the first report of an interval id and carried forward after
/// that, so it does not drift with every repetition. A meter whose counter
/// wraps around to the id we already stored is not noticed, and a counter
/// that restarts with a different id simply opens a new interval.
///
/// The tracker is owned by the normalizer and updated through `&mut self`,
/// so lines have to be processed one after another.
#[derive(Debug, Default)]
pub struct IntervalTracker {
    meters: HashMap<String, IntervalState>,
}

/// rtlamr reports the transmit offset in 1/16 seconds
const OFFSET_TICKS_PER_SECOND: i64 = 16;

impl IntervalTracker {
    pub fn new() -> Self {
        return IntervalTracker { meters: HashMap::new() };
    }

    pub fn update(&mut self, meter_id: &str, interval_id: u32, transmit_time_offset: u32, received: DateTime<FixedOffset>) -> IntervalWindow {
        if let Some(state) = self.meters.get(meter_id) {
            if state.interval_id == interval_id {
                return IntervalWindow { start: state.interval_start, advanced: false };
            }
        }

        let offset = Duration::microseconds(transmit_time_offset as i64 * 1_000_000 / OFFSET_TICKS_PER_SECOND);
        let start = received - offset;
        debug!("Meter {meter_id} started interval {interval_id} at {start}");

        self.meters.insert(meter_id.to_string(), IntervalState { interval_id, interval_start: start });
        return IntervalWindow { start, advanced: true };
    }

    pub fn get(&self, meter_id: &str) -> Option<&IntervalState> {
        return self.meters.get(meter_id);
    }

    pub fn len(&self) -> usize {
        return self.meters.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.meters.is_empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn first_report_computes_start() {
        let mut t = IntervalTracker::new();
        let w = t.update("1", 5, 1600, ts("2024-03-01T12:00:00+00:00"));
        assert!(w.advanced);
        assert_eq!(w.start, ts("2024-03-01T11:58:20+00:00"));
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("1").unwrap().interval_id, 5);
    }

    #[test]
    fn same_interval_keeps_start() {
        let mut t = IntervalTracker::new();
        let first = t.update("1", 5, 1600, ts("2024-03-01T12:00:00+00:00"));
        let second = t.update("1", 5, 2400, ts("2024-03-01T12:00:30+00:00"));
        assert_eq!(first.start, second.start);
        assert!(!second.advanced);
    }

    #[test]
    fn advances_once_per_new_interval() {
        let mut t = IntervalTracker::new();
        let mut advanced_at = Vec::new();
        for (pos, id) in [5, 5, 5, 6, 6, 7].iter().enumerate() {
            let received = ts("2024-03-01T12:00:00+00:00") + Duration::seconds(pos as i64 * 10);
            if t.update("1", *id, 16, received).advanced {
                advanced_at.push(pos + 1);
            }
        }
        /* The very first report always creates the state */
        assert_eq!(advanced_at, vec![1, 4, 6]);
        assert_eq!(t.get("1").unwrap().interval_start, ts("2024-03-01T12:00:49+00:00"));
    }

    #[test]
    fn fractional_offsets() {
        let mut t = IntervalTracker::new();
        let w = t.update("1", 1, 8, ts("2024-03-01T12:00:00+01:00"));
        assert_eq!(w.start, ts("2024-03-01T11:59:59.5+01:00"));
        assert_eq!(w.start.offset(), ts("2024-03-01T12:00:00+01:00").offset());
    }

    #[test]
    fn meters_are_independent() {
        let mut t = IntervalTracker::new();
        t.update("1", 5, 0, ts("2024-03-01T12:00:00+00:00"));
        let w = t.update("2", 5, 0, ts("2024-03-01T13:00:00+00:00"));
        assert!(w.advanced);
        assert_eq!(t.get("1").unwrap().interval_start, ts("2024-03-01T12:00:00+00:00"));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn counter_restart_opens_new_interval() {
        /* Known limitation: a wrapped counter looks like any other new interval */
        let mut t = IntervalTracker::new();
        t.update("1", 255, 0, ts("2024-03-01T12:00:00+00:00"));
        let w = t.update("1", 0, 0, ts("2024-03-01T12:05:00+00:00"));
        assert!(w.advanced);
        assert_eq!(w.start, ts("2024-03-01T12:05:00+00:00"));
    }
}
