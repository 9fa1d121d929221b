//! Date arithmetic for phase sequencing.
//!
//! Durations and gaps are caller-supplied `u32`s, so every shift is checked;
//! `None` means the result falls outside the supported calendar.

use chrono::{Days, NaiveDate};
use shared::Phase;

/// End date of a phase that starts on `start_date` and runs `duration_days`
pub fn end_date(start_date: NaiveDate, duration_days: u32) -> Option<NaiveDate> {
    start_date.checked_add_days(Days::new(u64::from(duration_days)))
}

/// `date` pushed forward by the mandatory gap between phases
pub fn after_gap(date: NaiveDate, gap_days: u32) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(u64::from(gap_days)))
}

/// Latest end date that still leaves `gap_days` before `next_start`
pub fn latest_allowed_end(next_start: NaiveDate, gap_days: u32) -> Option<NaiveDate> {
    next_start.checked_sub_days(Days::new(u64::from(gap_days)))
}

/// Phases ordered by their sequence number, without touching the caller's slice
pub fn in_sequence(phases: &[Phase]) -> Vec<&Phase> {
    let mut ordered: Vec<&Phase> = phases.iter().collect();
    ordered.sort_by_key(|phase| phase.phase_number);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::PhaseStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn phase(number: u32, start: NaiveDate, duration: u32) -> Phase {
        Phase {
            id: format!("phase::{}", number),
            project_id: "project::1".to_string(),
            phase_number: number,
            funding_goal: Decimal::from(100),
            start_date: start,
            end_date: end_date(start, duration).unwrap(),
            duration_days: duration,
            status: PhaseStatus::Plan,
        }
    }

    #[test]
    fn test_end_date_crosses_month() {
        assert_eq!(end_date(date(2026, 1, 25), 14), Some(date(2026, 2, 8)));
    }

    #[test]
    fn test_in_sequence_does_not_reorder_input() {
        let phases = vec![
            phase(2, date(2026, 5, 1), 30),
            phase(1, date(2026, 3, 1), 14),
        ];
        let ordered = in_sequence(&phases);
        assert_eq!(ordered[0].phase_number, 1);
        assert_eq!(phases[0].phase_number, 2);
    }

    #[test]
    fn test_latest_allowed_end() {
        assert_eq!(latest_allowed_end(date(2026, 4, 10), 7), Some(date(2026, 4, 3)));
    }

    #[test]
    fn test_shifts_past_the_calendar_are_none() {
        assert_eq!(end_date(date(2026, 4, 10), u32::MAX), None);
        assert_eq!(after_gap(NaiveDate::MAX, 1), None);
        assert_eq!(latest_allowed_end(NaiveDate::MIN, 7), None);
    }
}
