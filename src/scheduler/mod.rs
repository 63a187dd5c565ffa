//! Pure trigger decisions over the alarm list.
//!
//! Real deployments call [`due_alarms`] once per second. Neither function
//! mutates anything; the caller stamps `last_ring_time` on the alarms it
//! actually rings, which is what keeps a trigger from repeating within the
//! same calendar minute.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::models::Alarm;

/// Ids of the alarms that should start ringing at `now`.
///
/// An alarm is due when it is enabled, its repeat mask covers today (an
/// all-false mask means every day), and its hour/minute equal `now`'s with
/// second-level granularity ignored. Alarms whose `last_ring_time` falls in
/// the same calendar minute as `now` are skipped, so a once-per-second
/// caller gets at most one trigger per alarm per minute.
pub fn due_alarms(now: NaiveDateTime, alarms: &[Alarm]) -> Vec<String> {
    let weekday = now.weekday().num_days_from_sunday() as usize;
    let mut due = Vec::new();

    for alarm in alarms {
        if !alarm.is_enabled {
            continue;
        }

        let rings_today =
            alarm.repeat_days.iter().all(|day| !day) || alarm.repeat_days[weekday];
        if !rings_today {
            continue;
        }

        if u32::from(alarm.hour) != now.hour() || u32::from(alarm.minute) != now.minute() {
            continue;
        }

        if let Some(last) = alarm.last_ring_time {
            if same_calendar_minute(last, now) {
                continue;
            }
        }

        due.push(alarm.id.clone());
    }

    due
}

/// The enabled alarm that rings soonest in wall-clock order, treating a
/// time already passed today as tomorrow. Ties keep the first alarm in
/// input order. `None` when no alarm is enabled.
pub fn next_alarm(now: NaiveDateTime, alarms: &[Alarm]) -> Option<&Alarm> {
    let current = (now.hour() * 60 + now.minute()) as i64;
    let mut best: Option<(&Alarm, i64)> = None;

    for alarm in alarms.iter().filter(|alarm| alarm.is_enabled) {
        let mut diff = i64::from(alarm.wall_clock_minutes()) - current;
        if diff < 0 {
            diff += 24 * 60;
        }

        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((alarm, diff)),
        }
    }

    best.map(|(alarm, _)| alarm)
}

fn same_calendar_minute(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    a.date() == b.date() && a.hour() == b.hour() && a.minute() == b.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DismissMethod;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(y: i32, m: u32, d: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn alarm(hour: u8, minute: u8) -> Alarm {
        Alarm::new(
            "wake up",
            hour,
            minute,
            DismissMethod::Steps { required_steps: 20 },
            at(2024, 1, 1, 0, 0, 0),
        )
    }

    #[test]
    fn fires_in_matching_minute_regardless_of_weekday() {
        let alarms = vec![alarm(7, 0)];
        // 2024-03-04 is a Monday, 2024-03-10 a Sunday; all-false mask rings both.
        for day in [4, 10] {
            let due = due_alarms(at(2024, 3, day, 7, 0, 30), &alarms);
            assert_eq!(due, vec![alarms[0].id.clone()]);
        }
        assert!(due_alarms(at(2024, 3, 4, 7, 1, 0), &alarms).is_empty());
    }

    #[test]
    fn respects_repeat_mask() {
        let mut weekday_only = alarm(7, 0);
        weekday_only.repeat_days = [false, true, true, true, true, true, false];

        // Monday rings, Sunday does not.
        assert_eq!(due_alarms(at(2024, 3, 4, 7, 0, 0), &[weekday_only.clone()]).len(), 1);
        assert!(due_alarms(at(2024, 3, 10, 7, 0, 0), &[weekday_only]).is_empty());
    }

    #[test]
    fn disabled_alarms_never_fire() {
        let mut sleeping = alarm(7, 0);
        sleeping.is_enabled = false;
        assert!(due_alarms(at(2024, 3, 4, 7, 0, 0), &[sleeping]).is_empty());
    }

    #[test]
    fn never_fires_twice_within_the_same_minute() {
        let mut alarms = vec![alarm(7, 0)];
        let mut triggers = 0;

        for second in 0..60 {
            let now = at(2024, 3, 4, 7, 0, second);
            let due = due_alarms(now, &alarms);
            for id in &due {
                triggers += 1;
                // The caller's side of the contract: persist the stamp.
                let fired = alarms.iter_mut().find(|a| &a.id == id).unwrap();
                fired.last_ring_time = Some(now);
            }
        }

        assert_eq!(triggers, 1);
    }

    #[test]
    fn fires_again_in_a_new_minute_across_days() {
        let mut early = alarm(7, 0);
        early.last_ring_time = Some(at(2024, 3, 3, 7, 0, 10));
        // Same hour/minute yesterday does not suppress today's trigger.
        assert_eq!(due_alarms(at(2024, 3, 4, 7, 0, 10), &[early]).len(), 1);
    }

    #[test]
    fn next_alarm_wraps_past_midnight() {
        let alarms = vec![alarm(0, 5)];
        let next = next_alarm(at(2024, 3, 4, 23, 50, 0), &alarms).unwrap();
        assert_eq!((next.hour, next.minute), (0, 5));
    }

    #[test]
    fn next_alarm_is_stable_on_ties_and_none_when_all_disabled() {
        let first = alarm(6, 30);
        let second = alarm(6, 30);
        let tied = [first.clone(), second];
        let picked = next_alarm(at(2024, 3, 4, 1, 0, 0), &tied).unwrap();
        assert_eq!(picked.id, first.id);

        let mut off = alarm(6, 30);
        off.is_enabled = false;
        assert!(next_alarm(at(2024, 3, 4, 1, 0, 0), &[off]).is_none());
    }

    #[test]
    fn next_alarm_prefers_soonest() {
        let alarms = vec![alarm(22, 0), alarm(8, 15)];
        let next = next_alarm(at(2024, 3, 4, 21, 0, 0), &alarms).unwrap();
        assert_eq!((next.hour, next.minute), (22, 0));
    }
}
