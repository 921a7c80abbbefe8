use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use tracing::trace;

use crate::calendar_math::month_days_with_weekday;
use crate::task::{Recurrence, Task};

/// One (calendar, month) computation. `view_past_tasks` must already be the
/// effective value for the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRequest {
    pub first_weekday: Weekday,
    pub year: i32,
    pub month: u32,
    pub view_past_tasks: bool,
}

/// month -> day -> tasks, in insertion order within a day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrenceMap {
    months: BTreeMap<u32, BTreeMap<u32, Vec<Task>>>,
}

impl OccurrenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, month: u32, day: u32) -> &[Task] {
        self.months
            .get(&month)
            .and_then(|days| days.get(&day))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn months(&self) -> impl Iterator<Item = u32> + '_ {
        self.months.keys().copied()
    }

    pub fn days(&self, month: u32) -> impl Iterator<Item = (u32, &[Task])> + '_ {
        self.months
            .get(&month)
            .into_iter()
            .flat_map(|days| days.iter().map(|(day, tasks)| (*day, tasks.as_slice())))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &[Task])> + '_ {
        self.months.iter().flat_map(|(month, days)| {
            days.iter()
                .map(move |(day, tasks)| (*month, *day, tasks.as_slice()))
        })
    }

    pub fn occurrence_count(&self) -> usize {
        self.months
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

/// Appends `task` under `month`/`day`. With `view_past_tasks` off the
/// occurrence is dropped when the task's end time-of-day on that date, taken
/// in the current year, is already behind `now`.
pub fn add_occurrence(
    map: &mut OccurrenceMap,
    day: u32,
    month: u32,
    task: &Task,
    view_past_tasks: bool,
    now: NaiveDateTime,
) {
    if !view_past_tasks {
        match occurrence_end(now.year(), month, day, task) {
            Some(end) if end < now => {
                trace!(task = task.id, month, day, %end, "occurrence already ended; hidden");
                return;
            }
            Some(_) => {}
            None => {
                trace!(task = task.id, month, day, "no such date this year; keeping occurrence");
            }
        }
    }

    map.months
        .entry(month)
        .or_default()
        .entry(day)
        .or_default()
        .push(task.clone());
}

fn occurrence_end(year: i32, month: u32, day: u32, task: &Task) -> Option<NaiveDateTime> {
    let end = task.end_time;
    let time = NaiveTime::from_hms_opt(end.hour(), end.minute(), end.second())?;
    NaiveDate::from_ymd_opt(year, month, day).map(|date| date.and_time(time))
}

/// Places one-off tasks on their start day and expands recurring tasks across
/// the requested month's grid.
pub fn compute_occurrences(
    request: &MonthRequest,
    now: NaiveDateTime,
    one_off_tasks: &[Task],
    recurrent_tasks: &[Task],
) -> OccurrenceMap {
    let mut map = OccurrenceMap::new();

    for task in one_off_tasks {
        add_occurrence(
            &mut map,
            task.start_time.day(),
            task.start_time.month(),
            task,
            true,
            now,
        );
    }

    let weeks = month_days_with_weekday(request.year, request.month, request.first_weekday);
    for (task, rule) in recurrent_tasks
        .iter()
        .filter_map(|task| task.recurrence.as_ref().map(|rule| (task, rule)))
    {
        let mut monthly_repetition_done = false;
        for week in &weeks {
            for (col, &day) in week.iter().enumerate() {
                if day == 0 {
                    continue;
                }
                let fires = match rule {
                    Recurrence::Weekly(target) => usize::from(*target) == col,
                    Recurrence::MonthlyByWeekday(target) => {
                        if !monthly_repetition_done && usize::from(*target) == col {
                            monthly_repetition_done = true;
                            true
                        } else {
                            false
                        }
                    }
                    Recurrence::MonthlyByDay(target) => *target == day,
                    Recurrence::Unrecognized { .. } => false,
                };
                if fires {
                    add_occurrence(
                        &mut map,
                        day,
                        request.month,
                        task,
                        request.view_past_tasks,
                        now,
                    );
                }
            }
        }
    }

    trace!(
        year = request.year,
        month = request.month,
        one_off = one_off_tasks.len(),
        recurrent = recurrent_tasks.len(),
        occurrences = map.occurrence_count(),
        "computed occurrences"
    );
    map
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Weekday};

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid datetime")
    }

    fn recurring(id: u64, rule: Recurrence, end_hour: u32) -> Task {
        Task::recurring(
            id,
            1,
            format!("rule {id}"),
            at(2024, 1, 1, end_hour.saturating_sub(1), 0),
            at(2024, 1, 1, end_hour, 0),
            rule,
        )
    }

    fn request(year: i32, month: u32, view_past_tasks: bool) -> MonthRequest {
        MonthRequest {
            first_weekday: Weekday::Mon,
            year,
            month,
            view_past_tasks,
        }
    }

    fn days_with(map: &OccurrenceMap, month: u32, id: u64) -> Vec<u32> {
        map.days(month)
            .filter(|(_, tasks)| tasks.iter().any(|t| t.id == id))
            .map(|(day, _)| day)
            .collect()
    }

    #[test]
    fn june_2024_example() {
        let now = at(2024, 6, 1, 0, 0);
        let a = Task::one_off(1, 1, "A".to_string(), at(2024, 6, 10, 9, 0), at(2024, 6, 10, 10, 0));
        let b = recurring(2, Recurrence::Weekly(2), 10);

        let map = compute_occurrences(&request(2024, 6, true), now, &[a.clone()], &[b.clone()]);

        assert_eq!(map.get(6, 10), &[a]);
        for day in [5, 12, 19, 26] {
            assert_eq!(map.get(6, day), &[b.clone()]);
        }
        assert_eq!(map.occurrence_count(), 5);
        assert_eq!(map.months().collect::<Vec<_>>(), vec![6]);
    }

    #[test]
    fn weekly_rule_fires_on_every_matching_weekday() {
        let now = at(2024, 1, 1, 0, 0);
        // July 2024 has five Mondays, February 2024 four.
        let task = recurring(1, Recurrence::Weekly(0), 10);
        let july = compute_occurrences(&request(2024, 7, true), now, &[], &[task.clone()]);
        assert_eq!(days_with(&july, 7, 1), vec![1, 8, 15, 22, 29]);

        let february = compute_occurrences(&request(2024, 2, true), now, &[], &[task]);
        assert_eq!(days_with(&february, 2, 1), vec![5, 12, 19, 26]);
    }

    #[test]
    fn monthly_by_weekday_fires_on_first_match_only() {
        let now = at(2024, 1, 1, 0, 0);
        let task = recurring(1, Recurrence::MonthlyByWeekday(1), 10);
        let map = compute_occurrences(&request(2024, 10, true), now, &[], &[task]);
        assert_eq!(days_with(&map, 10, 1), vec![1]);
        assert_eq!(map.occurrence_count(), 1);
    }

    #[test]
    fn monthly_by_weekday_skips_cells_of_adjacent_months() {
        let now = at(2024, 1, 1, 0, 0);
        // June 2024 grid starts on Monday May 27; the first June Monday is the 3rd.
        let task = recurring(1, Recurrence::MonthlyByWeekday(0), 10);
        let map = compute_occurrences(&request(2024, 6, true), now, &[], &[task]);
        assert_eq!(days_with(&map, 6, 1), vec![3]);
    }

    #[test]
    fn monthly_by_day_skips_short_months() {
        let now = at(2024, 1, 1, 0, 0);
        let task = recurring(1, Recurrence::MonthlyByDay(31), 10);

        let april = compute_occurrences(&request(2024, 4, true), now, &[], &[task.clone()]);
        assert!(april.is_empty());

        let may = compute_occurrences(&request(2024, 5, true), now, &[], &[task]);
        assert_eq!(days_with(&may, 5, 1), vec![31]);
    }

    #[test]
    fn unrecognized_rules_produce_nothing() {
        let now = at(2024, 1, 1, 0, 0);
        let task = recurring(1, Recurrence::from_codes("x", "", 3), 10);
        let map = compute_occurrences(&request(2024, 6, true), now, &[], &[task]);
        assert!(map.is_empty());
    }

    #[test]
    fn weekday_rules_follow_grid_column_under_sunday_start() {
        let now = at(2024, 1, 1, 0, 0);
        let sunday_first = MonthRequest {
            first_weekday: Weekday::Sun,
            ..request(2024, 6, true)
        };
        // Column 2 of a Sunday-first grid holds the Tuesdays.
        let weekly = recurring(1, Recurrence::Weekly(2), 10);
        let map = compute_occurrences(&sunday_first, now, &[], &[weekly]);
        assert_eq!(days_with(&map, 6, 1), vec![4, 11, 18, 25]);

        let monthly = recurring(2, Recurrence::MonthlyByWeekday(0), 10);
        let map = compute_occurrences(&sunday_first, now, &[], &[monthly]);
        assert_eq!(days_with(&map, 6, 2), vec![2]);
    }

    #[test]
    fn past_occurrences_hidden_per_day() {
        let now = at(2024, 3, 15, 12, 0);
        // 2024-03-15 is a Friday.
        let task = recurring(1, Recurrence::Weekly(4), 10);
        let map = compute_occurrences(&request(2024, 3, false), now, &[], &[task]);
        assert_eq!(days_with(&map, 3, 1), vec![22, 29]);
    }

    #[test]
    fn later_end_time_keeps_todays_occurrence() {
        let now = at(2024, 3, 15, 12, 0);
        let task = recurring(1, Recurrence::Weekly(4), 18);
        let map = compute_occurrences(&request(2024, 3, false), now, &[], &[task]);
        assert_eq!(days_with(&map, 3, 1), vec![15, 22, 29]);
    }

    #[test]
    fn one_off_tasks_are_never_refiltered() {
        let now = at(2024, 3, 15, 12, 0);
        let earlier = Task::one_off(1, 1, "earlier".to_string(), at(2024, 3, 15, 8, 0), at(2024, 3, 15, 13, 0));
        let map = compute_occurrences(&request(2024, 3, false), now, &[earlier], &[]);
        assert_eq!(map.get(3, 15).len(), 1);
    }

    #[test]
    fn one_off_tasks_from_adjacent_months_keep_their_month() {
        let now = at(2024, 6, 1, 0, 0);
        let spill = Task::one_off(1, 1, "spill".to_string(), at(2024, 5, 28, 9, 0), at(2024, 5, 28, 10, 0));
        let map = compute_occurrences(&request(2024, 6, true), now, &[spill], &[]);
        assert_eq!(map.get(5, 28).len(), 1);
        assert!(map.get(6, 28).is_empty());
    }

    #[test]
    fn insertion_order_follows_processing_order() {
        let now = at(2024, 6, 1, 0, 0);
        let late = Task::one_off(1, 1, "late".to_string(), at(2024, 6, 5, 20, 0), at(2024, 6, 5, 21, 0));
        let early = Task::one_off(2, 1, "early".to_string(), at(2024, 6, 5, 7, 0), at(2024, 6, 5, 8, 0));
        let weekly = recurring(3, Recurrence::Weekly(2), 6);

        let map = compute_occurrences(&request(2024, 6, true), now, &[late, early], &[weekly]);
        let ids: Vec<u64> = map.get(6, 5).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn identical_inputs_give_identical_maps() {
        let now = at(2024, 6, 1, 0, 0);
        let one_off = vec![Task::one_off(1, 1, "A".to_string(), at(2024, 6, 10, 9, 0), at(2024, 6, 10, 10, 0))];
        let recurrent = vec![
            recurring(2, Recurrence::Weekly(2), 10),
            recurring(3, Recurrence::MonthlyByDay(15), 10),
        ];
        let first = compute_occurrences(&request(2024, 6, false), now, &one_off, &recurrent);
        let second = compute_occurrences(&request(2024, 6, false), now, &one_off, &recurrent);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_date_in_current_year_keeps_occurrence() {
        // Viewing February 2024 from 2025: the 29th has no counterpart this year.
        let now = at(2025, 3, 1, 12, 0);
        let task = recurring(1, Recurrence::MonthlyByDay(29), 10);
        let map = compute_occurrences(
            &MonthRequest {
                first_weekday: Weekday::Mon,
                year: 2024,
                month: 2,
                view_past_tasks: false,
            },
            now,
            &[],
            &[task],
        );
        assert_eq!(days_with(&map, 2, 1), vec![29]);
    }
}
