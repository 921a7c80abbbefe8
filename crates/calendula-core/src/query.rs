use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::calendar::CalendarSettings;
use crate::calendar_math::{next_month_and_year, previous_month_and_year};
use crate::task::Task;

/// Day of the previous month the padded window starts on.
const LEAD_DAY: u32 = 24;
/// Day of the next month the padded window ends before.
const TRAIL_DAY: u32 = 6;

/// Bounds a store must apply before handing tasks to the occurrence engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub lower: NaiveDateTime,
    pub upper: NaiveDateTime,
    pub recurrent_year: i32,
}

impl QueryWindow {
    /// With `view_past_tasks` off the lower bound is `now`, so past one-off
    /// tasks never reach the engine.
    pub fn for_month(
        year: i32,
        month: u32,
        view_past_tasks: bool,
        now: NaiveDateTime,
    ) -> Option<Self> {
        let lower = if view_past_tasks {
            let (m, y) = previous_month_and_year(year, month)?;
            NaiveDate::from_ymd_opt(y, m, LEAD_DAY)?.and_hms_opt(0, 0, 0)?
        } else {
            now
        };
        let (m, y) = next_month_and_year(year, month)?;
        let upper = NaiveDate::from_ymd_opt(y, m, TRAIL_DAY)?.and_hms_opt(0, 0, 0)?;

        Some(Self {
            lower,
            upper,
            recurrent_year: year,
        })
    }

    pub fn admits_one_off(&self, task: &Task) -> bool {
        !task.is_recurrent() && task.end_time >= self.lower && task.start_time < self.upper
    }

    pub fn admits_recurrent(&self, task: &Task) -> bool {
        task.is_recurrent() && task.start_time.year() == self.recurrent_year
    }
}

/// Source of calendars and tasks. The engine only needs the two task query shapes.
pub trait TaskStore {
    fn calendars(&self) -> anyhow::Result<Vec<CalendarSettings>>;

    fn calendar(&self, calendar_id: u64) -> anyhow::Result<Option<CalendarSettings>> {
        Ok(self
            .calendars()?
            .into_iter()
            .find(|calendar| calendar.id == calendar_id))
    }

    fn task(&self, calendar_id: u64, task_id: u64) -> anyhow::Result<Option<Task>>;

    /// One-off tasks of the calendar overlapping `window`.
    fn one_off_tasks(&self, calendar_id: u64, window: &QueryWindow) -> anyhow::Result<Vec<Task>>;

    /// Recurring tasks of the calendar whose start falls in `window.recurrent_year`.
    fn recurrent_tasks(&self, calendar_id: u64, window: &QueryWindow) -> anyhow::Result<Vec<Task>>;

    /// `(one_off, recurrent)` for one month. Stores that read every task in
    /// one pass override this to avoid reading twice.
    fn month_tasks(
        &self,
        calendar_id: u64,
        window: &QueryWindow,
    ) -> anyhow::Result<(Vec<Task>, Vec<Task>)> {
        Ok((
            self.one_off_tasks(calendar_id, window)?,
            self.recurrent_tasks(calendar_id, window)?,
        ))
    }
}
