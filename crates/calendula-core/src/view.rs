use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::calendar::{
    CalendarSettings, clamp_year_month, effective_view_past_tasks, next_month_link,
    previous_month_link,
};
use crate::calendar_math::{month_days, month_name, weekday_headers};
use crate::occurrence::{MonthRequest, OccurrenceMap, compute_occurrences};
use crate::query::{QueryWindow, TaskStore};
use crate::task::Task;

/// Everything needed to draw one month of one calendar.
#[derive(Debug, Clone)]
pub struct MonthView {
    pub calendar: CalendarSettings,
    pub year: i32,
    pub month: u32,
    pub month_name: &'static str,
    pub weekday_headers: [&'static str; 7],
    pub weeks: Vec<Vec<NaiveDate>>,
    pub view_past_tasks: bool,
    pub occurrences: OccurrenceMap,
    pub previous_month: Option<(i32, u32)>,
    pub next_month: Option<(i32, u32)>,
}

impl MonthView {
    /// Tasks for a grid cell. Cells are keyed by month and day only.
    pub fn tasks_on(&self, date: NaiveDate) -> &[Task] {
        self.occurrences.get(date.month(), date.day())
    }

    pub fn show_view_past_btn(&self) -> bool {
        self.calendar.show_view_past_btn && !self.calendar.hide_past_tasks
    }
}

#[tracing::instrument(skip(store, now))]
pub fn load_month_view<S>(
    store: &S,
    calendar_id: u64,
    year: i32,
    month: u32,
    requested_view_past: bool,
    now: NaiveDateTime,
) -> anyhow::Result<MonthView>
where
    S: TaskStore + ?Sized,
{
    let calendar = store
        .calendar(calendar_id)?
        .ok_or_else(|| anyhow!("calendar not found: {calendar_id}"))?;
    load_calendar_month(store, calendar, year, month, requested_view_past, now)
}

/// Same as [`load_month_view`] for a calendar the caller already loaded.
#[tracing::instrument(skip(store, calendar, now), fields(calendar = calendar.id))]
pub fn load_calendar_month<S>(
    store: &S,
    calendar: CalendarSettings,
    year: i32,
    month: u32,
    requested_view_past: bool,
    now: NaiveDateTime,
) -> anyhow::Result<MonthView>
where
    S: TaskStore + ?Sized,
{
    let (year, month) = clamp_year_month(&calendar, year, month);
    let view_past_tasks = effective_view_past_tasks(&calendar, requested_view_past);
    debug!(year, month, view_past_tasks, "resolved month request");

    let window = QueryWindow::for_month(year, month, view_past_tasks, now)
        .ok_or_else(|| anyhow!("cannot build a query window for {year}-{month:02}"))?;
    let (one_off, recurrent) = store.month_tasks(calendar.id, &window)?;

    let request = MonthRequest {
        first_weekday: calendar.first_weekday,
        year,
        month,
        view_past_tasks,
    };
    let occurrences = compute_occurrences(&request, now, &one_off, &recurrent);

    let weeks = month_days(year, month, calendar.first_weekday)
        .map(|days| {
            let days: Vec<NaiveDate> = days.collect();
            days.chunks(7).map(<[NaiveDate]>::to_vec).collect()
        })
        .unwrap_or_default();

    info!(
        calendar = calendar.id,
        year,
        month,
        one_off = one_off.len(),
        recurrent = recurrent.len(),
        occurrences = occurrences.occurrence_count(),
        "built month view"
    );

    Ok(MonthView {
        month_name: month_name(month).unwrap_or_default(),
        weekday_headers: weekday_headers(calendar.first_weekday),
        weeks,
        view_past_tasks,
        occurrences,
        previous_month: previous_month_link(&calendar, year, month),
        next_month: next_month_link(&calendar, year, month),
        year,
        month,
        calendar,
    })
}
