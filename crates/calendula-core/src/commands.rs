use anyhow::anyhow;
use chrono::{Datelike, NaiveDateTime, Weekday};
use tracing::{debug, info, instrument};

use crate::calendar::CalendarSettings;
use crate::datastore::DataStore;
use crate::task::{Recurrence, Task};

/// Field changes for a task. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub color: Option<String>,
    pub details: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub is_all_day: Option<bool>,
    /// `Some(None)` turns a recurring task into a one-off.
    pub recurrence: Option<Option<Recurrence>>,
}

impl TaskEdit {
    pub fn apply(self, task: Task) -> Task {
        Task {
            title: self.title.map(|t| t.trim().to_string()).unwrap_or(task.title),
            color: self.color.unwrap_or(task.color),
            details: self.details.unwrap_or(task.details),
            start_time: self.start_time.unwrap_or(task.start_time),
            end_time: self.end_time.unwrap_or(task.end_time),
            is_all_day: self.is_all_day.unwrap_or(task.is_all_day),
            recurrence: self.recurrence.unwrap_or(task.recurrence),
            ..task
        }
    }
}

/// Field changes for a calendar. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub time_zone: Option<String>,
    pub first_weekday: Option<Weekday>,
    pub show_view_past_btn: Option<bool>,
    pub auto_decorate_task_details_hyperlink: Option<bool>,
    pub hide_past_tasks: Option<bool>,
}

impl CalendarEdit {
    pub fn apply(self, calendar: CalendarSettings) -> CalendarSettings {
        CalendarSettings {
            name: self.name.unwrap_or(calendar.name),
            description: self.description.unwrap_or(calendar.description),
            min_year: self.min_year.unwrap_or(calendar.min_year),
            max_year: self.max_year.unwrap_or(calendar.max_year),
            time_zone: self.time_zone.unwrap_or(calendar.time_zone),
            first_weekday: self.first_weekday.unwrap_or(calendar.first_weekday),
            show_view_past_btn: self
                .show_view_past_btn
                .unwrap_or(calendar.show_view_past_btn),
            auto_decorate_task_details_hyperlink: self
                .auto_decorate_task_details_hyperlink
                .unwrap_or(calendar.auto_decorate_task_details_hyperlink),
            hide_past_tasks: self.hide_past_tasks.unwrap_or(calendar.hide_past_tasks),
            ..calendar
        }
    }
}

fn validate_task(task: &Task) -> anyhow::Result<()> {
    if task.title.is_empty() {
        return Err(anyhow!("task title cannot be empty"));
    }
    if task.end_time < task.start_time {
        return Err(anyhow!(
            "task ends ({}) before it starts ({})",
            task.end_time,
            task.start_time
        ));
    }
    if let Some(Recurrence::Unrecognized { .. }) = task.recurrence {
        return Err(anyhow!("unrecognized repetition rule"));
    }
    Ok(())
}

fn require_calendar(store: &DataStore, calendar_id: u64) -> anyhow::Result<CalendarSettings> {
    store
        .load_calendars()?
        .into_iter()
        .find(|c| c.id == calendar_id)
        .ok_or_else(|| anyhow!("calendar not found: {calendar_id}"))
}

fn task_position(tasks: &[Task], calendar_id: u64, task_id: u64) -> anyhow::Result<usize> {
    tasks
        .iter()
        .position(|t| t.id == task_id && t.calendar_id == calendar_id)
        .ok_or_else(|| anyhow!("task {task_id} not found in calendar {calendar_id}"))
}

/// Creates a task in `calendar_id`. A missing end time defaults to the start.
#[instrument(skip(store, edit))]
pub fn add_task(store: &DataStore, calendar_id: u64, edit: TaskEdit) -> anyhow::Result<Task> {
    info!("command task add");
    require_calendar(store, calendar_id)?;

    let mut tasks = store.load_tasks()?;
    let start_time = edit
        .start_time
        .ok_or_else(|| anyhow!("a new task needs a start time"))?;
    let title = edit.title.clone().unwrap_or_default();

    let blank = Task::one_off(
        store.next_task_id(&tasks),
        calendar_id,
        title,
        start_time,
        edit.end_time.unwrap_or(start_time),
    );
    let task = edit.apply(blank);
    validate_task(&task)?;

    tasks.push(task.clone());
    store.save_tasks(&tasks)?;
    debug!(id = task.id, count = tasks.len(), "task added");
    Ok(task)
}

#[instrument(skip(store, edit))]
pub fn modify_task(
    store: &DataStore,
    calendar_id: u64,
    task_id: u64,
    edit: TaskEdit,
) -> anyhow::Result<Task> {
    info!("command task modify");
    let mut tasks = store.load_tasks()?;
    let idx = task_position(&tasks, calendar_id, task_id)?;

    let task = edit.apply(tasks[idx].clone());
    validate_task(&task)?;
    tasks[idx] = task.clone();

    store.save_tasks(&tasks)?;
    Ok(task)
}

#[instrument(skip(store))]
pub fn delete_task(store: &DataStore, calendar_id: u64, task_id: u64) -> anyhow::Result<Task> {
    info!("command task delete");
    let mut tasks = store.load_tasks()?;
    let idx = task_position(&tasks, calendar_id, task_id)?;

    let removed = tasks.remove(idx);
    store.save_tasks(&tasks)?;
    Ok(removed)
}

/// Moves a task to another day of the same month, keeping its times.
#[instrument(skip(store))]
pub fn move_task_day(
    store: &DataStore,
    calendar_id: u64,
    task_id: u64,
    day: u32,
) -> anyhow::Result<Task> {
    info!("command task move-day");
    let mut tasks = store.load_tasks()?;
    let idx = task_position(&tasks, calendar_id, task_id)?;
    let task = &tasks[idx];

    let start_time = task.start_time.with_day(day);
    let end_time = task.end_time.with_day(day);
    let (Some(start_time), Some(end_time)) = (start_time, end_time) else {
        return Err(anyhow!(
            "day {day} does not exist in the month of task {task_id}"
        ));
    };

    let moved = Task {
        start_time,
        end_time,
        ..task.clone()
    };
    validate_task(&moved)?;
    tasks[idx] = moved.clone();

    store.save_tasks(&tasks)?;
    Ok(moved)
}

/// Stores `settings` under a fresh id; the id it carries is ignored.
#[instrument(skip(store, settings))]
pub fn add_calendar(store: &DataStore, settings: CalendarSettings) -> anyhow::Result<CalendarSettings> {
    info!("command calendar add");
    let mut calendars = store.load_calendars()?;
    let calendar = CalendarSettings {
        id: store.next_calendar_id(&calendars),
        ..settings
    };
    calendar.validate()?;

    calendars.push(calendar.clone());
    store.save_calendars(&calendars)?;
    debug!(id = calendar.id, "calendar added");
    Ok(calendar)
}

#[instrument(skip(store, edit))]
pub fn modify_calendar(
    store: &DataStore,
    calendar_id: u64,
    edit: CalendarEdit,
) -> anyhow::Result<CalendarSettings> {
    info!("command calendar modify");
    let mut calendars = store.load_calendars()?;
    let slot = calendars
        .iter_mut()
        .find(|c| c.id == calendar_id)
        .ok_or_else(|| anyhow!("calendar not found: {calendar_id}"))?;

    let calendar = edit.apply(slot.clone());
    calendar.validate()?;
    *slot = calendar.clone();

    store.save_calendars(&calendars)?;
    Ok(calendar)
}

/// Removes the calendar and every task it owns. Returns the removed calendar
/// and the number of tasks dropped with it.
#[instrument(skip(store))]
pub fn delete_calendar(
    store: &DataStore,
    calendar_id: u64,
) -> anyhow::Result<(CalendarSettings, usize)> {
    info!("command calendar delete");
    let mut calendars = store.load_calendars()?;
    let idx = calendars
        .iter()
        .position(|c| c.id == calendar_id)
        .ok_or_else(|| anyhow!("calendar not found: {calendar_id}"))?;
    let removed = calendars.remove(idx);

    let tasks = store.load_tasks()?;
    let before = tasks.len();
    let kept: Vec<Task> = tasks
        .into_iter()
        .filter(|t| t.calendar_id != calendar_id)
        .collect();
    let dropped = before - kept.len();

    if dropped > 0 {
        store.save_tasks(&kept)?;
    }
    store.save_calendars(&calendars)?;
    info!(calendar = calendar_id, dropped, "calendar deleted");
    Ok((removed, dropped))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid datetime")
    }

    #[test]
    fn edit_only_touches_given_fields() {
        let task = Task::one_off(1, 1, "Old".to_string(), at(1, 9), at(1, 10));
        let edited = TaskEdit {
            title: Some("  New ".to_string()),
            recurrence: Some(Some(Recurrence::Weekly(3))),
            ..TaskEdit::default()
        }
        .apply(task.clone());

        assert_eq!(edited.title, "New");
        assert_eq!(edited.recurrence, Some(Recurrence::Weekly(3)));
        assert_eq!(edited.start_time, task.start_time);
        assert_eq!(edited.id, 1);
    }

    #[test]
    fn validation_rejects_bad_tasks() {
        let ok = Task::one_off(1, 1, "ok".to_string(), at(1, 9), at(1, 10));
        assert!(validate_task(&ok).is_ok());

        let backwards = Task {
            end_time: at(1, 8),
            ..ok.clone()
        };
        assert!(validate_task(&backwards).is_err());

        let untitled = Task {
            title: String::new(),
            ..ok.clone()
        };
        assert!(validate_task(&untitled).is_err());

        let odd_rule = Task {
            recurrence: Some(Recurrence::from_codes("x", "", 1)),
            ..ok
        };
        assert!(validate_task(&odd_rule).is_err());
    }

    #[test]
    fn calendar_edit_keeps_id() {
        let calendar = CalendarSettings::new(5, "Home".to_string());
        let edited = CalendarEdit {
            first_weekday: Some(Weekday::Sun),
            hide_past_tasks: Some(true),
            ..CalendarEdit::default()
        }
        .apply(calendar);
        assert_eq!(edited.id, 5);
        assert_eq!(edited.first_weekday, Weekday::Sun);
        assert!(edited.hide_past_tasks);
        assert_eq!(edited.name, "Home");
    }
}
