use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, Weekday};
use regex::Regex;
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::calendar::CalendarSettings;
use crate::calendar_math::{WEEKDAY_HEADERS, column_weekday, weekday_index};
use crate::task::{Recurrence, Task, TaskSummary, task_time_serde};
use crate::view::MonthView;

const URL_PATTERN: &str = r"https?://[\w/\-?=%.]+\.[\w/+\-?=%.~&\[\]#]+";

/// One day of `month --json` output.
#[derive(Debug, Serialize)]
struct DayEntry {
    month: u32,
    day: u32,
    tasks: Vec<TaskSummary>,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self {
            color: color && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, view))]
    pub fn print_month(&self, view: &MonthView, today: NaiveDate) -> anyhow::Result<()> {
        self.write_month(io::stdout().lock(), view, today)
    }

    pub fn write_month<W: Write>(&self, mut out: W, view: &MonthView, today: NaiveDate) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} {} - {}",
            view.month_name, view.year, view.calendar.name
        )?;

        let headers: Vec<String> = view.weekday_headers.iter().map(|h| format!("{h:>4}")).collect();
        writeln!(out, "{}", headers.join(" "))?;

        for week in &view.weeks {
            let cells: Vec<String> = week
                .iter()
                .map(|date| {
                    let marker = if view.tasks_on(*date).is_empty() { ' ' } else { '*' };
                    let cell = format!("{:>3}{marker}", date.day());
                    if *date == today {
                        self.paint(&cell, "7")
                    } else if date.month() != view.month {
                        self.paint(&cell, "90")
                    } else {
                        cell
                    }
                })
                .collect();
            writeln!(out, "{}", cells.join(" "))?;
        }
        writeln!(out)?;

        let mut rows = Vec::new();
        for date in view.weeks.iter().flatten() {
            for task in view.tasks_on(*date) {
                rows.push(vec![
                    date.format("%Y-%m-%d").to_string(),
                    time_span(task),
                    self.paint(&task.title, "1"),
                    rule_label(task, view.calendar.first_weekday),
                ]);
            }
        }

        if rows.is_empty() {
            writeln!(out, "No tasks.")?;
        } else {
            let headers = vec![
                "Date".to_string(),
                "Time".to_string(),
                "Title".to_string(),
                "Repeats".to_string(),
            ];
            write_table(&mut out, headers, rows)?;
        }
        writeln!(out)?;

        write!(
            out,
            "prev: {}  next: {}",
            nav_label(view.previous_month),
            nav_label(view.next_month)
        )?;
        if view.show_view_past_btn() {
            let toggle = if view.view_past_tasks {
                "past: shown (--hide-past)"
            } else {
                "past: hidden (--past)"
            };
            write!(out, "  {toggle}")?;
        }
        writeln!(out)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, view))]
    pub fn print_month_json(&self, view: &MonthView) -> anyhow::Result<()> {
        self.write_month_json(io::stdout().lock(), view)
    }

    /// Occurrences as `[{month, day, tasks: [short form]}]`, months and days
    /// ascending.
    pub fn write_month_json<W: Write>(&self, mut out: W, view: &MonthView) -> anyhow::Result<()> {
        let days: Vec<DayEntry> = view
            .occurrences
            .iter()
            .map(|(month, day, tasks)| DayEntry {
                month,
                day,
                tasks: tasks.iter().map(Task::summary).collect(),
            })
            .collect();
        serde_json::to_writer_pretty(&mut out, &days)?;
        writeln!(out)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, calendars))]
    pub fn print_calendars(&self, calendars: &[CalendarSettings]) -> anyhow::Result<()> {
        self.write_calendars(io::stdout().lock(), calendars)
    }

    pub fn write_calendars<W: Write>(&self, out: W, calendars: &[CalendarSettings]) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Years".to_string(),
            "Week starts".to_string(),
            "Zone".to_string(),
            "Past".to_string(),
        ];

        let rows = calendars
            .iter()
            .map(|calendar| {
                vec![
                    self.paint(&calendar.id.to_string(), "33"),
                    calendar.name.clone(),
                    format!("{}-{}", calendar.min_year, calendar.max_year),
                    WEEKDAY_HEADERS[usize::from(weekday_index(calendar.first_weekday))].to_string(),
                    calendar.time_zone.clone(),
                    if calendar.hide_past_tasks { "hidden" } else { "shown" }.to_string(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, task, calendar))]
    pub fn print_task_info(&self, task: &Task, calendar: &CalendarSettings) -> anyhow::Result<()> {
        self.write_task_info(io::stdout().lock(), task, calendar)
    }

    pub fn write_task_info<W: Write>(
        &self,
        mut out: W,
        task: &Task,
        calendar: &CalendarSettings,
    ) -> anyhow::Result<()> {
        let details = if calendar.auto_decorate_task_details_hyperlink {
            self.decorate_links(&task.details)?
        } else {
            task.details.clone()
        };

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "calendar  {} ({})", task.calendar_id, calendar.name)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "color     {}", task.color)?;
        writeln!(out, "details   {details}")?;
        if calendar.auto_decorate_task_details_hyperlink {
            for link in find_links(&task.details)? {
                writeln!(out, "link      {link}")?;
            }
        }
        writeln!(out, "start     {}", task.start_time.format(task_time_serde::FORMAT))?;
        writeln!(out, "end       {}", task.end_time.format(task_time_serde::FORMAT))?;
        writeln!(out, "all day   {}", if task.is_all_day { "yes" } else { "no" })?;
        writeln!(out, "repeats   {}", rule_label(task, calendar.first_weekday))?;
        if let Some(recurrence) = &task.recurrence {
            let (kind, subtype, value) = recurrence.codes();
            writeln!(out, "codes     type={kind:?} subtype={subtype:?} value={value}")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_json(&self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, &task.detail())?;
        writeln!(out)?;
        Ok(())
    }

    /// Underlines every URL in `details`.
    fn decorate_links(&self, details: &str) -> anyhow::Result<String> {
        let re = url_regex()?;
        Ok(re
            .replace_all(details, |caps: &regex::Captures<'_>| self.paint(&caps[0], "4;36"))
            .into_owned())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn time_span(task: &Task) -> String {
    if task.is_all_day {
        return "all day".to_string();
    }
    format!(
        "{}-{}",
        task.start_time.format("%H:%M"),
        task.end_time.format("%H:%M")
    )
}

fn url_regex() -> anyhow::Result<Regex> {
    Regex::new(URL_PATTERN).map_err(|e| anyhow!("internal regex compile failure: {e}"))
}

fn find_links(details: &str) -> anyhow::Result<Vec<String>> {
    let re = url_regex()?;
    Ok(re.find_iter(details).map(|m| m.as_str().to_string()).collect())
}

/// Weekday rules are named after the weekday their column holds in a grid
/// starting on `first_weekday`.
fn rule_label(task: &Task, first_weekday: Weekday) -> String {
    let weekday_name = |column: &u8| {
        let weekday = column_weekday(first_weekday, usize::from(*column));
        WEEKDAY_HEADERS[usize::from(weekday_index(weekday))].to_string()
    };
    match &task.recurrence {
        None => String::new(),
        Some(Recurrence::Weekly(column)) => format!("weekly {}", weekday_name(column)),
        Some(Recurrence::MonthlyByWeekday(column)) => format!("monthly first {}", weekday_name(column)),
        Some(Recurrence::MonthlyByDay(day)) => format!("monthly day {day}"),
        Some(Recurrence::Unrecognized { .. }) => "unrecognized".to_string(),
    }
}

fn nav_label(target: Option<(i32, u32)>) -> String {
    target
        .map(|(year, month)| format!("{year}-{month:02}"))
        .unwrap_or_else(|| "-".to_string())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
