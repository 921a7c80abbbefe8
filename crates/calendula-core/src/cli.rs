use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::{NaiveDateTime, Weekday};
use clap::builder::ValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use regex::Regex;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::calendar_math::weekday_from_index;
use crate::commands::{CalendarEdit, TaskEdit};
use crate::config::parse_bool;
use crate::task::{Recurrence, task_time_serde};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

/// `YYYY-MM` as typed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl std::str::FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^(?P<year>\d{4})-(?P<month>\d{1,2})$")
            .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

        let caps = re
            .captures(s.trim())
            .ok_or_else(|| anyhow!("expected YYYY-MM, got: {s}"))?;
        let year = caps["year"].parse::<i32>()?;
        let month = caps["month"].parse::<u32>()?;
        if !(1..=12).contains(&month) {
            return Err(anyhow!("month must be 1-12, got: {month}"));
        }
        Ok(Self { year, month })
    }
}

/// `--repeat` value: `weekly:COL`, `monthly-weekday:COL`, `monthly-day:DAY`
/// or `none`. Weekday rules name a grid column counted from the calendar's
/// first weekday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatRule(pub Option<Recurrence>);

impl std::str::FromStr for RepeatRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self(None));
        }

        let re = Regex::new(r"^(?P<kind>weekly|monthly-weekday|monthly-day):(?P<value>\d{1,2})$")
            .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
        let caps = re
            .captures(trimmed)
            .ok_or_else(|| anyhow!("expected weekly:N, monthly-weekday:N, monthly-day:N or none, got: {s}"))?;
        let value = caps["value"].parse::<i32>()?;
        let rule = match &caps["kind"] {
            "weekly" => Recurrence::from_codes("w", "", value),
            "monthly-weekday" => Recurrence::from_codes("m", "w", value),
            _ => Recurrence::from_codes("m", "m", value),
        };
        if let Recurrence::Unrecognized { .. } = rule {
            return Err(anyhow!("repeat value out of range: {s}"));
        }
        Ok(Self(Some(rule)))
    }
}

fn parse_switch(s: &str) -> anyhow::Result<bool> {
    parse_bool(s).ok_or_else(|| anyhow!("expected on/off, got: {s}"))
}

fn parse_week_start(s: &str) -> anyhow::Result<Weekday> {
    s.trim()
        .parse::<u8>()
        .ok()
        .and_then(weekday_from_index)
        .ok_or_else(|| anyhow!("week start must be 0 (Monday) to 6 (Sunday), got: {s}"))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "calendula",
    version,
    about = "Calendula: month views of one-off and recurring tasks",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file", global = true)]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show one month of a calendar.
    Month(MonthArgs),
    /// List configured calendars.
    Calendars,
    /// Create, change or remove a calendar.
    Calendar {
        #[command(subcommand)]
        action: CalendarAction,
    },
    /// Show, create, change or remove a task.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskAction {
    /// Show one task in full.
    Show {
        id: u64,
        #[arg(long = "calendar")]
        calendar: Option<u64>,
        /// Print the long form as JSON.
        #[arg(long = "json")]
        json: bool,
    },
    Add {
        #[arg(long = "calendar")]
        calendar: Option<u64>,
        #[command(flatten)]
        fields: TaskFields,
    },
    Modify {
        id: u64,
        #[arg(long = "calendar")]
        calendar: Option<u64>,
        #[command(flatten)]
        fields: TaskFields,
    },
    Delete {
        id: u64,
        #[arg(long = "calendar")]
        calendar: Option<u64>,
    },
    /// Move a task to another day of its month, keeping its times.
    MoveDay {
        id: u64,
        day: u32,
        #[arg(long = "calendar")]
        calendar: Option<u64>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TaskFields {
    #[arg(long = "title")]
    pub title: Option<String>,

    #[arg(long = "color")]
    pub color: Option<String>,

    #[arg(long = "details")]
    pub details: Option<String>,

    /// `YYYY-MM-DD HH:MM[:SS]`
    #[arg(long = "start", value_parser = ValueParser::new(task_time_serde::parse))]
    pub start: Option<NaiveDateTime>,

    #[arg(long = "end", value_parser = ValueParser::new(task_time_serde::parse))]
    pub end: Option<NaiveDateTime>,

    #[arg(long = "all-day", conflicts_with = "timed")]
    pub all_day: bool,

    #[arg(long = "timed")]
    pub timed: bool,

    #[arg(long = "repeat", value_parser = ValueParser::new(|s: &str| s.parse::<RepeatRule>()))]
    pub repeat: Option<RepeatRule>,
}

impl TaskFields {
    pub fn into_edit(self) -> TaskEdit {
        let is_all_day = if self.all_day {
            Some(true)
        } else if self.timed {
            Some(false)
        } else {
            None
        };

        TaskEdit {
            title: self.title,
            color: self.color,
            details: self.details,
            start_time: self.start,
            end_time: self.end,
            is_all_day,
            recurrence: self.repeat.map(|rule| rule.0),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum CalendarAction {
    Add {
        name: String,
        #[command(flatten)]
        fields: CalendarFields,
    },
    Modify {
        id: u64,
        #[arg(long = "name")]
        name: Option<String>,
        #[command(flatten)]
        fields: CalendarFields,
    },
    /// Remove a calendar together with its tasks.
    Delete { id: u64 },
}

#[derive(Args, Debug, Clone, Default)]
pub struct CalendarFields {
    #[arg(long = "description")]
    pub description: Option<String>,

    #[arg(long = "min-year")]
    pub min_year: Option<i32>,

    #[arg(long = "max-year")]
    pub max_year: Option<i32>,

    /// IANA zone, e.g. `Europe/Madrid`.
    #[arg(long = "time-zone")]
    pub time_zone: Option<String>,

    /// 0 (Monday) to 6 (Sunday).
    #[arg(long = "week-start", value_parser = ValueParser::new(parse_week_start))]
    pub week_start: Option<Weekday>,

    #[arg(long = "view-past-button", value_parser = ValueParser::new(parse_switch))]
    pub view_past_button: Option<bool>,

    #[arg(long = "decorate-links", value_parser = ValueParser::new(parse_switch))]
    pub decorate_links: Option<bool>,

    #[arg(long = "hide-past-tasks", value_parser = ValueParser::new(parse_switch))]
    pub hide_past_tasks: Option<bool>,
}

impl CalendarFields {
    pub fn into_edit(self, name: Option<String>) -> CalendarEdit {
        CalendarEdit {
            name,
            description: self.description,
            min_year: self.min_year,
            max_year: self.max_year,
            time_zone: self.time_zone,
            first_weekday: self.week_start,
            show_view_past_btn: self.view_past_button,
            auto_decorate_task_details_hyperlink: self.decorate_links,
            hide_past_tasks: self.hide_past_tasks,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct MonthArgs {
    /// Month to show as YYYY-MM.
    #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<YearMonth>()))]
    pub date: Option<YearMonth>,

    #[arg(long = "calendar")]
    pub calendar: Option<u64>,

    #[arg(long = "year", conflicts_with = "date")]
    pub year: Option<i32>,

    #[arg(long = "month", conflicts_with = "date")]
    pub month: Option<u32>,

    /// Include occurrences that already ended.
    #[arg(long = "past", conflicts_with = "hide_past")]
    pub past: bool,

    #[arg(long = "hide-past")]
    pub hide_past: bool,

    /// Print the occurrences as JSON instead of the grid.
    #[arg(long = "json")]
    pub json: bool,
}

impl MonthArgs {
    /// `Some` only when the user chose explicitly.
    pub fn view_past(&self) -> Option<bool> {
        if self.past {
            Some(true)
        } else if self.hide_past {
            Some(false)
        } else {
            None
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                rest.split_once(':')
                    .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
