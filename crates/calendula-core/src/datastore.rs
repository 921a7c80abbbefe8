use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::calendar::CalendarSettings;
use crate::query::{QueryWindow, TaskStore};
use crate::task::Task;

/// A data directory holding `calendars.toml` and `tasks.data` (one JSON task
/// per line). Writes replace the whole file atomically.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub calendars_path: PathBuf,
    pub tasks_path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CalendarsFile {
    #[serde(default, rename = "calendar")]
    calendars: Vec<CalendarSettings>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let calendars_path = data_dir.join("calendars.toml");
        let tasks_path = data_dir.join("tasks.data");

        info!(
            data_dir = %data_dir.display(),
            calendars = %calendars_path.display(),
            tasks = %tasks_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            calendars_path,
            tasks_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_calendars(&self) -> anyhow::Result<Vec<CalendarSettings>> {
        if !self.calendars_path.exists() {
            warn!(file = %self.calendars_path.display(), "no calendars file; no calendars defined");
            return Ok(vec![]);
        }

        let raw = fs::read_to_string(&self.calendars_path)
            .with_context(|| format!("failed reading {}", self.calendars_path.display()))?;
        let parsed: CalendarsFile = toml::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.calendars_path.display()))?;

        debug!(count = parsed.calendars.len(), "loaded calendars");
        Ok(parsed.calendars)
    }

    #[tracing::instrument(skip(self, calendars))]
    pub fn save_calendars(&self, calendars: &[CalendarSettings]) -> anyhow::Result<()> {
        let file = CalendarsFile {
            calendars: calendars.to_vec(),
        };
        let rendered = toml::to_string(&file).context("failed to serialize calendars")?;
        write_atomic(&self.calendars_path, rendered.as_bytes())
            .context("failed to save calendars.toml")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        if !self.tasks_path.exists() {
            debug!(file = %self.tasks_path.display(), "no tasks file");
            return Ok(vec![]);
        }
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    pub fn next_task_id(&self, tasks: &[Task]) -> u64 {
        tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    pub fn next_calendar_id(&self, calendars: &[CalendarSettings]) -> u64 {
        calendars.iter().map(|c| c.id).max().unwrap_or(0) + 1
    }

    fn calendar_tasks(&self, calendar_id: u64) -> anyhow::Result<impl Iterator<Item = Task>> {
        Ok(self
            .load_tasks()?
            .into_iter()
            .filter(move |task| task.calendar_id == calendar_id))
    }
}

impl TaskStore for DataStore {
    fn calendars(&self) -> anyhow::Result<Vec<CalendarSettings>> {
        self.load_calendars()
    }

    #[tracing::instrument(skip(self))]
    fn task(&self, calendar_id: u64, task_id: u64) -> anyhow::Result<Option<Task>> {
        Ok(self
            .calendar_tasks(calendar_id)?
            .find(|task| task.id == task_id))
    }

    #[tracing::instrument(skip(self, window))]
    fn one_off_tasks(&self, calendar_id: u64, window: &QueryWindow) -> anyhow::Result<Vec<Task>> {
        let tasks: Vec<Task> = self
            .calendar_tasks(calendar_id)?
            .filter(|task| window.admits_one_off(task))
            .collect();
        debug!(count = tasks.len(), lower = %window.lower, upper = %window.upper, "selected one-off tasks");
        Ok(tasks)
    }

    #[tracing::instrument(skip(self, window))]
    fn recurrent_tasks(&self, calendar_id: u64, window: &QueryWindow) -> anyhow::Result<Vec<Task>> {
        let tasks: Vec<Task> = self
            .calendar_tasks(calendar_id)?
            .filter(|task| window.admits_recurrent(task))
            .collect();
        debug!(count = tasks.len(), year = window.recurrent_year, "selected recurrent tasks");
        Ok(tasks)
    }

    #[tracing::instrument(skip(self, window))]
    fn month_tasks(
        &self,
        calendar_id: u64,
        window: &QueryWindow,
    ) -> anyhow::Result<(Vec<Task>, Vec<Task>)> {
        let mut one_off = Vec::new();
        let mut recurrent = Vec::new();
        for task in self.calendar_tasks(calendar_id)? {
            if window.admits_one_off(&task) {
                one_off.push(task);
            } else if window.admits_recurrent(&task) {
                recurrent.push(task);
            }
        }
        debug!(one_off = one_off.len(), recurrent = recurrent.len(), "selected month tasks");
        Ok((one_off, recurrent))
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<Task>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let mut body = Vec::new();
    for task in tasks {
        serde_json::to_writer(&mut body, task)?;
        body.push(b'\n');
    }
    write_atomic(path, &body)
}

fn write_atomic(path: &Path, body: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(body)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
