use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const SUMMARY_TIME_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

/// How a recurring task repeats within a displayed month.
///
/// Weekday rules carry a grid column (0..=6) counted from the calendar's
/// first weekday, so the same stored value lands on a different weekday in a
/// Sunday-first calendar than in a Monday-first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    /// Every cell of the column within the month.
    Weekly(u8),
    /// The first in-month cell of the column only.
    MonthlyByWeekday(u8),
    /// A fixed day of the month; never fires in months that are too short.
    MonthlyByDay(u32),
    /// Stored codes that do not describe a rule. Never fires.
    Unrecognized {
        repetition_type: String,
        repetition_subtype: String,
        repetition_value: i32,
    },
}

impl Recurrence {
    pub fn from_codes(repetition_type: &str, repetition_subtype: &str, repetition_value: i32) -> Self {
        let column = u8::try_from(repetition_value)
            .ok()
            .filter(|column| *column < 7);
        let day = u32::try_from(repetition_value)
            .ok()
            .filter(|day| (1..=31).contains(day));

        let resolved = match (repetition_type, repetition_subtype) {
            ("w", _) => column.map(Recurrence::Weekly),
            ("m", "w") => column.map(Recurrence::MonthlyByWeekday),
            ("m", "m") => day.map(Recurrence::MonthlyByDay),
            _ => None,
        };

        resolved.unwrap_or_else(|| Recurrence::Unrecognized {
            repetition_type: repetition_type.to_string(),
            repetition_subtype: repetition_subtype.to_string(),
            repetition_value,
        })
    }

    /// `(repetition_type, repetition_subtype, repetition_value)` as stored.
    pub fn codes(&self) -> (String, String, i32) {
        match self {
            Recurrence::Weekly(column) => ("w".to_string(), String::new(), i32::from(*column)),
            Recurrence::MonthlyByWeekday(column) => {
                ("m".to_string(), "w".to_string(), i32::from(*column))
            }
            Recurrence::MonthlyByDay(day) => (
                "m".to_string(),
                "m".to_string(),
                i32::try_from(*day).unwrap_or_default(),
            ),
            Recurrence::Unrecognized {
                repetition_type,
                repetition_subtype,
                repetition_value,
            } => (
                repetition_type.clone(),
                repetition_subtype.clone(),
                *repetition_value,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TaskRecord", into = "TaskRecord")]
pub struct Task {
    pub id: u64,
    pub calendar_id: u64,
    pub title: String,
    pub color: String,
    pub details: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub is_all_day: bool,
    /// `None` for one-off tasks.
    pub recurrence: Option<Recurrence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: u64,
    pub title: String,
    pub color: String,
    pub start_time: String,
    pub end_time: String,
}

/// Long form: every stored field, date-times in the day-first display format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDetail {
    pub id: u64,
    pub calendar_id: u64,
    pub title: String,
    pub color: String,
    pub details: String,
    pub start_time: String,
    pub end_time: String,
    pub is_all_day: bool,
    pub is_recurrent: bool,
    pub repetition_value: i32,
    pub repetition_type: String,
    pub repetition_subtype: String,
}

impl Task {
    pub fn one_off(
        id: u64,
        calendar_id: u64,
        title: String,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            calendar_id,
            title,
            color: String::new(),
            details: String::new(),
            start_time,
            end_time,
            is_all_day: false,
            recurrence: None,
        }
    }

    pub fn recurring(
        id: u64,
        calendar_id: u64,
        title: String,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        recurrence: Recurrence,
    ) -> Self {
        Self {
            recurrence: Some(recurrence),
            ..Self::one_off(id, calendar_id, title, start_time, end_time)
        }
    }

    pub fn is_recurrent(&self) -> bool {
        self.recurrence.is_some()
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            title: self.title.clone(),
            color: self.color.clone(),
            start_time: self.start_time.format(SUMMARY_TIME_FORMAT).to_string(),
            end_time: self.end_time.format(SUMMARY_TIME_FORMAT).to_string(),
        }
    }

    pub fn detail(&self) -> TaskDetail {
        let record = TaskRecord::from(self.clone());
        TaskDetail {
            id: record.id,
            calendar_id: record.calendar_id,
            title: record.title,
            color: record.color,
            details: record.details,
            start_time: record.start_time.format(SUMMARY_TIME_FORMAT).to_string(),
            end_time: record.end_time.format(SUMMARY_TIME_FORMAT).to_string(),
            is_all_day: record.is_all_day,
            is_recurrent: record.is_recurrent,
            repetition_value: record.repetition_value,
            repetition_type: record.repetition_type,
            repetition_subtype: record.repetition_subtype,
        }
    }
}

/// On-disk shape of a task, with the repetition fields kept as raw codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskRecord {
    id: u64,
    calendar_id: u64,
    title: String,
    #[serde(default)]
    color: String,
    #[serde(default)]
    details: String,
    #[serde(with = "task_time_serde")]
    start_time: NaiveDateTime,
    #[serde(with = "task_time_serde")]
    end_time: NaiveDateTime,
    #[serde(default)]
    is_all_day: bool,
    #[serde(default)]
    is_recurrent: bool,
    #[serde(default)]
    repetition_value: i32,
    #[serde(default)]
    repetition_type: String,
    #[serde(default)]
    repetition_subtype: String,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        let recurrence = record.is_recurrent.then(|| {
            Recurrence::from_codes(
                &record.repetition_type,
                &record.repetition_subtype,
                record.repetition_value,
            )
        });

        Self {
            id: record.id,
            calendar_id: record.calendar_id,
            title: record.title,
            color: record.color,
            details: record.details,
            start_time: record.start_time,
            end_time: record.end_time,
            is_all_day: record.is_all_day,
            recurrence,
        }
    }
}

impl From<Task> for TaskRecord {
    fn from(task: Task) -> Self {
        let is_recurrent = task.is_recurrent();
        let (repetition_type, repetition_subtype, repetition_value) = task
            .recurrence
            .as_ref()
            .map(Recurrence::codes)
            .unwrap_or_else(|| (String::new(), String::new(), 0));

        Self {
            id: task.id,
            calendar_id: task.calendar_id,
            title: task.title,
            color: task.color,
            details: task.details,
            start_time: task.start_time,
            end_time: task.end_time,
            is_all_day: task.is_all_day,
            is_recurrent,
            repetition_value,
            repetition_type,
            repetition_subtype,
        }
    }
}

pub mod task_time_serde {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    const SHORT_FORMAT: &str = "%Y-%m-%d %H:%M";

    pub fn serialize<S>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    /// Accepts `%Y-%m-%d %H:%M:%S` and `%Y-%m-%d %H:%M`.
    pub fn parse(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        let trimmed = raw.trim();
        NaiveDateTime::parse_from_str(trimmed, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, SHORT_FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn resolves_known_codes() {
        assert_eq!(Recurrence::from_codes("w", "", 2), Recurrence::Weekly(2));
        assert_eq!(
            Recurrence::from_codes("m", "w", 0),
            Recurrence::MonthlyByWeekday(0)
        );
        assert_eq!(
            Recurrence::from_codes("m", "m", 31),
            Recurrence::MonthlyByDay(31)
        );
    }

    #[test]
    fn unknown_or_out_of_range_codes_are_unrecognized() {
        for (kind, subtype, value) in [("w", "", 7), ("m", "m", 0), ("m", "m", 32), ("m", "x", 1), ("d", "", 1), ("w", "", -1)] {
            let resolved = Recurrence::from_codes(kind, subtype, value);
            assert!(
                matches!(resolved, Recurrence::Unrecognized { .. }),
                "{kind}/{subtype}/{value} resolved to {resolved:?}"
            );
            assert_eq!(
                resolved.codes(),
                (kind.to_string(), subtype.to_string(), value)
            );
        }
    }

    #[test]
    fn parses_stored_record() {
        let line = r##"{"id":7,"calendar_id":1,"title":"Standup","color":"#ffcc00","start_time":"2024-01-03 09:00","end_time":"2024-01-03 09:15:00","is_recurrent":true,"repetition_type":"w","repetition_subtype":"","repetition_value":2}"##;
        let task: Task = serde_json::from_str(line).expect("parse task");

        assert_eq!(task.id, 7);
        assert_eq!(task.recurrence, Some(Recurrence::Weekly(2)));
        assert_eq!(
            task.start_time,
            NaiveDate::from_ymd_opt(2024, 1, 3)
                .and_then(|d| d.and_hms_opt(9, 0, 0))
                .expect("valid datetime")
        );
        assert!(task.details.is_empty());

        let value = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(value["start_time"], "2024-01-03 09:00:00");
        assert_eq!(value["is_recurrent"], true);
        assert_eq!(value["repetition_value"], 2);
    }

    #[test]
    fn non_recurrent_record_ignores_repetition_fields() {
        let line = r#"{"id":1,"calendar_id":1,"title":"Dentist","start_time":"2024-06-10 10:00:00","end_time":"2024-06-10 11:00:00","repetition_type":"w","repetition_value":3}"#;
        let task: Task = serde_json::from_str(line).expect("parse task");
        assert_eq!(task.recurrence, None);
        assert!(!task.is_recurrent());
    }

    #[test]
    fn summary_uses_day_first_format() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 10)
            .and_then(|d| d.and_hms_opt(8, 30, 0))
            .expect("valid datetime");
        let task = Task::one_off(3, 1, "Dentist".to_string(), start, start);
        let summary = task.summary();
        assert_eq!(summary.start_time, "10/06/2024, 08:30:00");
        assert_eq!(summary.title, "Dentist");
    }

    #[test]
    fn detail_keeps_raw_codes() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3)
            .and_then(|d| d.and_hms_opt(18, 0, 0))
            .expect("valid datetime");
        let task = Task::recurring(
            4,
            2,
            "Choir".to_string(),
            start,
            start,
            Recurrence::from_codes("m", "w", 1),
        );
        let detail = task.detail();
        assert_eq!(detail.calendar_id, 2);
        assert!(detail.is_recurrent);
        assert_eq!(
            (detail.repetition_type.as_str(), detail.repetition_subtype.as_str(), detail.repetition_value),
            ("m", "w", 1)
        );
        assert_eq!(detail.end_time, "03/06/2024, 18:00:00");

        let value = serde_json::to_value(&detail).expect("serialize detail");
        assert_eq!(value["title"], "Choir");
    }
}
