use anyhow::anyhow;
use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::calendar_math::{
    next_month_and_year, previous_month_and_year, weekday_from_index, weekday_index,
};

fn default_min_year() -> i32 {
    2000
}

fn default_max_year() -> i32 {
    2200
}

fn default_time_zone() -> String {
    "Europe/Madrid".to_string()
}

fn default_true() -> bool {
    true
}

/// Per-calendar settings. Read-only to the occurrence engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSettings {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_min_year")]
    pub min_year: i32,
    #[serde(default = "default_max_year")]
    pub max_year: i32,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(
        rename = "week_starting_day",
        default = "default_first_weekday",
        with = "first_weekday_serde"
    )]
    pub first_weekday: Weekday,
    #[serde(default = "default_true")]
    pub show_view_past_btn: bool,
    /// Highlight URLs found in task details.
    #[serde(default = "default_true")]
    pub auto_decorate_task_details_hyperlink: bool,
    /// When set, past occurrences are hidden whatever the caller asks for.
    #[serde(default)]
    pub hide_past_tasks: bool,
}

fn default_first_weekday() -> Weekday {
    Weekday::Mon
}

impl CalendarSettings {
    pub fn new(id: u64, name: String) -> Self {
        Self {
            id,
            name,
            description: String::new(),
            min_year: default_min_year(),
            max_year: default_max_year(),
            time_zone: default_time_zone(),
            first_weekday: default_first_weekday(),
            show_view_past_btn: true,
            auto_decorate_task_details_hyperlink: true,
            hide_past_tasks: false,
        }
    }

    /// Checks applied before settings are written back to disk.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("calendar name cannot be empty"));
        }
        if self.min_year > self.max_year {
            return Err(anyhow!(
                "min_year {} is after max_year {}",
                self.min_year,
                self.max_year
            ));
        }
        self.time_zone
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid time zone {:?}: {e}", self.time_zone))?;
        Ok(())
    }
}

#[must_use]
pub fn is_year_in_range(calendar: &CalendarSettings, year: i32) -> bool {
    (calendar.min_year..=calendar.max_year).contains(&year)
}

/// Resolved once per request; both the query window and the placement filter
/// must see the same value.
#[must_use]
pub fn effective_view_past_tasks(calendar: &CalendarSettings, requested: bool) -> bool {
    if calendar.hide_past_tasks {
        false
    } else {
        requested
    }
}

/// Month into [1, 12], year into the calendar's navigable range.
#[must_use]
pub fn clamp_year_month(calendar: &CalendarSettings, year: i32, month: u32) -> (i32, u32) {
    let year = year.min(calendar.max_year).max(calendar.min_year);
    let month = month.clamp(1, 12);
    (year, month)
}

/// `(year, month)` of the previous month, or `None` when it falls outside the
/// calendar's year range.
#[must_use]
pub fn previous_month_link(calendar: &CalendarSettings, year: i32, month: u32) -> Option<(i32, u32)> {
    let (month, year) = previous_month_and_year(year, month)?;
    is_year_in_range(calendar, year).then_some((year, month))
}

#[must_use]
pub fn next_month_link(calendar: &CalendarSettings, year: i32, month: u32) -> Option<(i32, u32)> {
    let (month, year) = next_month_and_year(year, month)?;
    is_year_in_range(calendar, year).then_some((year, month))
}

mod first_weekday_serde {
    use super::{Deserialize, Deserializer, Serializer, Weekday, weekday_from_index, weekday_index};

    pub fn serialize<S>(weekday: &Weekday, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(weekday_index(*weekday))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Weekday, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        weekday_from_index(raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "week_starting_day must be 0 (Monday) to 6 (Sunday), got {raw}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> CalendarSettings {
        CalendarSettings {
            min_year: 2020,
            max_year: 2024,
            ..CalendarSettings::new(1, "Home".to_string())
        }
    }

    #[test]
    fn year_range_is_inclusive() {
        let cal = calendar();
        assert!(is_year_in_range(&cal, 2020));
        assert!(is_year_in_range(&cal, 2024));
        assert!(!is_year_in_range(&cal, 2019));
        assert!(!is_year_in_range(&cal, 2025));
    }

    #[test]
    fn hide_past_tasks_overrides_request() {
        let mut cal = calendar();
        assert!(effective_view_past_tasks(&cal, true));
        assert!(!effective_view_past_tasks(&cal, false));

        cal.hide_past_tasks = true;
        assert!(!effective_view_past_tasks(&cal, true));
        assert!(!effective_view_past_tasks(&cal, false));
    }

    #[test]
    fn clamps_navigation_targets() {
        let cal = calendar();
        assert_eq!(clamp_year_month(&cal, 1999, 0), (2020, 1));
        assert_eq!(clamp_year_month(&cal, 2030, 14), (2024, 12));
        assert_eq!(clamp_year_month(&cal, 2022, 6), (2022, 6));
    }

    #[test]
    fn links_collapse_outside_range() {
        let cal = calendar();
        assert_eq!(previous_month_link(&cal, 2020, 1), None);
        assert_eq!(previous_month_link(&cal, 2020, 2), Some((2020, 1)));
        assert_eq!(next_month_link(&cal, 2024, 12), None);
        assert_eq!(next_month_link(&cal, 2023, 12), Some((2024, 1)));
    }

    #[test]
    fn parses_settings_from_toml() {
        let raw = r#"
id = 3
name = "Work"
week_starting_day = 6
hide_past_tasks = true
"#;
        let cal: CalendarSettings = toml::from_str(raw).expect("parse calendar");
        assert_eq!(cal.first_weekday, Weekday::Sun);
        assert_eq!(cal.min_year, 2000);
        assert_eq!(cal.max_year, 2200);
        assert_eq!(cal.time_zone, "Europe/Madrid");
        assert!(cal.show_view_past_btn);
        assert!(cal.auto_decorate_task_details_hyperlink);
        assert!(cal.hide_past_tasks);
    }

    #[test]
    fn validation_rejects_bad_settings() {
        assert!(calendar().validate().is_ok());

        let unnamed = CalendarSettings {
            name: " ".to_string(),
            ..calendar()
        };
        assert!(unnamed.validate().is_err());

        let inverted = CalendarSettings {
            min_year: 2030,
            ..calendar()
        };
        assert!(inverted.validate().is_err());

        let nowhere = CalendarSettings {
            time_zone: "Mars/Olympus".to_string(),
            ..calendar()
        };
        let err = nowhere.validate().expect_err("unknown zone");
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn rejects_out_of_range_week_start() {
        let raw = "id = 1\nname = \"Bad\"\nweek_starting_day = 7\n";
        assert!(toml::from_str::<CalendarSettings>(raw).is_err());
    }
}
