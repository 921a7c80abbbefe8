use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  Weekday
};

pub const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December"
];

pub const WEEKDAY_HEADERS: [&str; 7] = [
  "MON", "TUE", "WED", "THU", "FRI",
  "SAT", "SUN"
];

#[must_use]
pub fn month_name(
  month: u32
) -> Option<&'static str> {
  let idx = month.checked_sub(1)?;
  MONTH_NAMES
    .get(idx as usize)
    .copied()
}

/// Monday = 0 .. Sunday = 6.
#[must_use]
pub fn weekday_from_index(
  idx: u8
) -> Option<Weekday> {
  match idx {
    | 0 => Some(Weekday::Mon),
    | 1 => Some(Weekday::Tue),
    | 2 => Some(Weekday::Wed),
    | 3 => Some(Weekday::Thu),
    | 4 => Some(Weekday::Fri),
    | 5 => Some(Weekday::Sat),
    | 6 => Some(Weekday::Sun),
    | _ => None
  }
}

#[must_use]
pub fn weekday_index(
  weekday: Weekday
) -> u8 {
  weekday.num_days_from_monday() as u8
}

#[must_use]
pub fn weekday_headers(
  first_weekday: Weekday
) -> [&'static str; 7] {
  let start =
    weekday_index(first_weekday)
      as usize;
  std::array::from_fn(|col| {
    WEEKDAY_HEADERS[(start + col) % 7]
  })
}

fn first_day_of_month(
  year: i32,
  month: u32
) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
}

fn last_day_of_month(
  year: i32,
  month: u32
) -> Option<NaiveDate> {
  let (next_year, next_month) =
    if month >= 12 {
      (year.checked_add(1)?, 1_u32)
    } else {
      (year, month + 1)
    };
  first_day_of_month(
    next_year, next_month
  )?
  .pred_opt()
}

#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> Option<u32> {
  first_day_of_month(year, month)?;
  last_day_of_month(year, month)
    .map(|date| date.day())
}

/// Month and year two days before the
/// first of the given month.
#[must_use]
pub fn previous_month_and_year(
  year: i32,
  month: u32
) -> Option<(u32, i32)> {
  let date = first_day_of_month(
    year, month
  )?
  .checked_sub_signed(Duration::days(
    2
  ))?;
  Some((date.month(), date.year()))
}

/// Month and year two days after the
/// last day of the given month.
#[must_use]
pub fn next_month_and_year(
  year: i32,
  month: u32
) -> Option<(u32, i32)> {
  first_day_of_month(year, month)?;
  let date =
    last_day_of_month(year, month)?
      .checked_add_signed(
        Duration::days(2)
      )?;
  Some((date.month(), date.year()))
}

fn start_of_week(
  day: NaiveDate,
  first_weekday: Weekday
) -> Option<NaiveDate> {
  let day_idx = i64::from(
    day.weekday().num_days_from_monday()
  );
  let start_idx = i64::from(
    first_weekday.num_days_from_monday()
  );
  let diff =
    (7 + day_idx - start_idx) % 7;
  day.checked_sub_signed(
    Duration::days(diff)
  )
}

fn end_of_week(
  day: NaiveDate,
  first_weekday: Weekday
) -> Option<NaiveDate> {
  start_of_week(day, first_weekday)?
    .checked_add_signed(
      Duration::days(6)
    )
}

/// Every date shown on a month grid,
/// in order, starting at the grid's
/// top-left cell. Cloning restarts the
/// sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthDays {
  next: Option<NaiveDate>,
  last: NaiveDate
}

impl Iterator for MonthDays {
  type Item = NaiveDate;

  fn next(
    &mut self
  ) -> Option<Self::Item> {
    let current = self.next?;
    self.next = if current < self.last
    {
      current.succ_opt()
    } else {
      None
    };
    Some(current)
  }

  fn size_hint(
    &self
  ) -> (usize, Option<usize>) {
    let remaining = self
      .next
      .map(|next| {
        (self.last - next).num_days()
          + 1
      })
      .and_then(|n| {
        usize::try_from(n).ok()
      })
      .unwrap_or(0);
    (remaining, Some(remaining))
  }
}

impl ExactSizeIterator for MonthDays {}

#[must_use]
pub fn month_days(
  year: i32,
  month: u32,
  first_weekday: Weekday
) -> Option<MonthDays> {
  let first = start_of_week(
    first_day_of_month(year, month)?,
    first_weekday
  )?;
  let last = end_of_week(
    last_day_of_month(year, month)?,
    first_weekday
  )?;
  Some(MonthDays {
    next: Some(first),
    last
  })
}

/// The month grid as weeks of day
/// numbers; `0` marks a cell that
/// belongs to an adjacent month.
#[must_use]
pub fn month_days_with_weekday(
  year: i32,
  month: u32,
  first_weekday: Weekday
) -> Vec<[u32; 7]> {
  let Some(days) = month_days(
    year,
    month,
    first_weekday
  ) else {
    return vec![];
  };

  let mut weeks =
    Vec::with_capacity(6);
  let mut week = [0_u32; 7];
  for (idx, date) in
    days.enumerate()
  {
    let col = idx % 7;
    week[col] = if date.month() == month
    {
      date.day()
    } else {
      0
    };
    if col == 6 {
      weeks.push(week);
      week = [0_u32; 7];
    }
  }
  weeks
}

/// Actual weekday of a grid column.
#[must_use]
pub fn column_weekday(
  first_weekday: Weekday,
  col: usize
) -> Weekday {
  let mut weekday = first_weekday;
  for _ in 0..(col % 7) {
    weekday = weekday.succ();
  }
  weekday
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    NaiveDate,
    Weekday
  };

  use super::*;

  #[test]
  fn previous_month_wraps_year() {
    assert_eq!(
      previous_month_and_year(2024, 1),
      Some((12, 2023))
    );
    assert_eq!(
      previous_month_and_year(2024, 3),
      Some((2, 2024))
    );
  }

  #[test]
  fn next_month_wraps_year() {
    assert_eq!(
      next_month_and_year(2024, 12),
      Some((1, 2025))
    );
    assert_eq!(
      next_month_and_year(2024, 1),
      Some((2, 2024))
    );
  }

  #[test]
  fn invalid_month_has_no_neighbours()
  {
    assert_eq!(
      previous_month_and_year(2024, 13),
      None
    );
    assert_eq!(
      next_month_and_year(2024, 0),
      None
    );
    assert_eq!(
      days_in_month(2024, 0),
      None
    );
  }

  #[test]
  fn days_in_month_handles_leap_years()
  {
    assert_eq!(
      days_in_month(2024, 2),
      Some(29)
    );
    assert_eq!(
      days_in_month(2023, 2),
      Some(28)
    );
    assert_eq!(
      days_in_month(2024, 4),
      Some(30)
    );
    assert_eq!(
      days_in_month(2024, 12),
      Some(31)
    );
  }

  #[test]
  fn weekday_headers_rotate() {
    assert_eq!(
      weekday_headers(Weekday::Mon),
      [
        "MON", "TUE", "WED", "THU",
        "FRI", "SAT", "SUN"
      ]
    );
    assert_eq!(
      weekday_headers(Weekday::Sun),
      [
        "SUN", "MON", "TUE", "WED",
        "THU", "FRI", "SAT"
      ]
    );
  }

  #[test]
  fn month_days_cover_full_weeks() {
    // June 2024 starts on a Saturday
    // and ends on a Sunday.
    let days: Vec<NaiveDate> =
      month_days(2024, 6, Weekday::Mon)
        .expect("valid month")
        .collect();
    assert_eq!(days.len(), 35);
    assert_eq!(
      days[0],
      NaiveDate::from_ymd_opt(
        2024, 5, 27
      )
      .expect("valid date")
    );
    assert_eq!(
      days[34],
      NaiveDate::from_ymd_opt(
        2024, 6, 30
      )
      .expect("valid date")
    );
    assert!(
      days
        .iter()
        .step_by(7)
        .all(|d| d.weekday() == Weekday::Mon)
    );
  }

  #[test]
  fn month_days_is_restartable() {
    let days =
      month_days(2024, 2, Weekday::Sun)
        .expect("valid month");
    let first_pass: Vec<_> =
      days.clone().collect();
    let second_pass: Vec<_> =
      days.collect();
    assert_eq!(first_pass, second_pass);
    assert_eq!(
      first_pass[0].weekday(),
      Weekday::Sun
    );
    assert_eq!(first_pass.len() % 7, 0);
  }

  #[test]
  fn month_grid_marks_outside_days() {
    let weeks = month_days_with_weekday(
      2024,
      6,
      Weekday::Mon
    );
    assert_eq!(weeks.len(), 5);
    assert_eq!(
      weeks[0],
      [0, 0, 0, 0, 0, 1, 2]
    );
    assert_eq!(
      weeks[4],
      [24, 25, 26, 27, 28, 29, 30]
    );
  }

  #[test]
  fn month_grid_follows_first_weekday()
  {
    let weeks = month_days_with_weekday(
      2024,
      6,
      Weekday::Sun
    );
    assert_eq!(
      weeks[0],
      [0, 0, 0, 0, 0, 0, 1]
    );
    assert_eq!(
      weeks.last().copied(),
      Some([30, 0, 0, 0, 0, 0, 0])
    );
  }

  #[test]
  fn column_weekday_wraps() {
    assert_eq!(
      column_weekday(Weekday::Sun, 0),
      Weekday::Sun
    );
    assert_eq!(
      column_weekday(Weekday::Sun, 3),
      Weekday::Wed
    );
    assert_eq!(
      column_weekday(Weekday::Fri, 6),
      Weekday::Thu
    );
  }

  #[test]
  fn month_names_are_one_based() {
    assert_eq!(
      month_name(1),
      Some("January")
    );
    assert_eq!(
      month_name(12),
      Some("December")
    );
    assert_eq!(month_name(0), None);
    assert_eq!(month_name(13), None);
  }
}
