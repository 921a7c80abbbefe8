use chrono::{
  DateTime,
  NaiveDateTime,
  Utc
};
use chrono_tz::Tz;

/// Wall-clock "now" for a calendar,
/// as a naive local date-time in the
/// calendar's zone.
#[must_use]
pub fn calendar_now(
  time_zone: &str,
  utc_now: DateTime<Utc>
) -> NaiveDateTime {
  let tz = parse_time_zone(time_zone)
    .unwrap_or(chrono_tz::UTC);
  utc_now
    .with_timezone(&tz)
    .naive_local()
}

fn parse_time_zone(
  raw: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      "calendar time zone was empty; \
       using UTC"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => Some(tz),
    | Err(error) => {
      tracing::warn!(
        timezone = %trimmed,
        error = %error,
        "invalid calendar time zone; using UTC"
      );
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::calendar_now;

  #[test]
  fn converts_to_calendar_zone() {
    let utc = Utc
      .with_ymd_and_hms(
        2024, 6, 15, 10, 0, 0
      )
      .single()
      .expect("valid now");
    let local =
      calendar_now("Europe/Madrid", utc);
    assert_eq!(
      local,
      NaiveDate::from_ymd_opt(
        2024, 6, 15
      )
      .and_then(|d| {
        d.and_hms_opt(12, 0, 0)
      })
      .expect("valid datetime")
    );
  }

  #[test]
  fn unknown_zone_falls_back_to_utc() {
    let utc = Utc
      .with_ymd_and_hms(
        2024, 1, 31, 23, 30, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      calendar_now("Mars/Olympus", utc),
      utc.naive_utc()
    );
    assert_eq!(
      calendar_now("  ", utc),
      utc.naive_utc()
    );
  }
}
