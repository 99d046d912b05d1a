use std::fs;
use std::path::{
  Path,
  PathBuf
};

use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Offset,
  TimeZone,
  Timelike,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::config::Config;

const TIMEZONE_CONFIG_FILE: &str =
  "slotgrid-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "SLOTGRID_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "SLOTGRID_TIME_CONFIG";
const DEFAULT_LOCAL_TIMEZONE: &str =
  "UTC";

/// Canonical weekday names, Sunday first.
pub const WEEKDAY_NAMES: [&str; 7] = [
  "Sunday",
  "Monday",
  "Tuesday",
  "Wednesday",
  "Thursday",
  "Friday",
  "Saturday"
];

const WEEKDAYS_FROM_SUNDAY: [Weekday;
  7] = [
  Weekday::Sun,
  Weekday::Mon,
  Weekday::Tue,
  Weekday::Wed,
  Weekday::Thu,
  Weekday::Fri,
  Weekday::Sat
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Resolves the zone treated as "local" for display and entry.
///
/// Precedence: explicit override (the `--timezone` flag), the
/// `SLOTGRID_TIMEZONE` environment variable, the rc key `timezone`,
/// the `slotgrid-time.toml` file, and finally UTC.
pub fn resolve_local_timezone(
  explicit: Option<&str>,
  cfg: &Config
) -> Tz {
  let env_value =
    std::env::var(TIMEZONE_ENV_VAR)
      .ok();
  resolve_timezone_from(
    explicit,
    env_value.as_deref(),
    cfg.get("timezone").as_deref(),
    timezone_config_path().as_deref()
  )
}

pub(crate) fn resolve_timezone_from(
  explicit: Option<&str>,
  env_value: Option<&str>,
  rc_value: Option<&str>,
  file: Option<&Path>
) -> Tz {
  let candidates = [
    (explicit, "--timezone"),
    (env_value, TIMEZONE_ENV_VAR),
    (rc_value, "rc:timezone")
  ];
  for (raw, source) in candidates {
    if let Some(raw) = raw
      && let Some(tz) =
        parse_timezone(raw, source)
    {
      return tz;
    }
  }

  if let Some(path) = file
    && let Some(tz) =
      load_timezone_from_file(path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_LOCAL_TIMEZONE,
    "DEFAULT_LOCAL_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured local timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Pins a wall-clock reading to an instant in `zone`.
///
/// Ambiguous readings take the earliest instant. Readings inside a
/// forward transition gap are read with the offset in force at the
/// same reading taken as UTC, which moves them past the gap.
pub fn resolve_local<Z: TimeZone>(
  zone: &Z,
  naive: NaiveDateTime
) -> DateTime<Z> {
  match zone.from_local_datetime(&naive)
  {
    | LocalResult::Single(local_dt) => {
      local_dt
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        local = %naive,
        "ambiguous local datetime; using earliest"
      );
      if first <= second {
        first
      } else {
        second
      }
    }
    | LocalResult::None => {
      let offset = zone
        .offset_from_utc_datetime(
          &naive
        )
        .fix()
        .local_minus_utc();
      tracing::warn!(
        local = %naive,
        offset,
        "local datetime falls in a transition gap; shifting forward"
      );
      zone.from_utc_datetime(
        &(naive
          - Duration::seconds(
            i64::from(offset)
          ))
      )
    }
  }
}

#[must_use]
pub fn weekday_name(
  day: Weekday
) -> &'static str {
  WEEKDAY_NAMES
    [day.num_days_from_sunday() as usize]
}

/// Matches one of the seven full weekday names, ignoring case.
pub fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  weekday_index(token)
    .map(|idx| WEEKDAYS_FROM_SUNDAY[idx])
}

/// Sunday-based index of a weekday name; `None` when unrecognized.
pub fn weekday_index(
  token: &str
) -> Option<usize> {
  let token = token.trim();
  WEEKDAY_NAMES.iter().position(
    |name| {
      name.eq_ignore_ascii_case(token)
    }
  )
}

/// First letter upper, rest lower.
#[must_use]
pub fn capitalize(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    | Some(first) => {
      first
        .to_uppercase()
        .chain(
          chars.flat_map(char::to_lowercase)
        )
        .collect()
    }
    | None => String::new()
  }
}

/// Parses a 24-hour `H:mm` or `HH:mm` clock reading.
pub fn parse_clock_time(
  token: &str
) -> Option<NaiveTime> {
  let clock_re = Regex::new(
    r"^(?P<hour>\d{1,2}):(?P<minute>\d{2})$"
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;

  NaiveTime::from_hms_opt(
    hour, minute, 0
  )
}

#[must_use]
pub fn format_clock(
  time: NaiveTime
) -> String {
  time.format("%H:%M").to_string()
}

/// `hours + minutes / 60` of a time of day.
#[must_use]
pub fn hour_fraction<T: Timelike>(
  time: &T
) -> f64 {
  f64::from(time.hour())
    + f64::from(time.minute()) / 60.0
}

/// Inverse of [`hour_fraction`], rounded to the minute.
///
/// Values at or past the end of the day map to `23:59`.
#[must_use]
pub fn clock_from_hour(
  hour: f64
) -> NaiveTime {
  let minutes =
    (hour * 60.0).round().max(0.0);
  let last_minute =
    NaiveTime::from_hms_opt(23, 59, 0)
      .unwrap_or(NaiveTime::MIN);
  if minutes >= 24.0 * 60.0 {
    return last_minute;
  }
  let minutes = minutes as u32;
  NaiveTime::from_hms_opt(
    minutes / 60,
    minutes % 60,
    0
  )
  .unwrap_or(last_minute)
}

#[must_use]
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

/// First day of the week containing `focus`.
#[must_use]
pub fn start_of_week(
  focus: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let focus_idx = focus
    .weekday()
    .num_days_from_sunday()
    as i64;
  let start_idx = week_start
    .num_days_from_sunday()
    as i64;
  let delta =
    (7 + focus_idx - start_idx) % 7;
  add_days(focus, -delta)
}

pub mod clock_serde {
  use chrono::NaiveTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    time: &NaiveTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_clock(*time)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_clock_time(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid clock time: {raw}"
          )
        )
      })
  }
}

pub mod weekday_serde {
  use chrono::Weekday;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    day: &Weekday,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      super::weekday_name(*day)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Weekday, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_weekday_name(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "unknown weekday: {raw}"
          )
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use chrono::{
    NaiveDate,
    NaiveTime,
    Timelike,
    Utc,
    Weekday
  };
  use tempfile::tempdir;

  use super::{
    capitalize,
    clock_from_hour,
    parse_clock_time,
    parse_weekday_name,
    resolve_local,
    resolve_timezone_from,
    start_of_week,
    weekday_index
  };

  fn naive(
    y: i32,
    m: u32,
    d: u32,
    h: u32,
    min: u32
  ) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
      .and_hms_opt(h, min, 0)
      .expect("valid time")
  }

  #[test]
  fn weekday_names_ignore_case() {
    assert_eq!(
      parse_weekday_name("monday"),
      Some(Weekday::Mon)
    );
    assert_eq!(
      parse_weekday_name("SATURDAY"),
      Some(Weekday::Sat)
    );
    assert_eq!(
      parse_weekday_name("mon"),
      None
    );
    assert_eq!(
      weekday_index("Sunday"),
      Some(0)
    );
    assert_eq!(
      weekday_index("funday"),
      None
    );
  }

  #[test]
  fn capitalizes_words() {
    assert_eq!(
      capitalize("wEDNESDAY"),
      "Wednesday"
    );
    assert_eq!(capitalize(""), "");
  }

  #[test]
  fn parses_single_and_double_digit_hours()
  {
    assert_eq!(
      parse_clock_time("9:05"),
      NaiveTime::from_hms_opt(9, 5, 0)
    );
    assert_eq!(
      parse_clock_time(" 23:59 "),
      NaiveTime::from_hms_opt(
        23, 59, 0
      )
    );
    assert_eq!(
      parse_clock_time("24:00"),
      None
    );
    assert_eq!(
      parse_clock_time("9:5"),
      None
    );
  }

  #[test]
  fn clock_from_hour_saturates_at_end_of_day()
   {
    assert_eq!(
      clock_from_hour(9.5),
      NaiveTime::from_hms_opt(9, 30, 0)
        .expect("valid time")
    );
    assert_eq!(
      clock_from_hour(24.0),
      NaiveTime::from_hms_opt(
        23, 59, 0
      )
      .expect("valid time")
    );
  }

  #[test]
  fn week_starts_on_requested_day() {
    let thursday =
      NaiveDate::from_ymd_opt(
        2026, 10, 22
      )
      .expect("valid date");
    assert_eq!(
      start_of_week(
        thursday,
        Weekday::Sun
      ),
      NaiveDate::from_ymd_opt(
        2026, 10, 18
      )
      .expect("valid date")
    );
    assert_eq!(
      start_of_week(
        thursday,
        Weekday::Mon
      ),
      NaiveDate::from_ymd_opt(
        2026, 10, 19
      )
      .expect("valid date")
    );
  }

  #[test]
  fn gap_readings_shift_forward() {
    let zone =
      chrono_tz::America::New_York;
    let resolved = resolve_local(
      &zone,
      naive(2026, 3, 8, 2, 30)
    );
    assert_eq!(
      resolved.naive_local().hour(),
      3
    );
    assert_eq!(
      resolved
        .with_timezone(&Utc)
        .naive_utc(),
      naive(2026, 3, 8, 7, 30)
    );
  }

  #[test]
  fn ambiguous_readings_take_earliest() {
    let zone =
      chrono_tz::America::New_York;
    let resolved = resolve_local(
      &zone,
      naive(2026, 11, 1, 1, 30)
    );
    assert_eq!(
      resolved
        .with_timezone(&Utc)
        .naive_utc(),
      naive(2026, 11, 1, 5, 30)
    );
  }

  #[test]
  fn timezone_precedence_and_fallbacks() {
    let dir =
      tempdir().expect("tempdir");
    let file =
      dir.path().join("slotgrid-time.toml");
    fs::write(
      &file,
      "[time]\ntimezone = \
       \"Asia/Tokyo\"\n"
    )
    .expect("write time config");

    assert_eq!(
      resolve_timezone_from(
        Some("Europe/Berlin"),
        Some("America/Chicago"),
        None,
        Some(file.as_path())
      ),
      chrono_tz::Europe::Berlin
    );
    assert_eq!(
      resolve_timezone_from(
        Some("Not/AZone"),
        None,
        Some("America/Chicago"),
        Some(file.as_path())
      ),
      chrono_tz::America::Chicago
    );
    assert_eq!(
      resolve_timezone_from(
        None,
        None,
        None,
        Some(file.as_path())
      ),
      chrono_tz::Asia::Tokyo
    );
    assert_eq!(
      resolve_timezone_from(
        None,
        None,
        None,
        Some(dir.path().join("missing.toml").as_path())
      ),
      chrono_tz::UTC
    );
  }
}
