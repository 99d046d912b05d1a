use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  trace
};
use uuid::Uuid;

use crate::datetime::{
  add_days,
  clock_serde,
  format_clock,
  parse_clock_time,
  parse_weekday_name,
  resolve_local,
  start_of_week,
  weekday_name,
  weekday_serde
};

const RANGE_PATTERN: &str = r"^(?P<weekday>\w+)\s+(?P<start>\d{1,2}:\d{2})\s*-\s*(?P<end>\d{1,2}:\d{2})$";

/// A recurring weekly window, `Monday 09:00 - 17:00`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
pub struct TimeRangeEntry {
  #[serde(with = "weekday_serde")]
  pub weekday: Weekday,
  #[serde(
    rename = "startTime",
    with = "clock_serde"
  )]
  pub start:   NaiveTime,
  #[serde(
    rename = "endTime",
    with = "clock_serde"
  )]
  pub end:     NaiveTime
}

impl TimeRangeEntry {
  #[must_use]
  pub fn new(
    weekday: Weekday,
    start: NaiveTime,
    end: NaiveTime
  ) -> Self {
    Self {
      weekday,
      start,
      end
    }
  }

  /// Builds an entry from `HH:mm` readings.
  pub fn from_clock(
    weekday: Weekday,
    start: &str,
    end: &str
  ) -> anyhow::Result<Self> {
    let start = parse_clock_time(start)
      .ok_or_else(|| {
        anyhow!(
          "invalid start time: {start}"
        )
      })?;
    let end = parse_clock_time(end)
      .ok_or_else(|| {
        anyhow!(
          "invalid end time: {end}"
        )
      })?;
    Ok(Self::new(weekday, start, end))
  }

  #[must_use]
  pub fn duration_minutes(&self) -> i64 {
    (self.end - self.start)
      .num_minutes()
  }
}

impl fmt::Display for TimeRangeEntry {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{} {} - {}",
      weekday_name(self.weekday),
      format_clock(self.start),
      format_clock(self.end)
    )
  }
}

impl FromStr for TimeRangeEntry {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let range_re =
      Regex::new(RANGE_PATTERN).map_err(
        |e| {
          anyhow!(
            "internal regex compile \
             failure: {e}"
          )
        }
      )?;
    parse_segment(&range_re, s)
      .ok_or_else(|| {
        anyhow!(
          "expected `Weekday HH:mm - \
           HH:mm`, got: {s}"
        )
      })
  }
}

/// A partially filled entry as held by an editing form.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub struct TimeRangeDraft {
  pub weekday: Option<Weekday>,
  pub start:   Option<NaiveTime>,
  pub end:     Option<NaiveTime>
}

impl TimeRangeDraft {
  #[must_use]
  pub fn complete(
    &self
  ) -> Option<TimeRangeEntry> {
    Some(TimeRangeEntry::new(
      self.weekday?,
      self.start?,
      self.end?
    ))
  }

  /// Complete entries only, in order.
  #[must_use]
  pub fn complete_all(
    drafts: &[TimeRangeDraft]
  ) -> Vec<TimeRangeEntry> {
    drafts
      .iter()
      .filter_map(Self::complete)
      .collect()
  }
}

/// An entry tagged with a throwaway id for list editing.
///
/// The id never reaches the wire.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct EditableEntry {
  pub id:    Uuid,
  pub entry: TimeRangeEntry
}

impl EditableEntry {
  #[must_use]
  pub fn new(
    entry: TimeRangeEntry
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      entry
    }
  }

  #[must_use]
  pub fn wrap_all(
    entries: &[TimeRangeEntry]
  ) -> Vec<Self> {
    entries
      .iter()
      .copied()
      .map(Self::new)
      .collect()
  }

  #[must_use]
  pub fn unwrap_all(
    entries: &[Self]
  ) -> Vec<TimeRangeEntry> {
    entries
      .iter()
      .map(|item| item.entry)
      .collect()
  }
}

/// Moves weekly windows between a local zone and UTC.
///
/// Weekdays are pinned to concrete dates in one reference week
/// (starting Sunday); only weekday and time of day survive the
/// conversion. The reference week decides which UTC offset applies
/// when the zone observes daylight saving.
#[derive(Debug, Clone)]
pub struct ZoneConverter<Z: TimeZone> {
  zone:      Z,
  reference: NaiveDate
}

impl<Z: TimeZone> ZoneConverter<Z> {
  #[must_use]
  pub fn anchored(
    zone: Z,
    week_of: NaiveDate
  ) -> Self {
    Self {
      zone,
      reference: start_of_week(
        week_of,
        Weekday::Sun
      )
    }
  }

  /// Anchors on the week containing today in `zone`.
  #[must_use]
  pub fn current_week(zone: Z) -> Self {
    let today = Utc::now()
      .with_timezone(&zone)
      .date_naive();
    Self::anchored(zone, today)
  }

  pub fn zone(&self) -> &Z {
    &self.zone
  }

  #[must_use]
  pub fn reference_week(
    &self
  ) -> NaiveDate {
    self.reference
  }

  fn anchor(
    &self,
    entry: &TimeRangeEntry
  ) -> NaiveDateTime {
    add_days(
      self.reference,
      i64::from(
        entry
          .weekday
          .num_days_from_sunday()
      )
    )
    .and_time(entry.start)
  }

  /// Local entry to one or two UTC entries.
  #[tracing::instrument(skip_all, fields(entry = %entry))]
  pub fn local_to_utc(
    &self,
    entry: &TimeRangeEntry
  ) -> Vec<TimeRangeEntry> {
    let start = resolve_local(
      &self.zone,
      self.anchor(entry)
    )
    .with_timezone(&Utc);
    let end = start
      + Duration::minutes(
        entry.duration_minutes()
      );
    split_at_day_boundary(
      start.naive_utc(),
      end.naive_utc()
    )
  }

  /// UTC entry to one or two local entries.
  #[tracing::instrument(skip_all, fields(entry = %entry))]
  pub fn utc_to_local(
    &self,
    entry: &TimeRangeEntry
  ) -> Vec<TimeRangeEntry> {
    let start = Utc
      .from_utc_datetime(
        &self.anchor(entry)
      )
      .with_timezone(&self.zone);
    let end = start.clone()
      + Duration::minutes(
        entry.duration_minutes()
      );
    split_at_day_boundary(
      start.naive_local(),
      end.naive_local()
    )
  }

  #[must_use]
  pub fn local_entries_to_utc(
    &self,
    entries: &[TimeRangeEntry]
  ) -> Vec<TimeRangeEntry> {
    entries
      .iter()
      .flat_map(|entry| {
        self.local_to_utc(entry)
      })
      .collect()
  }

  #[must_use]
  pub fn utc_entries_to_local(
    &self,
    entries: &[TimeRangeEntry]
  ) -> Vec<TimeRangeEntry> {
    entries
      .iter()
      .flat_map(|entry| {
        self.utc_to_local(entry)
      })
      .collect()
  }
}

fn split_at_day_boundary(
  start: NaiveDateTime,
  end: NaiveDateTime
) -> Vec<TimeRangeEntry> {
  let start_day = start.weekday();
  let end_day = end.weekday();
  if start_day == end_day {
    return vec![TimeRangeEntry::new(
      start_day,
      start.time(),
      end.time()
    )];
  }

  trace!(
    start = %start,
    end = %end,
    "range crosses a day boundary; splitting"
  );
  vec![
    TimeRangeEntry::new(
      start_day,
      start.time(),
      end_of_day()
    ),
    TimeRangeEntry::new(
      end_day,
      NaiveTime::MIN,
      end.time()
    ),
  ]
}

fn end_of_day() -> NaiveTime {
  NaiveTime::from_hms_opt(23, 59, 0)
    .unwrap_or(NaiveTime::MIN)
}

/// Renders entries as `Weekday HH:mm - HH:mm` joined by `", "`.
#[must_use]
pub fn format_time_ranges(
  entries: &[TimeRangeEntry]
) -> String {
  entries
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join(", ")
}

/// Converts local entries to UTC and renders the wire value.
#[tracing::instrument(skip_all, fields(count = entries.len()))]
pub fn serialize_forbidden_time_range<
  Z: TimeZone
>(
  entries: &[TimeRangeEntry],
  converter: &ZoneConverter<Z>
) -> String {
  let utc =
    converter.local_entries_to_utc(entries);
  debug!(
    local = entries.len(),
    utc = utc.len(),
    "serialized time ranges"
  );
  format_time_ranges(&utc)
}

/// Best-effort parse of a time range list; no zone conversion.
///
/// Segments are separated by commas or newlines. Segments that do
/// not match `Weekday H:mm - H:mm`, name an unknown weekday, or carry
/// an impossible clock reading are dropped.
#[tracing::instrument(skip(value))]
pub fn parse_forbidden_time_range(
  value: &str
) -> Vec<TimeRangeEntry> {
  let range_re =
    match Regex::new(RANGE_PATTERN) {
      | Ok(re) => re,
      | Err(err) => {
        tracing::error!(
          error = %err,
          "internal regex compile failure"
        );
        return vec![];
      }
    };

  value
    .split([',', '\n'])
    .map(str::trim)
    .filter(|segment| !segment.is_empty())
    .filter_map(|segment| {
      let parsed =
        parse_segment(&range_re, segment);
      if parsed.is_none() {
        debug!(
          segment,
          "dropping unparseable time range segment"
        );
      }
      parsed
    })
    .collect()
}

fn parse_segment(
  range_re: &Regex,
  segment: &str
) -> Option<TimeRangeEntry> {
  let captures =
    range_re.captures(segment.trim())?;
  let weekday = parse_weekday_name(
    captures.name("weekday")?.as_str()
  )?;
  let start = parse_clock_time(
    captures.name("start")?.as_str()
  )?;
  let end = parse_clock_time(
    captures.name("end")?.as_str()
  )?;
  Some(TimeRangeEntry::new(
    weekday, start, end
  ))
}
