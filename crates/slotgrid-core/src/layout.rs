use chrono::{
  Datelike,
  NaiveDate,
  NaiveDateTime
};
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
  hour_fraction
};
use crate::timerange::TimeRangeEntry;

/// Vertical geometry of the day columns.
#[derive(
  Debug, Clone, Copy, PartialEq, Serialize,
)]
pub struct GridMetrics {
  pub day_start_hour: f64,
  pub hours_per_day:  f64,
  pub hour_height:    f64
}

impl Default for GridMetrics {
  fn default() -> Self {
    Self {
      day_start_hour: 8.0,
      hours_per_day:  12.0,
      hour_height:    60.0
    }
  }
}

impl GridMetrics {
  #[must_use]
  pub fn day_end_hour(&self) -> f64 {
    self.day_start_hour
      + self.hours_per_day
  }

  #[must_use]
  pub fn grid_height(&self) -> f64 {
    self.hours_per_day
      * self.hour_height
  }

  /// Pixel offset of a fractional hour from the top of the grid.
  #[must_use]
  pub fn offset_of(
    &self,
    hour: f64
  ) -> f64 {
    (hour - self.day_start_hour)
      * self.hour_height
  }

  /// Whether an offset lands inside the drawn band.
  #[must_use]
  pub fn is_visible(
    &self,
    offset: f64
  ) -> bool {
    (0.0..=self.grid_height())
      .contains(&offset)
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct CalendarEvent {
  pub id:          String,
  pub title:       String,
  pub start:       NaiveDateTime,
  pub end:         NaiveDateTime,
  #[serde(default)]
  pub color:       Option<String>,
  #[serde(default)]
  pub description: Option<String>
}

/// An event with its place on the grid.
///
/// `left`/`width` are percentages of the day column, `top`/`height`
/// are pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedEvent<'a> {
  pub event:   &'a CalendarEvent,
  pub column:  usize,
  pub columns: usize,
  pub left:    f64,
  pub width:   f64,
  pub top:     f64,
  pub height:  f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayLayout<'a> {
  pub date:    NaiveDate,
  pub columns: usize,
  pub events:  Vec<PositionedEvent<'a>>
}

/// Greedy first-fit column assignment.
///
/// `intervals` must be sorted by start. An interval joins the first
/// column whose last interval ends at or before its start, otherwise
/// it opens a new column. Returns the column of every interval and
/// the number of columns used.
#[must_use]
pub fn assign_columns(
  intervals: &[(
    NaiveDateTime,
    NaiveDateTime
  )]
) -> (Vec<usize>, usize) {
  let mut column_ends: Vec<
    NaiveDateTime
  > = Vec::new();
  let mut assignment =
    Vec::with_capacity(intervals.len());

  for (start, end) in intervals {
    let column = match column_ends
      .iter()
      .position(|last_end| {
        last_end <= start
      }) {
      | Some(idx) => {
        column_ends[idx] = *end;
        idx
      }
      | None => {
        column_ends.push(*end);
        column_ends.len() - 1
      }
    };
    assignment.push(column);
  }

  (assignment, column_ends.len())
}

/// Places the events that start on `day` into side-by-side columns.
///
/// Nothing is clipped: events outside the visible hours keep their
/// computed offsets.
#[tracing::instrument(skip(events, metrics), fields(total = events.len()))]
pub fn layout_day_events<'a>(
  events: &'a [CalendarEvent],
  day: NaiveDate,
  metrics: &GridMetrics
) -> Vec<PositionedEvent<'a>> {
  let mut todays = events
    .iter()
    .filter(|event| {
      event.start.date() == day
    })
    .collect::<Vec<_>>();
  todays.sort_by_key(|event| event.start);

  let intervals = todays
    .iter()
    .map(|event| (event.start, event.end))
    .collect::<Vec<_>>();
  let (assignment, columns) =
    assign_columns(&intervals);
  debug!(
    events = todays.len(),
    columns,
    "laid out day"
  );

  todays
    .into_iter()
    .zip(assignment)
    .map(|(event, column)| {
      let start_hour =
        hour_fraction(&event.start);
      let end_hour =
        hour_fraction(&event.end);
      let positioned = PositionedEvent {
        event,
        column,
        columns,
        left: column as f64
          / columns as f64
          * 100.0,
        width: 100.0 / columns as f64,
        top: metrics.offset_of(start_hour),
        height: (end_hour - start_hour)
          * metrics.hour_height
      };
      trace!(
        id = %event.id,
        column,
        top = positioned.top,
        height = positioned.height,
        "positioned event"
      );
      positioned
    })
    .collect()
}

/// The seven dates of the week starting at `start`.
#[must_use]
pub fn week_days(
  start: NaiveDate
) -> [NaiveDate; 7] {
  std::array::from_fn(|offset| {
    add_days(start, offset as i64)
  })
}

pub fn layout_week<'a>(
  events: &'a [CalendarEvent],
  week_start: NaiveDate,
  metrics: &GridMetrics
) -> Vec<DayLayout<'a>> {
  week_days(week_start)
    .into_iter()
    .map(|date| {
      let events = layout_day_events(
        events, date, metrics
      );
      DayLayout {
        date,
        columns: events
          .first()
          .map_or(0, |placed| {
            placed.columns
          }),
        events
      }
    })
    .collect()
}

/// Offset of the "now" line in `day`'s column, if `day` is today.
///
/// The value is not clamped to the visible band; see
/// [`GridMetrics::is_visible`].
#[must_use]
pub fn current_time_indicator_position(
  now: NaiveDateTime,
  day: NaiveDate,
  metrics: &GridMetrics
) -> Option<f64> {
  if now.date() != day {
    return None;
  }
  Some(
    metrics
      .offset_of(hour_fraction(&now))
  )
}

/// Clamps into the visible hours and snaps to the half hour.
///
/// A negative span clamps to the band it describes, and a NaN hour
/// lands on the lower bound.
#[must_use]
pub fn snap_hour_to_grid(
  raw_hour: f64,
  day_start_hour: f64,
  hours_per_day: f64
) -> f64 {
  let day_end_hour =
    day_start_hour + hours_per_day;
  let lo =
    day_start_hour.min(day_end_hour);
  let hi =
    day_start_hour.max(day_end_hour);
  let clamped =
    raw_hour.max(lo).min(hi);
  (clamped * 2.0).round() / 2.0
}

/// Maps a pointer's page Y to a snapped hour.
///
/// Without a container anchor the first visible hour is returned.
#[must_use]
pub fn pixel_y_to_hour(
  y: f64,
  container_top: Option<f64>,
  metrics: &GridMetrics
) -> f64 {
  let Some(top) = container_top else {
    debug!(
      y,
      "no container anchor; using first visible hour"
    );
    return metrics.day_start_hour;
  };
  let raw = metrics.day_start_hour
    + (y - top) / metrics.hour_height;
  let snapped = snap_hour_to_grid(
    raw,
    metrics.day_start_hour,
    metrics.hours_per_day
  );
  trace!(
    y,
    raw,
    snapped,
    end = metrics.day_end_hour(),
    "mapped pointer to hour"
  );
  snapped
}

/// Weekly entries as events on the dates of the given week.
///
/// Entries are expected in local time already.
#[must_use]
pub fn entries_to_week_events(
  entries: &[TimeRangeEntry],
  week_start: NaiveDate,
  title: &str
) -> Vec<CalendarEvent> {
  let days = week_days(week_start);
  entries
    .iter()
    .filter_map(|entry| {
      let date =
        days.iter().find(|date| {
          date.weekday() == entry.weekday
        })?;
      Some(CalendarEvent {
        id:          Uuid::new_v4()
          .to_string(),
        title:       title.to_string(),
        start:       date
          .and_time(entry.start),
        end:         date.and_time(entry.end),
        color:       None,
        description: Some(
          entry.to_string()
        )
      })
    })
    .collect()
}
