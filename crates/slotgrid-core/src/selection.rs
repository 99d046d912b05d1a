use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, trace};

use crate::datetime::{clock_from_hour, weekday_name};
use crate::layout::{GridMetrics, pixel_y_to_hour};
use crate::timerange::TimeRangeEntry;

/// What the selection needs to turn pointer Y into hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionGeometry {
    pub metrics: GridMetrics,
    /// Page Y of the top of the day column, if known.
    pub container_top: Option<f64>,
}

impl SelectionGeometry {
    fn hour_at(&self, y: f64) -> f64 {
        pixel_y_to_hour(y, self.container_top, &self.metrics)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { date: NaiveDate, y: f64 },
    Move { y: f64 },
    Up,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SelectionState {
    #[default]
    Idle,
    Selecting {
        date: NaiveDate,
        start_hour: f64,
        current_hour: f64,
    },
}

/// A finished drag, `start_hour <= end_hour`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSelection {
    pub date: NaiveDate,
    pub start_hour: f64,
    pub end_hour: f64,
}

impl TimeSelection {
    pub fn duration_hours(&self) -> f64 {
        self.end_hour - self.start_hour
    }

    pub fn is_empty(&self) -> bool {
        self.duration_hours() <= 0.0
    }

    pub fn start_time(&self) -> NaiveTime {
        clock_from_hour(self.start_hour)
    }

    pub fn end_time(&self) -> NaiveTime {
        clock_from_hour(self.end_hour)
    }

    /// The weekly entry covering this selection; `None` for a click.
    pub fn to_entry(&self) -> Option<TimeRangeEntry> {
        if self.is_empty() {
            return None;
        }
        Some(TimeRangeEntry::new(
            self.date.weekday(),
            self.start_time(),
            self.end_time(),
        ))
    }
}

impl SelectionState {
    pub fn is_selecting(&self) -> bool {
        matches!(self, SelectionState::Selecting { .. })
    }

    /// The in-progress range, normalized, for drawing the drag preview.
    pub fn preview(&self) -> Option<TimeSelection> {
        match *self {
            SelectionState::Idle => None,
            SelectionState::Selecting {
                date,
                start_hour,
                current_hour,
            } => Some(normalize(date, start_hour, current_hour)),
        }
    }

    /// Applies one pointer event.
    ///
    /// Returns the next state and, on release, the finished selection.
    pub fn apply(
        self,
        event: PointerEvent,
        geometry: &SelectionGeometry,
    ) -> (SelectionState, Option<TimeSelection>) {
        match (self, event) {
            (state, PointerEvent::Down { date, y }) => {
                let hour = geometry.hour_at(y);
                if state.is_selecting() {
                    debug!("pointer down during a drag; restarting selection");
                }
                trace!(%date, hour, "selection started");
                (
                    SelectionState::Selecting {
                        date,
                        start_hour: hour,
                        current_hour: hour,
                    },
                    None,
                )
            }
            (
                SelectionState::Selecting {
                    date, start_hour, ..
                },
                PointerEvent::Move { y },
            ) => (
                SelectionState::Selecting {
                    date,
                    start_hour,
                    current_hour: geometry.hour_at(y),
                },
                None,
            ),
            (
                SelectionState::Selecting {
                    date,
                    start_hour,
                    current_hour,
                },
                PointerEvent::Up | PointerEvent::Leave,
            ) => {
                let selection = normalize(date, start_hour, current_hour);
                debug!(
                    date = %selection.date,
                    weekday = weekday_name(selection.date.weekday()),
                    start = selection.start_hour,
                    end = selection.end_hour,
                    "selection finished"
                );
                (SelectionState::Idle, Some(selection))
            }
            (SelectionState::Idle, _) => (SelectionState::Idle, None),
        }
    }
}

fn normalize(date: NaiveDate, a: f64, b: f64) -> TimeSelection {
    TimeSelection {
        date,
        start_hour: a.min(b),
        end_hour: a.max(b),
    }
}

/// Feeds a whole gesture through the state machine.
///
/// Returns every selection emitted along the way.
pub fn replay<I>(events: I, geometry: &SelectionGeometry) -> Vec<TimeSelection>
where
    I: IntoIterator<Item = PointerEvent>,
{
    let mut state = SelectionState::Idle;
    let mut emitted = Vec::new();
    for event in events {
        let (next, selection) = state.apply(event, geometry);
        state = next;
        emitted.extend(selection);
    }
    emitted
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Weekday};

    use super::{PointerEvent, SelectionGeometry, SelectionState, TimeSelection, replay};
    use crate::layout::GridMetrics;
    use crate::timerange::TimeRangeEntry;

    fn geometry() -> SelectionGeometry {
        SelectionGeometry {
            metrics: GridMetrics::default(),
            container_top: Some(0.0),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 21).expect("valid date")
    }

    fn y_for(hour: f64) -> f64 {
        (hour - 8.0) * 60.0
    }

    #[test]
    fn upward_drag_is_normalized() {
        let emitted = replay(
            [
                PointerEvent::Down {
                    date: date(),
                    y: y_for(14.0),
                },
                PointerEvent::Move { y: y_for(12.1) },
                PointerEvent::Move { y: y_for(10.0) },
                PointerEvent::Up,
            ],
            &geometry(),
        );
        assert_eq!(
            emitted,
            vec![TimeSelection {
                date: date(),
                start_hour: 10.0,
                end_hour: 14.0,
            }]
        );
    }

    #[test]
    fn move_updates_only_current_hour() {
        let g = geometry();
        let (state, out) = SelectionState::Idle.apply(
            PointerEvent::Down {
                date: date(),
                y: y_for(9.2),
            },
            &g,
        );
        assert!(out.is_none());
        assert_eq!(
            state,
            SelectionState::Selecting {
                date: date(),
                start_hour: 9.0,
                current_hour: 9.0,
            }
        );

        let (state, out) = state.apply(PointerEvent::Move { y: y_for(11.8) }, &g);
        assert!(out.is_none());
        assert_eq!(
            state,
            SelectionState::Selecting {
                date: date(),
                start_hour: 9.0,
                current_hour: 12.0,
            }
        );
        assert_eq!(
            state.preview().map(|s| s.duration_hours()),
            Some(3.0)
        );
    }

    #[test]
    fn leave_finishes_and_click_is_still_emitted() {
        let emitted = replay(
            [
                PointerEvent::Down {
                    date: date(),
                    y: y_for(15.0),
                },
                PointerEvent::Leave,
            ],
            &geometry(),
        );
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].is_empty());
        assert_eq!(emitted[0].to_entry(), None);
    }

    #[test]
    fn idle_ignores_moves_and_releases() {
        let g = geometry();
        for event in [PointerEvent::Move { y: 10.0 }, PointerEvent::Up, PointerEvent::Leave] {
            assert_eq!(
                SelectionState::Idle.apply(event, &g),
                (SelectionState::Idle, None)
            );
        }
    }

    #[test]
    fn second_press_restarts_the_drag() {
        let emitted = replay(
            [
                PointerEvent::Down {
                    date: date(),
                    y: y_for(9.0),
                },
                PointerEvent::Move { y: y_for(11.0) },
                PointerEvent::Down {
                    date: date(),
                    y: y_for(16.0),
                },
                PointerEvent::Move { y: y_for(17.5) },
                PointerEvent::Up,
            ],
            &geometry(),
        );
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].start_hour, 16.0);
        assert_eq!(emitted[0].end_hour, 17.5);
    }

    #[test]
    fn drags_clamp_to_the_visible_band() {
        let emitted = replay(
            [
                PointerEvent::Down {
                    date: date(),
                    y: y_for(19.0),
                },
                PointerEvent::Move { y: 10_000.0 },
                PointerEvent::Up,
            ],
            &geometry(),
        );
        assert_eq!(emitted[0].end_hour, 20.0);
    }

    #[test]
    fn missing_container_falls_back_to_first_hour() {
        let g = SelectionGeometry {
            metrics: GridMetrics::default(),
            container_top: None,
        };
        let emitted = replay(
            [
                PointerEvent::Down {
                    date: date(),
                    y: 500.0,
                },
                PointerEvent::Up,
            ],
            &g,
        );
        assert_eq!(emitted[0].start_hour, 8.0);
    }

    #[test]
    fn selection_converts_to_weekly_entry() {
        let selection = TimeSelection {
            date: date(),
            start_hour: 9.5,
            end_hour: 11.0,
        };
        assert_eq!(
            selection.to_entry(),
            Some(
                TimeRangeEntry::from_clock(Weekday::Wed, "09:30", "11:00")
                    .expect("valid entry")
            )
        );
    }
}
