use std::fs;

use chrono::{Datelike, NaiveDate, Weekday};
use slotgrid_core::config::Config;
use slotgrid_core::constraint::{ConstraintRecord, ConstraintValue};
use slotgrid_core::datetime::start_of_week;
use slotgrid_core::layout::{entries_to_week_events, layout_week};
use slotgrid_core::selection::{PointerEvent, SelectionGeometry, replay};
use slotgrid_core::timerange::{TimeRangeEntry, ZoneConverter};
use tempfile::tempdir;

fn tokyo_week() -> ZoneConverter<chrono_tz::Tz> {
    ZoneConverter::anchored(
        chrono_tz::Asia::Tokyo,
        NaiveDate::from_ymd_opt(2026, 1, 7).expect("valid date"),
    )
}

#[test]
fn stored_constraint_lands_on_configured_grid() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("slotgridrc");
    fs::write(
        &rc,
        "calendar.day_start_hour = 6\n\
         calendar.hours_per_day = 16\n\
         calendar.hour_height = 48\n\
         calendar.week_start = monday\n",
    )
    .expect("write rc");

    let cfg = Config::load(Some(rc.as_path())).expect("load rc");
    let metrics = cfg.grid_metrics().expect("grid metrics");
    let week_start = start_of_week(
        NaiveDate::from_ymd_opt(2026, 1, 7).expect("valid date"),
        cfg.week_start().expect("week start"),
    );
    assert_eq!(week_start.weekday(), Weekday::Mon);

    let conv = tokyo_week();
    let stored = ConstraintRecord {
        key: "forbidden_timerange".to_string(),
        value: "Sunday 23:00 - 23:59, Monday 00:00 - 01:00".to_string(),
    };
    let value = stored.decode(&conv);
    let entries = value.time_ranges().expect("time range value");
    assert_eq!(
        entries,
        &[
            TimeRangeEntry::from_clock(Weekday::Mon, "08:00", "08:59").expect("entry"),
            TimeRangeEntry::from_clock(Weekday::Mon, "09:00", "10:00").expect("entry"),
        ]
    );

    let events = entries_to_week_events(entries, week_start, "Unavailable");
    let week = layout_week(&events, week_start, &metrics);
    let monday = &week[0];
    assert_eq!(monday.date, week_start);
    assert_eq!(monday.columns, 1);
    assert_eq!(monday.events[0].top, 96.0);
    assert_eq!(monday.events[1].top, 144.0);
    assert_eq!(monday.events[1].height, 48.0);
    assert!(week[1..].iter().all(|day| day.events.is_empty()));
}

#[test]
fn drag_selection_is_stored_in_utc() {
    let cfg = Config::default();
    let geometry = SelectionGeometry {
        metrics: cfg.grid_metrics().expect("grid metrics"),
        container_top: Some(100.0),
    };
    let wednesday = NaiveDate::from_ymd_opt(2026, 1, 7).expect("valid date");

    let selections = replay(
        [
            PointerEvent::Down {
                date: wednesday,
                y: 160.0,
            },
            PointerEvent::Move { y: 220.0 },
            PointerEvent::Move { y: 310.0 },
            PointerEvent::Up,
        ],
        &geometry,
    );
    assert_eq!(selections.len(), 1);
    let entry = selections[0].to_entry().expect("non-empty selection");
    assert_eq!(entry.to_string(), "Wednesday 09:00 - 11:30");

    let conv = tokyo_week();
    let record = ConstraintValue::PreferredTimerange(vec![entry]).encode(&conv);
    assert_eq!(record.key, "preferred_timerange");
    assert_eq!(record.value, "Wednesday 00:00 - 02:30");

    let reloaded = record.decode(&conv);
    assert_eq!(reloaded.time_ranges(), Some(&[entry][..]));
}

#[test]
fn hand_typed_ranges_survive_a_storage_round_trip() {
    let conv = tokyo_week();
    let typed = ConstraintValue::parse_local(
        "forbidden_timerange",
        "monday 9:00-12:00, Funday 10:00 - 11:00,\nFriday 18:00 - 20:00",
    );
    let record = typed.encode(&conv);
    assert_eq!(
        record.value,
        "Monday 00:00 - 03:00, Friday 09:00 - 11:00"
    );
    assert_eq!(
        record.decode(&conv).display_text(),
        "Monday 09:00 - 12:00, Friday 18:00 - 20:00"
    );
}
