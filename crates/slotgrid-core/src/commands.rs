use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::constraint::{ConstraintKind, ConstraintValue};
use crate::datetime::start_of_week;
use crate::indicator::{IndicatorTicker, zone_clock};
use crate::layout::{
    CalendarEvent, current_time_indicator_position, entries_to_week_events, layout_week,
    snap_hour_to_grid,
};
use crate::render::Renderer;
use crate::selection::{PointerEvent, SelectionGeometry, replay};
use crate::timerange::{ZoneConverter, format_time_ranges, parse_forbidden_time_range};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "to-utc", "to-local", "encode", "decode", "layout", "now", "snap", "select", "blocks",
        "commands", "show", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(cfg, renderer, inv))]
pub fn dispatch(
    cfg: &Config,
    renderer: &mut Renderer,
    zone: Tz,
    mut inv: Invocation,
) -> anyhow::Result<()> {
    debug!(command = %inv.command, args = ?inv.args, "dispatching command");

    match inv.command.as_str() {
        "to-utc" => cmd_to_utc(renderer, zone, &mut inv),
        "to-local" => cmd_to_local(renderer, zone, &mut inv),
        "encode" => cmd_encode(renderer, zone, &mut inv),
        "decode" => cmd_decode(renderer, zone, &mut inv),
        "layout" => cmd_layout(cfg, renderer, zone, &mut inv),
        "now" => cmd_now(cfg, renderer, zone, &mut inv),
        "snap" => cmd_snap(cfg, renderer, &inv.args),
        "select" => cmd_select(cfg, renderer, &inv.args),
        "blocks" => cmd_blocks(cfg, renderer, zone, &mut inv),
        "commands" => cmd_commands(),
        "show" => cmd_show(cfg, renderer, zone),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn today_in(zone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&zone).date_naive()
}

fn parse_date_arg(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("expected a date like 2026-10-19, got: {raw}"))
}

fn parse_number_arg(raw: &str, what: &str) -> anyhow::Result<f64> {
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("{what} must be a number, got: {raw}"))
}

/// Converter anchored on `--week`, or on the current week.
fn converter_for(zone: Tz, inv: &mut Invocation) -> anyhow::Result<ZoneConverter<Tz>> {
    match inv.take_option("--week")? {
        Some(raw) => Ok(ZoneConverter::anchored(zone, parse_date_arg(&raw)?)),
        None => Ok(ZoneConverter::current_week(zone)),
    }
}

fn joined_text(args: &[String], usage: &str) -> anyhow::Result<String> {
    if args.is_empty() {
        return Err(anyhow!("usage: {usage}"));
    }
    Ok(args.join(" "))
}

#[instrument(skip(renderer, inv))]
fn cmd_to_utc(renderer: &mut Renderer, zone: Tz, inv: &mut Invocation) -> anyhow::Result<()> {
    info!("command to-utc");
    let conv = converter_for(zone, inv)?;
    let as_json = inv.take_flag("--json");
    let text = joined_text(&inv.args, "to-utc <ranges> [--week YYYY-MM-DD] [--json]")?;

    let utc = conv.local_entries_to_utc(&parse_forbidden_time_range(&text));
    if as_json {
        renderer.print_json(&utc)
    } else {
        renderer.print_line(&format_time_ranges(&utc))
    }
}

#[instrument(skip(renderer, inv))]
fn cmd_to_local(renderer: &mut Renderer, zone: Tz, inv: &mut Invocation) -> anyhow::Result<()> {
    info!("command to-local");
    let conv = converter_for(zone, inv)?;
    let as_json = inv.take_flag("--json");
    let text = joined_text(&inv.args, "to-local <ranges> [--week YYYY-MM-DD] [--json]")?;

    let local = conv.utc_entries_to_local(&parse_forbidden_time_range(&text));
    if as_json {
        renderer.print_json(&local)
    } else {
        renderer.print_entries(&local)
    }
}

fn split_key_and_value(args: &[String], usage: &str) -> anyhow::Result<(String, String)> {
    let Some((key, rest)) = args.split_first() else {
        return Err(anyhow!("usage: {usage}"));
    };
    Ok((key.clone(), rest.join(" ")))
}

#[instrument(skip(renderer, inv))]
fn cmd_encode(renderer: &mut Renderer, zone: Tz, inv: &mut Invocation) -> anyhow::Result<()> {
    info!("command encode");
    let conv = converter_for(zone, inv)?;
    let as_json = inv.take_flag("--json");
    let (key, text) = split_key_and_value(&inv.args, "encode <key> <value> [--week YYYY-MM-DD]")?;

    if ConstraintKind::from_key(&key).is_none() {
        warn!(key = %key, "unknown constraint key; value is stored as written");
    }
    let record = ConstraintValue::parse_local(&key, &text).encode(&conv);
    if as_json {
        renderer.print_json(&record)
    } else {
        renderer.print_line(&record.value)
    }
}

#[instrument(skip(renderer, inv))]
fn cmd_decode(renderer: &mut Renderer, zone: Tz, inv: &mut Invocation) -> anyhow::Result<()> {
    info!("command decode");
    let conv = converter_for(zone, inv)?;
    let as_json = inv.take_flag("--json");
    let (key, wire) = split_key_and_value(&inv.args, "decode <key> <value> [--week YYYY-MM-DD]")?;

    let value = ConstraintValue::decode(&key, &wire, &conv);
    if as_json {
        return renderer.print_json(&json!({
            "key": value.key(),
            "display": value.display_text(),
            "entries": value.time_ranges(),
        }));
    }
    let record = value.encode(&conv);
    renderer.print_constraint(&value, &record)
}

/// Reads a JSON array of events from a file, or stdin for `-`.
fn read_events(source: &str) -> anyhow::Result<Vec<CalendarEvent>> {
    let raw = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed reading events from stdin")?;
        buf
    } else {
        fs::read_to_string(Path::new(source))
            .with_context(|| format!("failed to read events file {source}"))?
    };

    parse_events(&raw).with_context(|| format!("invalid events in {source}"))
}

fn parse_events(raw: &str) -> anyhow::Result<Vec<CalendarEvent>> {
    let events: Vec<CalendarEvent> = serde_json::from_str(raw.trim())?;
    for event in events.iter().filter(|event| event.end < event.start) {
        warn!(id = %event.id, "event ends before it starts");
    }
    Ok(events)
}

#[instrument(skip(cfg, renderer, inv))]
fn cmd_layout(
    cfg: &Config,
    renderer: &mut Renderer,
    zone: Tz,
    inv: &mut Invocation,
) -> anyhow::Result<()> {
    info!("command layout");
    let week = inv.take_option("--week")?;
    let as_json = inv.take_flag("--json");
    let source = inv
        .args
        .first()
        .ok_or_else(|| anyhow!("usage: layout <events.json|-> [--week YYYY-MM-DD] [--json]"))?
        .clone();

    let events = read_events(&source)?;
    let focus = match week {
        Some(raw) => parse_date_arg(&raw)?,
        None => today_in(zone),
    };
    render_week(cfg, renderer, zone, &events, focus, as_json)
}

fn render_week(
    cfg: &Config,
    renderer: &mut Renderer,
    zone: Tz,
    events: &[CalendarEvent],
    focus: NaiveDate,
    as_json: bool,
) -> anyhow::Result<()> {
    let metrics = cfg.grid_metrics()?;
    let week_start = start_of_week(focus, cfg.week_start()?);
    let days = layout_week(events, week_start, &metrics);

    let now = zone_clock(zone)();
    let indicator = days.iter().find_map(|day| {
        current_time_indicator_position(now, day.date, &metrics).map(|offset| (now, offset))
    });

    if as_json {
        return renderer.print_json(&json!({
            "weekStart": week_start,
            "metrics": metrics,
            "days": days,
            "indicator": indicator.map(|(_, offset)| offset),
        }));
    }
    renderer.print_week_layout(&days, &metrics, indicator)
}

#[instrument(skip(cfg, renderer, inv))]
fn cmd_now(
    cfg: &Config,
    renderer: &mut Renderer,
    zone: Tz,
    inv: &mut Invocation,
) -> anyhow::Result<()> {
    info!("command now");
    let watch = inv
        .take_option("--watch")?
        .map(|raw| {
            raw.trim()
                .parse::<usize>()
                .with_context(|| format!("--watch expects a tick count, got: {raw}"))
        })
        .transpose()?;
    let metrics = cfg.grid_metrics()?;
    let day = match inv.args.first() {
        Some(raw) => parse_date_arg(raw)?,
        None => today_in(zone),
    };

    let describe = move |now: NaiveDateTime| match current_time_indicator_position(
        now, day, &metrics,
    ) {
        Some(offset) if metrics.is_visible(offset) => {
            format!("{} {offset:.0}px", now.format("%Y-%m-%d %H:%M:%S"))
        }
        Some(offset) => format!(
            "{} {offset:.0}px (outside visible hours)",
            now.format("%Y-%m-%d %H:%M:%S")
        ),
        None => format!("{} not on {day}", now.format("%Y-%m-%d %H:%M:%S")),
    };

    let Some(ticks) = watch else {
        return renderer.print_line(&describe(zone_clock(zone)()));
    };
    if ticks == 0 {
        return Err(anyhow!("--watch expects at least one tick"));
    }

    let period = Duration::from_secs(cfg.tick_seconds()?);
    let (tx, rx) = mpsc::channel();
    let ticker = IndicatorTicker::spawn(period, zone_clock(zone), move |now| {
        let _ = tx.send(describe(now));
    });
    for _ in 0..ticks {
        let line = rx
            .recv()
            .context("indicator ticker stopped unexpectedly")?;
        renderer.print_line(&line)?;
    }
    ticker.stop();
    Ok(())
}

fn cmd_snap(cfg: &Config, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    let raw = args.first().ok_or_else(|| anyhow!("usage: snap <hour>"))?;
    let metrics = cfg.grid_metrics()?;
    let snapped = snap_hour_to_grid(
        parse_number_arg(raw, "hour")?,
        metrics.day_start_hour,
        metrics.hours_per_day,
    );
    renderer.print_line(&snapped.to_string())
}

#[instrument(skip(cfg, renderer))]
fn cmd_select(cfg: &Config, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command select");
    const USAGE: &str = "usage: select <YYYY-MM-DD> <top> <y-down> [y-move..] <y-up>";
    if args.len() < 4 {
        return Err(anyhow!(USAGE));
    }

    let date = parse_date_arg(&args[0])?;
    let top = parse_number_arg(&args[1], "top")?;
    let ys = args[2..]
        .iter()
        .map(|raw| parse_number_arg(raw, "y"))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let Some((down, moves)) = ys.split_first() else {
        return Err(anyhow!(USAGE));
    };

    let geometry = SelectionGeometry {
        metrics: cfg.grid_metrics()?,
        container_top: Some(top),
    };
    let mut events = vec![PointerEvent::Down { date, y: *down }];
    events.extend(moves.iter().map(|y| PointerEvent::Move { y: *y }));
    events.push(PointerEvent::Up);

    let selection = replay(events, &geometry)
        .pop()
        .ok_or_else(|| anyhow!("gesture produced no selection"))?;
    let entry = selection.to_entry();
    renderer.print_selection(&selection, entry.as_ref())
}

#[instrument(skip(cfg, renderer, inv))]
fn cmd_blocks(
    cfg: &Config,
    renderer: &mut Renderer,
    zone: Tz,
    inv: &mut Invocation,
) -> anyhow::Result<()> {
    info!("command blocks");
    let week = inv.take_option("--week")?;
    let as_json = inv.take_flag("--json");
    let (key, wire) = split_key_and_value(
        &inv.args,
        "blocks <key> <value> [--week YYYY-MM-DD] [--json]",
    )?;
    let kind = ConstraintKind::from_key(&key)
        .filter(|kind| kind.is_time_range())
        .ok_or_else(|| anyhow!("blocks needs a time range constraint key, got: {key}"))?;

    let focus = match week {
        Some(raw) => parse_date_arg(&raw)?,
        None => today_in(zone),
    };
    let conv = ZoneConverter::anchored(zone, focus);
    let value = ConstraintValue::decode(kind.as_key(), &wire, &conv);
    let entries = value.time_ranges().unwrap_or_default();

    let title = match kind {
        ConstraintKind::ForbiddenTimerange => "Unavailable",
        _ => "Preferred",
    };
    let week_start = start_of_week(focus, cfg.week_start()?);
    let events = entries_to_week_events(entries, week_start, title);
    render_week(cfg, renderer, zone, &events, focus, as_json)
}

fn cmd_commands() -> anyhow::Result<()> {
    for name in known_command_names() {
        println!("{name}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config, renderer: &mut Renderer, zone: Tz) -> anyhow::Result<()> {
    let mut pairs = cfg
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<Vec<_>>();
    pairs.sort();
    pairs.push(("(resolved timezone)".to_string(), zone.name().to_string()));
    for file in &cfg.loaded_files {
        pairs.push(("(loaded file)".to_string(), file.display().to_string()));
    }
    renderer.print_key_values(pairs)
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Commands:
  to-utc <ranges>            local weekly ranges to stored UTC text
  to-local <ranges>          stored UTC text to local entries
  encode <key> <value>       encode a constraint value for storage
  decode <key> <value>       decode a stored constraint value
  layout <events.json|->     lay out a week of events
  now [YYYY-MM-DD]           current-time line offset (--watch N)
  snap <hour>                snap an hour to the half-hour grid
  select <date> <top> <y..>  replay a drag selection
  blocks <key> <value>       lay out constraint windows on the week
  commands, show, help, version

Conversions accept --week YYYY-MM-DD to pick the reference week."
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{expand_command_abbrev, known_command_names, parse_date_arg, parse_events};

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("dec", &known), Some("decode"));
        assert_eq!(expand_command_abbrev("to-l", &known), Some("to-local"));
        assert_eq!(expand_command_abbrev("s", &known), None);
        assert_eq!(expand_command_abbrev("sn", &known), Some("snap"));
        assert_eq!(expand_command_abbrev("frobnicate", &known), None);
    }

    #[test]
    fn events_parse_from_json_array() {
        let events = parse_events(
            r#"[
                {"id":"1","title":"Standup","start":"2026-10-19T09:00:00","end":"2026-10-19T09:15:00"},
                {"id":"2","title":"Review","start":"2026-10-19T09:00:00","end":"2026-10-19T10:00:00","color":"teal"}
            ]"#,
        )
        .expect("valid events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].color.as_deref(), Some("teal"));
        assert_eq!(events[0].description, None);

        assert!(parse_events(r#"{"id":"1"}"#).is_err());
    }

    #[test]
    fn dates_use_iso_format() {
        assert_eq!(
            parse_date_arg("2026-10-19").expect("date").to_string(),
            "2026-10-19"
        );
        assert!(parse_date_arg("19/10/2026").is_err());
    }
}
