use std::io::{self, IsTerminal, Write};

use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::constraint::{ConstraintRecord, ConstraintValue};
use crate::datetime::weekday_name;
use crate::layout::{DayLayout, GridMetrics};
use crate::selection::TimeSelection;
use crate::timerange::TimeRangeEntry;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color").unwrap_or(true);
        Ok(Self { color })
    }

    pub fn print_json<T: Serialize + ?Sized>(&mut self, value: &T) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
        Ok(())
    }

    pub fn print_line(&mut self, line: &str) -> anyhow::Result<()> {
        writeln!(io::stdout().lock(), "{line}")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, entries), fields(count = entries.len()))]
    pub fn print_entries(&mut self, entries: &[TimeRangeEntry]) -> anyhow::Result<()> {
        let stdout = io::stdout().lock();
        self.write_entries(stdout, entries)
    }

    fn write_entries<W: Write>(&self, out: W, entries: &[TimeRangeEntry]) -> anyhow::Result<()> {
        let headers = vec![
            "Weekday".to_string(),
            "Start".to_string(),
            "End".to_string(),
            "Minutes".to_string(),
        ];

        let rows = entries
            .iter()
            .map(|entry| {
                vec![
                    self.paint(weekday_name(entry.weekday), "33"),
                    entry.start.format("%H:%M").to_string(),
                    entry.end.format("%H:%M").to_string(),
                    entry.duration_minutes().to_string(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip_all, fields(key = %record.key))]
    pub fn print_constraint(
        &mut self,
        value: &ConstraintValue,
        record: &ConstraintRecord,
    ) -> anyhow::Result<()> {
        {
            let mut out = io::stdout().lock();
            let kind = if value.kind().is_some() {
                "known"
            } else {
                "passthrough"
            };
            writeln!(out, "key       {}", self.paint(value.key(), "33"))?;
            writeln!(out, "kind      {kind}")?;
            writeln!(out, "local     {}", value.display_text())?;
            writeln!(out, "stored    {}", record.value)?;
        }

        if let Some(entries) = value.time_ranges()
            && !entries.is_empty()
        {
            self.print_line("")?;
            self.print_entries(entries)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(days = days.len()))]
    pub fn print_week_layout(
        &mut self,
        days: &[DayLayout<'_>],
        metrics: &GridMetrics,
        indicator: Option<(NaiveDateTime, f64)>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_week_layout(&mut out, days, metrics, indicator)
    }

    fn write_week_layout<W: Write>(
        &self,
        mut out: W,
        days: &[DayLayout<'_>],
        metrics: &GridMetrics,
        indicator: Option<(NaiveDateTime, f64)>,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "Date".to_string(),
            "Day".to_string(),
            "Time".to_string(),
            "Col".to_string(),
            "Left%".to_string(),
            "Width%".to_string(),
            "Top".to_string(),
            "Height".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::new();
        for day in days {
            for placed in &day.events {
                let event = placed.event;
                let span = format!(
                    "{}-{}",
                    event.start.format("%H:%M"),
                    event.end.format("%H:%M")
                );
                let top = format!("{:.0}", placed.top);
                let top = if metrics.is_visible(placed.top) {
                    top
                } else {
                    self.paint(&top, "31")
                };
                rows.push(vec![
                    day.date.format("%Y-%m-%d").to_string(),
                    weekday_name(day.date.weekday()).to_string(),
                    self.paint(&span, "36"),
                    format!("{}/{}", placed.column + 1, placed.columns),
                    format!("{:.1}", placed.left),
                    format!("{:.1}", placed.width),
                    top,
                    format!("{:.0}", placed.height),
                    event.title.clone(),
                ]);
            }
        }

        if rows.is_empty() {
            writeln!(out, "No events in this week.")?;
        } else {
            write_table(&mut out, headers, rows)?;
        }

        if let Some((now, offset)) = indicator {
            let note = if metrics.is_visible(offset) {
                String::new()
            } else {
                " (outside visible hours)".to_string()
            };
            writeln!(
                out,
                "now {} at {offset:.0}px{note}",
                self.paint(&now.format("%Y-%m-%d %H:%M").to_string(), "32")
            )?;
        }
        Ok(())
    }

    pub fn print_selection(
        &mut self,
        selection: &TimeSelection,
        entry: Option<&TimeRangeEntry>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "date      {}", selection.date.format("%Y-%m-%d"))?;
        writeln!(
            out,
            "hours     {} - {}",
            selection.start_hour, selection.end_hour
        )?;
        writeln!(
            out,
            "time      {} - {}",
            selection.start_time().format("%H:%M"),
            selection.end_time().format("%H:%M")
        )?;
        match entry {
            Some(entry) => writeln!(out, "entry     {}", self.paint(&entry.to_string(), "33"))?,
            None => writeln!(out, "entry     (empty selection)")?,
        }
        Ok(())
    }

    pub fn print_key_values<I, K, V>(&mut self, pairs: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let rows = pairs
            .into_iter()
            .map(|(k, v)| vec![k.as_ref().to_string(), v.as_ref().to_string()])
            .collect();
        write_table(
            io::stdout().lock(),
            vec!["Key".to_string(), "Value".to_string()],
            rows,
        )
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect::<Vec<_>>();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| format!("{header:width$}"))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{}", header_line.trim_end())?;

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
                format!("{cell}{}", " ".repeat(width.saturating_sub(visible)))
            })
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
