use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "slotgrid",
    version,
    about = "Weekly constraint time ranges and calendar grid layout",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rcfile")]
    pub rcfile: Option<PathBuf>,

    /// IANA zone treated as local time, e.g. Asia/Tokyo.
    #[arg(long = "timezone")]
    pub timezone: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let mut tokens = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string());

        let Some(first) = tokens.next() else {
            let cmd = cfg
                .get("default.command")
                .unwrap_or_else(|| "help".to_string());
            debug!(command = %cmd, "no explicit command, using default");
            return Ok(Self {
                command: cmd,
                args: vec![],
            });
        };

        let known = crate::commands::known_command_names();
        let command = crate::commands::expand_command_abbrev(&first, &known)
            .ok_or_else(|| anyhow!("unknown or ambiguous command: {first}"))?;
        debug!(token = %first, expanded = %command, "resolved command token");

        Ok(Self {
            command: command.to_string(),
            args: tokens.collect(),
        })
    }

    /// Removes `--flag value` from the arguments, returning the value.
    pub fn take_option(&mut self, flag: &str) -> anyhow::Result<Option<String>> {
        let Some(idx) = self.args.iter().position(|arg| arg == flag) else {
            return Ok(None);
        };
        if idx + 1 >= self.args.len() {
            return Err(anyhow!("{flag} expects a value"));
        }
        let value = self.args.remove(idx + 1);
        self.args.remove(idx);
        Ok(Some(value))
    }

    /// Removes a bare `--flag`, returning whether it was present.
    pub fn take_flag(&mut self, flag: &str) -> bool {
        let before = self.args.len();
        self.args.retain(|arg| arg != flag);
        self.args.len() != before
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{GlobalCli, Invocation, preprocess_args};
    use crate::config::Config;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&os(&[
            "slotgrid",
            "rc.calendar.hour_height=48",
            "layout",
            "rc.color:off",
            "events.json",
        ]))
        .expect("preprocess");
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.calendar.hour_height".to_string(), "48".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
        assert_eq!(pre.cleaned_args, os(&["slotgrid", "layout", "events.json"]));
    }

    #[test]
    fn global_flags_precede_the_command() {
        let cli = GlobalCli::parse_from(os(&[
            "slotgrid",
            "-vv",
            "--timezone",
            "Asia/Tokyo",
            "--rc",
            "calendar.week_start=monday",
            "snap",
            "9.3",
        ]));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.timezone.as_deref(), Some("Asia/Tokyo"));
        assert_eq!(cli.rc_overrides[0].key, "calendar.week_start");
        assert_eq!(cli.rest, os(&["snap", "9.3"]));
    }

    #[test]
    fn commands_expand_unique_prefixes() {
        let cfg = Config::default();
        let inv = Invocation::parse(&cfg, os(&["lay", "-", "--week", "2026-10-19"]))
            .expect("parse invocation");
        assert_eq!(inv.command, "layout");
        assert_eq!(inv.args, vec!["-", "--week", "2026-10-19"]);

        assert!(Invocation::parse(&cfg, os(&["to"])).is_err());
        assert_eq!(
            Invocation::parse(&cfg, vec![]).expect("default").command,
            "help"
        );
    }

    #[test]
    fn options_are_taken_out_of_args() {
        let mut inv = Invocation {
            command: "layout".to_string(),
            args: vec![
                "events.json".to_string(),
                "--json".to_string(),
                "--week".to_string(),
                "2026-10-19".to_string(),
            ],
        };
        assert_eq!(
            inv.take_option("--week").expect("week value").as_deref(),
            Some("2026-10-19")
        );
        assert!(inv.take_flag("--json"));
        assert!(!inv.take_flag("--json"));
        assert_eq!(inv.args, vec!["events.json"]);

        inv.args.push("--week".to_string());
        assert!(inv.take_option("--week").is_err());
    }
}
