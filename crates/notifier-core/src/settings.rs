use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::build_info::BuildInfo;
use crate::error::{NotifierError, Result};
use crate::keywords::KeywordSet;

/// Title used for notifications when `-ident` is not given.
pub const DEFAULT_IDENT: &str = "LogNotifier";

/// Flags that consume the following argument as their value.
const VALUE_FLAGS: &[&str] = &[
    "log",
    "search",
    "ident",
    "reopen-attempts",
    "reopen-delay",
    "log-level",
];

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Desktop notifications for keywords appearing in a growing log file
#[derive(Parser, Debug, Clone)]
#[command(
    name = "lognotifier",
    about = "Desktop notifications for keywords appearing in a growing log file",
    version
)]
pub struct Settings {
    /// Path to the log file
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Comma-separated list of strings to search for in the log
    #[arg(long, value_name = "KEYWORDS")]
    pub search: Option<String>,

    /// Identifier for the notification
    #[arg(long, default_value = DEFAULT_IDENT)]
    pub ident: String,

    /// Reopen attempts after the file is rotated or removed (1-100)
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=100))]
    pub reopen_attempts: u32,

    /// Seconds to wait before each reopen attempt (1-60)
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u64).range(1..=60))]
    pub reopen_delay: u64,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,
}

impl Settings {
    /// Parse an explicit argument list (first element is the program name).
    ///
    /// Go-style single-dash long flags (`-log x`, `-search=a,b`) are accepted
    /// alongside the usual `--log x`.
    pub fn try_parse_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Settings::try_parse_from(normalize_args(args))
    }

    /// Path of the watched file; missing flag is a startup error.
    pub fn log_path(&self) -> Result<&Path> {
        match self.log.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(NotifierError::MissingArgument("log")),
        }
    }

    /// Raw `-search` value; missing or empty flag is a startup error.
    pub fn search(&self) -> Result<&str> {
        match self.search.as_deref() {
            Some(raw) if !raw.is_empty() => Ok(raw),
            _ => Err(NotifierError::MissingArgument("search")),
        }
    }

    /// Normalised keyword list built from `-search`.
    pub fn keywords(&self) -> Result<KeywordSet> {
        KeywordSet::parse(self.search()?)
    }

    /// Full usage text: build details followed by the flag reference.
    pub fn usage(build: &BuildInfo) -> String {
        let mut cmd = Settings::command();
        let name = cmd.get_name().to_string();
        let help = cmd.render_help();
        format!("Usage of {name}:\n{}\n\n{help}", build.usage_line())
    }
}

// ── Argument normalisation ────────────────────────────────────────────────────

/// Rewrite `-flag` as `--flag` for every known long flag.
///
/// Values that follow a value-taking flag are left untouched even when they
/// start with a dash, and nothing after a bare `--` is rewritten.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut out = Vec::new();
    let mut expect_value = false;
    let mut passthrough = false;

    for (idx, arg) in args.into_iter().enumerate() {
        let arg: OsString = arg.into();
        if idx == 0 || passthrough || expect_value {
            expect_value = false;
            out.push(arg);
            continue;
        }

        let Some(text) = arg.to_str() else {
            out.push(arg);
            continue;
        };

        if text == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }

        let long = if let Some(rest) = text.strip_prefix("--") {
            Some(rest)
        } else if text.len() > 2 && text.starts_with('-') {
            Some(&text[1..])
        } else {
            None
        };

        match long {
            Some(rest) => {
                let name = rest.split('=').next().unwrap_or(rest);
                expect_value = VALUE_FLAGS.contains(&name) && !rest.contains('=');
                out.push(OsString::from(format!("--{rest}")));
            }
            None => out.push(arg),
        }
    }

    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────
