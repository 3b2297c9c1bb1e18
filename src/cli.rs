//! Minimal CLI parsing for run mode overrides.

use std::env;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    /// Sweep once and exit instead of starting the scheduler
    pub run_once: bool,
    pub schedule_override: Option<String>,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--run-once" => options.run_once = true,
                "--schedule" => {
                    if let Some(value) = args.next() {
                        options.schedule_override = Some(value);
                    }
                }
                _ if arg.starts_with("--schedule=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.schedule_override = Some(value.to_string());
                    }
                }
                _ => {}
            }
        }
        options
    }
}
