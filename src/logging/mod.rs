use serde::Serialize;

pub(super) mod file_log;
pub(super) mod multilog;

/// One line of a [`file_log::FileLog`]. Empty source locations are left out.
#[derive(Debug, Serialize)]
struct LogLine<'a> {
    level: &'static str,
    target: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

fn level_name(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "error",
        log::Level::Warn => "warn",
        log::Level::Info => "info",
        log::Level::Debug => "debug",
        log::Level::Trace => "trace",
    }
}

impl<'a> From<&'a log::Record<'a>> for LogLine<'a> {
    fn from(record: &'a log::Record<'a>) -> Self {
        Self {
            level: level_name(record.level()),
            target: record.target(),
            message: record.args().to_string(),
            module: record.module_path(),
            location: record
                .file()
                .map(|file| format!("{file}:{}", record.line().unwrap_or_default())),
        }
    }
}
