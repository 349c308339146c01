//! Centralized timestamped logging
//!
//! All logs go through `logi!`, `logw!`, or `loge!` so they include:
//!   <timestamp> [TAG][thread] message
//!
//! Info goes to stdout, warnings and errors to stderr. Every line is also
//! appended to the optional file sink set up by [`init`].

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use shadervst_engine::{EngineEvent, LogLevel};

static LOG_FILE: OnceLock<Mutex<Option<std::fs::File>>> = OnceLock::new();

/// Install the file sink. Call once at startup.
pub fn init(log_file: Option<&Path>) {
    let sink = LOG_FILE.get_or_init(|| Mutex::new(None));
    let Some(path) = log_file else {
        return;
    };
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => {
            if let Ok(mut guard) = sink.lock() {
                *guard = Some(f);
            }
        }
        Err(e) => {
            eprintln!(
                "{} [LOG][{}] failed to open log file {}: {e}",
                log_timestamp(),
                log_thread_name(),
                path.display()
            );
        }
    }
}

// Local time when available, UTC otherwise. Millisecond precision.
pub(crate) fn log_timestamp() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    time::format_description::parse(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]",
    )
    .ok()
    .and_then(|fmt| now.format(&fmt).ok())
    .unwrap_or_else(|| "<time-format-error>".to_string())
}

pub(crate) fn log_thread_name() -> String {
    std::thread::current().name().unwrap_or("thread").to_string()
}

pub(crate) fn log_line(to_stderr: bool, tag: &str, msg: &str) {
    let line = format!("{} [{}][{}] {}", log_timestamp(), tag, log_thread_name(), msg);
    if to_stderr {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }

    if let Some(m) = LOG_FILE.get() {
        if let Ok(mut guard) = m.lock() {
            if let Some(f) = guard.as_mut() {
                let _ = writeln!(f, "{line}");
                let _ = f.flush();
            }
        }
    }
}

/// Info log: printed to stdout
#[macro_export]
macro_rules! logi {
    ($tag:expr, $($arg:tt)*) => {{
        $crate::logging::log_line(false, $tag, &format!($($arg)*));
    }};
}

/// Warning log: printed to stderr
#[macro_export]
macro_rules! logw {
    ($tag:expr, $($arg:tt)*) => {{
        $crate::logging::log_line(true, $tag, &format!($($arg)*));
    }};
}

/// Error log: printed to stderr
#[macro_export]
macro_rules! loge {
    ($tag:expr, $($arg:tt)*) => {{
        $crate::logging::log_line(true, $tag, &format!($($arg)*));
    }};
}

/// Print one engine event in the common log format.
pub fn log_engine_event(event: &EngineEvent) {
    match event {
        EngineEvent::Log { level, tag, msg } => match level {
            LogLevel::Debug | LogLevel::Info => logi!(tag, "{msg}"),
            LogLevel::Warn => logw!(tag, "{msg}"),
            LogLevel::Error => loge!(tag, "{msg}"),
        },
        EngineEvent::ShaderCompileOk {
            slot,
            intrinsics,
            parameters,
        } => logi!(
            "SHADER",
            "slot {slot} ready ({intrinsics} intrinsics, {parameters} parameters)"
        ),
        EngineEvent::ShaderCompileErr { slot: Some(slot), log } => {
            loge!("SHADER", "slot {slot} failed:\n{log}")
        }
        EngineEvent::ShaderCompileErr { slot: None, log } => loge!("SHADER", "{log}"),
        EngineEvent::Alert { title, message } => logw!("ALERT", "{title}: {message}"),
        EngineEvent::PipelineReady {
            programs,
            framebuffers,
        } => logi!(
            "GL",
            "pipeline ready: {programs} programs, {framebuffers} framebuffers"
        ),
        EngineEvent::PipelineInvalid => logw!("GL", "pipeline invalid; rendering black"),
        EngineEvent::AudioReset {
            sample_rate,
            history_len,
        } => logi!(
            "AUDIO",
            "stream reset at {sample_rate} Hz (history {history_len} samples)"
        ),
    }
}
