use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};

use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: Option<File>,
    console_tx: Option<mpsc::Sender<String>>,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for console rendering (mapped in the tui crate)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Initialize the global logger, truncating `app.log` under `log_dir`.
/// Until this runs every log call is a no-op.
pub fn init(log_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_dir.join("app.log"))?;

    LOGGER
        .set(Mutex::new(Logger { file: Some(file), console_tx: None, prefixes: HashMap::new() }))
        .ok();
    Ok(())
}

/// Wire the console log channel.
pub fn set_console_sender(tx: mpsc::Sender<String>) {
    if let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) {
        l.console_tx = Some(tx);
    }
}

/// Register a prefix with a color used by `*_p` calls.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) {
        l.prefixes.insert(prefix.to_string(), color);
    }
}

/// Console lines use \x1f as field separator:
/// level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage
pub fn format_console_line(level: Level, prefix: &str, color: u8, ts: &str, msg: &str) -> String {
    format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", level.tag(), prefix, color, ts, msg)
}

fn write_log(level: Level, prefix: &str, msg: &str) {
    let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) else { return };
    let ts = Local::now().format("%H:%M:%S").to_string();
    let color = l.prefixes.get(prefix).copied().unwrap_or(0);

    if let Some(file) = l.file.as_mut() {
        if prefix.is_empty() {
            writeln!(file, "[{}] [{}] {}", ts, level.tag(), msg).ok();
        } else {
            writeln!(file, "[{}] [{}] [{}] {}", ts, level.tag(), prefix, msg).ok();
        }
    }
    if let Some(tx) = &l.console_tx {
        tx.send(format_console_line(level, prefix, color, &ts, msg)).ok();
    }
}

pub fn info(msg: &str) {
    write_log(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    write_log(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    write_log(Level::Error, "", msg);
}

pub fn info_p(prefix: &str, msg: &str) {
    write_log(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log(Level::Warn, prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log(Level::Error, prefix, msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_line_layout() {
        let line = format_console_line(Level::Warn, "nav", COLOR_GREEN, "12:00:01", "drift");
        let parts: Vec<&str> = line.split('\x1f').collect();
        assert_eq!(parts, vec!["WARN", "nav", "3", "12:00:01", "drift"]);
    }

    #[test]
    fn test_logging_before_init_is_silent() {
        info_p("nav", "nobody listens");
        error("still fine");
    }
}
