//! Console formatting: colored tag column, level column, wrapped message
//!
//! Everything goes to stderr so stdout stays free for piping.

use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Local;
use colored::*;
use std::io::{stderr, ErrorKind, Write};

const TAG_WIDTH: usize = 10;
const LEVEL_WIDTH: usize = 8;
const MAX_LINE_LENGTH: usize = 145;

pub fn format_and_log(tag: &LogTag, level: LogLevel, message: &str) {
    let time = Local::now().format("%H:%M:%S").to_string();
    let prefix = format!("{} ", time).dimmed().to_string();

    let base_line = format!(
        "{}[{}] [{}] ",
        prefix,
        format_tag(tag),
        format_level(level)
    );

    let base_length = strip_ansi_codes(&base_line).len();
    let available = MAX_LINE_LENGTH.saturating_sub(base_length).max(40);
    let chunks = wrap_text(message, available);

    write_stderr_safe(&format!("{}{}", base_line, chunks[0]));
    if chunks.len() > 1 {
        let continuation = " ".repeat(base_length);
        for chunk in &chunks[1..] {
            write_stderr_safe(&format!("{}{}", continuation, chunk));
        }
    }
}

fn format_tag(tag: &LogTag) -> ColoredString {
    let label = format!("{:<width$}", tag.to_plain_string(), width = TAG_WIDTH);
    match tag {
        LogTag::System => label.bright_yellow().bold(),
        LogTag::Config => label.bright_white().bold(),
        LogTag::Registry => label.bright_magenta().bold(),
        LogTag::Scheduler => label.bright_blue().bold(),
        LogTag::Broadcast => label.bright_cyan().bold(),
        LogTag::Session => label.cyan().bold(),
        LogTag::Webserver => label.bright_green().bold(),
        LogTag::Host => label.green().bold(),
        LogTag::Docker => label.blue().bold(),
        LogTag::Podman => label.purple().bold(),
        LogTag::Units => label.yellow().bold(),
        LogTag::Other(_) => label.white().bold(),
    }
}

fn format_level(level: LogLevel) -> ColoredString {
    let label = format!("{:<width$}", level.as_str(), width = LEVEL_WIDTH);
    match level {
        LogLevel::Error => label.bright_red().bold(),
        LogLevel::Warning => label.bright_yellow().bold(),
        LogLevel::Debug | LogLevel::Verbose => label.dimmed(),
        LogLevel::Info => label.white().bold(),
    }
}

/// Write a line, exiting quietly if the reader went away
fn write_stderr_safe(line: &str) {
    let mut handle = stderr().lock();
    if let Err(e) = writeln!(handle, "{}", line) {
        if e.kind() == ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
    }
}

pub(crate) fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_escape = false;

    for ch in text.chars() {
        if ch == '\x1b' {
            in_escape = true;
        } else if in_escape && ch == 'm' {
            in_escape = false;
        } else if !in_escape {
            result.push(ch);
        }
    }
    result
}

/// Wrap at word boundaries, keeping explicit newlines; never returns empty
pub(crate) fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut result = Vec::new();

    for line in text.split('\n') {
        if line.chars().count() <= max_width {
            result.push(line.to_string());
            continue;
        }

        let mut current = String::new();
        for word in line.split_whitespace() {
            let word_len = word.chars().count();
            let current_len = current.chars().count();

            if word_len > max_width {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                let chars: Vec<char> = word.chars().collect();
                for piece in chars.chunks(max_width) {
                    result.push(piece.iter().collect());
                }
            } else if current.is_empty() {
                current = word.to_string();
            } else if current_len + word_len + 1 <= max_width {
                current.push(' ');
                current.push_str(word);
            } else {
                result.push(std::mem::replace(&mut current, word.to_string()));
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
    }

    if result.is_empty() {
        result.push(String::new());
    }
    result
}
