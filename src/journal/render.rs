//! Zim page rendering
//!
//! A page is the configured header (with the date appended to one of its
//! lines), a title line for the date, a blank line, and then every entry of
//! the date's bucket. Entries are rendered once, when they are aggregated;
//! page assembly only concatenates them.

use chrono::{NaiveDateTime, TimeZone};
use std::fmt::Display;

use super::{DateBucket, JournalError, JournalRecord};

/// Header line that receives the page timestamp unless configured otherwise
pub const DEFAULT_DATE_LINE: usize = 2;

/// Layout settings shared by every page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTemplate {
    header: Vec<String>,
    date_line: usize,
    page_title_marker: String,
    entry_title_marker: String,
    entry_separator: Option<String>,
}

impl PageTemplate {
    /// Builds a template, checking that `date_line` exists in `header`
    pub fn new(
        header: Vec<String>,
        date_line: usize,
        page_title_marker: impl Into<String>,
        entry_title_marker: impl Into<String>,
        entry_separator: Option<String>,
    ) -> Result<Self, JournalError> {
        if date_line >= header.len() {
            return Err(JournalError::Template(format!(
                "date line {} is outside a header of {} lines",
                date_line,
                header.len()
            )));
        }
        Ok(Self {
            header,
            date_line,
            page_title_marker: page_title_marker.into(),
            entry_title_marker: entry_title_marker.into(),
            entry_separator,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn date_line(&self) -> usize {
        self.date_line
    }

    pub fn page_title_marker(&self) -> &str {
        &self.page_title_marker
    }

    pub fn entry_title_marker(&self) -> &str {
        &self.entry_title_marker
    }

    pub fn entry_separator(&self) -> Option<&str> {
        self.entry_separator.as_deref()
    }
}

/// An entry's lines as they appear on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEntry {
    title: String,
    lines: Vec<String>,
}

impl RenderedEntry {
    pub fn new(title: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            title: title.into(),
            lines,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// `<marker> <title> <marker>`
pub fn entry_title(title: &str, marker: &str) -> String {
    format!("{} {} {}", marker, title, marker)
}

/// Renders one entry: separator (if configured), title, body lines, blank
pub fn render_entry(record: &JournalRecord, template: &PageTemplate) -> RenderedEntry {
    let title = record.display_title();
    let body = split_lines(&record.body);
    let mut lines = Vec::with_capacity(body.len() + 3);
    if let Some(sep) = template.entry_separator() {
        lines.push(sep.to_string());
    }
    lines.push(entry_title(&title, template.entry_title_marker()));
    lines.extend(body.into_iter().map(str::to_string));
    lines.push(String::new());
    RenderedEntry::new(title, lines)
}

/// Whether `c` ends a line of an entry body
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Splits `text` at every line break, treating `\r\n` as one break
///
/// A trailing break does not start an extra empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !is_line_break(c) {
            continue;
        }
        lines.push(&text[start..i]);
        start = i + c.len_utf8();
        if c == '\r' {
            if let Some((j, '\n')) = chars.peek().copied() {
                chars.next();
                start = j + 1;
            }
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// The date as `YYYY-MM-DDTHH:MM:SS±HH:MM` in `tz`
///
/// `date` is a wall-clock time in `tz`. A time skipped by a DST change is
/// read as UTC instead.
pub fn header_timestamp<Tz>(date: NaiveDateTime, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let local = tz
        .from_local_datetime(&date)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&date));
    local.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// `<marker> Monday 31 Oct 2022 <marker>`
pub fn page_title(date: NaiveDateTime, marker: &str) -> String {
    format!("{} {} {}", marker, date.format("%A %d %b %Y"), marker)
}

/// Renders the full page for one bucket
pub fn render_page<Tz>(bucket: &DateBucket, template: &PageTemplate, tz: &Tz) -> Vec<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut text = template.header().to_vec();
    if let Some(line) = text.get_mut(template.date_line()) {
        line.push_str(&header_timestamp(bucket.date(), tz));
    }
    text.push(page_title(bucket.date(), template.page_title_marker()));
    text.push(String::new());
    for entry in bucket.members() {
        text.extend(entry.lines().iter().cloned());
    }
    text
}
