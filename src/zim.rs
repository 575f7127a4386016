//! Zim notebook pages on disk
//!
//! Journal pages live at `<root>/<year>/<month>/<day>.txt` with zero-padded
//! month and day. Writing a page replaces whatever was there: the Monica
//! instance is the source of truth.

use chrono::{Datelike, NaiveDate, TimeZone};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::diagnostics::{Observer, SyncEvent};
use crate::journal::render::render_page;
use crate::journal::{Journal, PageTemplate};

#[cfg(windows)]
const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
const LINE_SEPARATOR: &str = "\n";

/// Errors that can occur when reading or writing pages
#[derive(Debug, Error)]
pub enum PageError {
    /// The path does not end in `<year>/<month>/<day>.txt`
    #[error("Not a journal page path: {0}")]
    InvalidPath(PathBuf),

    /// Filesystem access failed
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Location of the page for `date` under `root`
pub fn path_for(date: &impl Datelike, root: &Path) -> PathBuf {
    root.join(date.year().to_string())
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}.txt", date.day()))
}

/// Date of the page at `path`, from its last three components
pub fn date_of(path: &Path) -> Result<NaiveDate, PageError> {
    let invalid = || PageError::InvalidPath(path.to_path_buf());

    if path.extension().and_then(|e| e.to_str()) != Some("txt") {
        return Err(invalid());
    }
    let day = path.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;
    let month_dir = path.parent().ok_or_else(invalid)?;
    let month = month_dir.file_name().and_then(|s| s.to_str()).ok_or_else(invalid)?;
    let year = month_dir
        .parent()
        .and_then(Path::file_name)
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;

    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Overwrites the file at `path` with `lines`, creating parent directories
pub fn write_page(path: &Path, lines: &[String]) -> Result<(), PageError> {
    let io_err = |source| PageError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, lines.join(LINE_SEPARATOR)).map_err(io_err)
}

/// Renders and writes one page per bucket of `journal`
///
/// Returns the distinct written paths in date order. When several buckets
/// fall on the same calendar day, the last one written wins and
/// [`SyncEvent::PageReplaced`] is reported for each overwrite.
pub fn write_journal<Tz>(
    journal: &Journal,
    template: &PageTemplate,
    root: &Path,
    tz: &Tz,
    observer: &dyn Observer,
) -> Result<Vec<PathBuf>, PageError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut written: Vec<PathBuf> = Vec::with_capacity(journal.len());
    for bucket in journal.buckets() {
        let path = path_for(&bucket.date(), root);
        let text = render_page(bucket, template, tz);
        write_page(&path, &text)?;
        observer.on_event(&SyncEvent::PageWritten {
            path: path.clone(),
            lines: text.len(),
        });
        if written.contains(&path) {
            observer.on_event(&SyncEvent::PageReplaced {
                path,
                date: bucket.date(),
            });
        } else {
            written.push(path);
        }
    }
    Ok(written)
}

/// Journal pages already present under `root`, sorted by date
///
/// Files that are not laid out as `<year>/<month>/<day>.txt` are skipped. A
/// missing root is an empty notebook.
pub fn existing_pages(root: &Path) -> Result<Vec<(NaiveDate, PathBuf)>, PageError> {
    let mut pages = Vec::new();
    if !root.is_dir() {
        return Ok(pages);
    }
    for year in sub_dirs(root)? {
        for month in sub_dirs(&year)? {
            for entry in read_dir(&month)? {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if let Ok(date) = date_of(&path) {
                    pages.push((date, path));
                }
            }
        }
    }
    pages.sort();
    Ok(pages)
}

fn read_dir(dir: &Path) -> Result<Vec<fs::DirEntry>, PageError> {
    let io_err = |source| PageError::Io {
        path: dir.to_path_buf(),
        source,
    };
    fs::read_dir(dir)
        .map_err(io_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)
}

fn sub_dirs(dir: &Path) -> Result<Vec<PathBuf>, PageError> {
    Ok(read_dir(dir)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{NullObserver, RecordingObserver};
    use crate::journal::render::{render_entry, DEFAULT_DATE_LINE};
    use crate::journal::{DateBucket, JournalRecord};
    use chrono::{NaiveDateTime, Utc};
    use tempfile::TempDir;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn template() -> PageTemplate {
        PageTemplate::new(
            vec!["Content-Type: text/x-zim-wiki".to_string(), "".to_string(), "Creation-Date: ".to_string()],
            DEFAULT_DATE_LINE,
            "======",
            "=====",
            None,
        )
        .unwrap()
    }

    fn journal_for(dates: &[NaiveDateTime]) -> Journal {
        let template = template();
        let mut journal = Journal::new();
        for (n, date) in dates.iter().enumerate() {
            let record = JournalRecord {
                id: n.to_string(),
                occurred_at: *date,
                created_at: *date,
                title: None,
                body: format!("entry {}", n),
            };
            journal.insert(*date, &record.id, render_entry(&record, &template));
        }
        journal
    }

    #[test]
    fn test_path_for_zero_pads() {
        let path = path_for(&ymd(2022, 3, 7), Path::new("/notebook/Journal"));

        assert_eq!(path, PathBuf::from("/notebook/Journal/2022/03/07.txt"));
    }

    #[test]
    fn test_path_for_ignores_time_of_day() {
        let date = ymd(2022, 10, 31).and_hms_opt(23, 59, 59).unwrap();

        assert_eq!(
            path_for(&date, Path::new("root")),
            PathBuf::from("root/2022/10/31.txt")
        );
    }

    #[test]
    fn test_date_of_inverts_path_for() {
        let root = Path::new("/notebook/Journal");
        let mut date = ymd(2020, 1, 1);
        while date <= ymd(2021, 1, 1) {
            assert_eq!(date_of(&path_for(&date, root)).unwrap(), date);
            date = date.succ_opt().unwrap();
        }
        for date in [ymd(1, 1, 1), ymd(999, 12, 31), ymd(2400, 2, 29)] {
            assert_eq!(date_of(&path_for(&date, root)).unwrap(), date);
        }
    }

    #[test]
    fn test_date_of_rejects_other_paths() {
        for path in ["2022/10/notes.txt", "2022/13/01.txt", "2022/02/30.txt", "2022/10/31.md", "31.txt"] {
            assert!(
                matches!(date_of(Path::new(path)), Err(PageError::InvalidPath(_))),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn test_write_page_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("2022").join("10").join("31.txt");

        write_page(&path, &["old".to_string(), "content".to_string(), "here".to_string()]).unwrap();
        write_page(&path, &["new".to_string(), "".to_string()]).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("new{}", LINE_SEPARATOR)
        );
    }

    #[test]
    fn test_write_journal_writes_each_date() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dates = [
            ymd(2022, 10, 31).and_hms_opt(0, 0, 0).unwrap(),
            ymd(2022, 11, 1).and_hms_opt(0, 0, 0).unwrap(),
        ];
        let journal = journal_for(&dates);
        let observer = RecordingObserver::new();

        let written = write_journal(&journal, &template(), temp_dir.path(), &Utc, &observer).unwrap();

        assert_eq!(
            written,
            vec![
                temp_dir.path().join("2022/10/31.txt"),
                temp_dir.path().join("2022/11/01.txt"),
            ]
        );
        let page = fs::read_to_string(&written[0]).unwrap();
        let lines: Vec<&str> = page.split(LINE_SEPARATOR).collect();
        assert_eq!(lines[2], "Creation-Date: 2022-10-31T00:00:00+00:00");
        assert_eq!(lines[3], "====== Monday 31 Oct 2022 ======");
        assert_eq!(lines[5], "===== None, 2022-10-31 00:00:00 =====");
        assert_eq!(observer.events().len(), 2);
    }

    #[test]
    fn test_write_journal_reports_same_day_replacement() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let morning = ymd(2022, 10, 31).and_hms_opt(9, 30, 0).unwrap();
        let evening = ymd(2022, 10, 31).and_hms_opt(21, 0, 0).unwrap();
        let journal = journal_for(&[morning, evening]);
        let observer = RecordingObserver::new();

        let written = write_journal(&journal, &template(), temp_dir.path(), &Utc, &observer).unwrap();

        let page_path = temp_dir.path().join("2022/10/31.txt");
        assert_eq!(written, vec![page_path.clone()]);
        let replaced: Vec<SyncEvent> = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, SyncEvent::PageReplaced { .. }))
            .collect();
        assert_eq!(
            replaced,
            vec![SyncEvent::PageReplaced {
                path: page_path.clone(),
                date: evening,
            }]
        );
        let page = fs::read_to_string(&page_path).unwrap();
        assert!(page.contains("entry 1"));
        assert!(!page.contains("entry 0"));
    }

    #[test]
    fn test_write_journal_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let journal = journal_for(&[ymd(2022, 10, 31).and_hms_opt(0, 0, 0).unwrap()]);

        let written = write_journal(&journal, &template(), temp_dir.path(), &Utc, &NullObserver).unwrap();
        let first = fs::read(&written[0]).unwrap();
        write_journal(&journal, &template(), temp_dir.path(), &Utc, &NullObserver).unwrap();
        let second = fs::read(&written[0]).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_pages_lists_dated_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        write_page(&path_for(&ymd(2022, 11, 1), root), &["b".to_string()]).unwrap();
        write_page(&path_for(&ymd(2022, 10, 31), root), &["a".to_string()]).unwrap();
        write_page(&root.join("2022").join("10").join("notes.txt"), &["x".to_string()]).unwrap();
        fs::write(root.join("Journal.txt"), "top level page").unwrap();

        let pages = existing_pages(root).unwrap();

        assert_eq!(
            pages,
            vec![
                (ymd(2022, 10, 31), path_for(&ymd(2022, 10, 31), root)),
                (ymd(2022, 11, 1), path_for(&ymd(2022, 11, 1), root)),
            ]
        );
    }

    #[test]
    fn test_existing_pages_missing_root_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let pages = existing_pages(&temp_dir.path().join("absent")).unwrap();

        assert!(pages.is_empty());
    }

    #[test]
    fn test_bucket_date_maps_to_page() {
        let date = ymd(2022, 10, 31).and_hms_opt(0, 0, 0).unwrap();
        let bucket = DateBucket::new(
            date,
            "1",
            crate::journal::RenderedEntry::new("t", vec!["t".to_string()]),
        );

        assert_eq!(
            date_of(&path_for(&bucket.date(), Path::new("root"))).unwrap(),
            date.date()
        );
    }
}
