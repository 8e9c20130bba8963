//! LIST / MLSD listing parser and MLSx timestamp parsing.
//!
//! Supports three listing formats, tried per line in this order:
//! 1. **MLSD facts** (RFC 3659): `type=file;size=1234;modify=20260101120000; file.txt`
//! 2. **Unix-style** (`ls -l`): `-rwxr-xr-x 1 owner group 1234 Jan  1 12:00 file.txt`
//! 3. **Windows/IIS-style**: `01-01-26  12:00AM       1234 file.txt`
//!
//! Lines that match no format are skipped rather than failing the whole
//! listing; `.` and `..` entries are filtered out.

use crate::types::{FileInfo, FileKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref UNIX_RE: Regex = Regex::new(
        r"(?x)
        ^([dlcbps-][rwxsStT-]{9})\s+    # permissions
        (\d+)\s+                        # link count
        (\S+)\s+                        # owner
        (\S+)\s+                        # group
        (\d+)\s+                        # size
        (\w{3}\s+\d{1,2}\s+[\d:]+)\s+   # date
        (.+)$                           # filename (possibly with -> target)
        ",
    )
    .unwrap();
    static ref WINDOWS_RE: Regex = Regex::new(
        r"(?x)
        ^(\d{2}-\d{2}-\d{2})\s+         # date
        (\d{1,2}:\d{2}(?:AM|PM)?)\s+    # time
        (<DIR>|\d+)\s+                  # size or <DIR>
        (.+)$                           # filename
        ",
    )
    .unwrap();
}

/// Parse a full multi-line LIST or MLSD response body.
pub fn parse_listing(raw: &str) -> Vec<FileInfo> {
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| parse_line(line.trim_end()))
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

fn parse_line(line: &str) -> Option<FileInfo> {
    if line.contains(';') && line.contains('=') {
        if let Some(e) = parse_mlsd(line) {
            return Some(e);
        }
    }
    if let Some(e) = parse_unix(line) {
        return Some(e);
    }
    parse_windows(line)
}

// ─── MLSD ────────────────────────────────────────────────────────────

/// Parse an MLSD fact line: `fact1=val1;fact2=val2; filename`
fn parse_mlsd(line: &str) -> Option<FileInfo> {
    let (facts_str, name) = if let Some(pos) = line.find("; ") {
        (&line[..pos + 1], line[pos + 2..].to_string())
    } else if let Some(pos) = line.rfind(' ') {
        (&line[..pos], line[pos + 1..].to_string())
    } else {
        return None;
    };

    if name.is_empty() {
        return None;
    }

    let mut facts: HashMap<String, String> = HashMap::new();
    for segment in facts_str.split(';') {
        if let Some((k, v)) = segment.trim().split_once('=') {
            facts.insert(k.to_lowercase(), v.to_string());
        }
    }

    let kind = match facts.get("type").map(|s| s.to_lowercase()).as_deref() {
        Some("dir") | Some("cdir") | Some("pdir") => FileKind::Directory,
        Some("file") => FileKind::File,
        Some(t) if t.contains("symlink") || t.contains("slink") => FileKind::Symlink,
        _ => FileKind::Unknown,
    };

    Some(FileInfo {
        name,
        kind,
        size: facts
            .get("size")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0),
        modified: facts.get("modify").and_then(|v| parse_mlsx_time(v)),
        permissions: facts.get("unix.mode").cloned(),
        owner: facts.get("unix.owner").cloned(),
        group: facts.get("unix.group").cloned(),
        link_target: None,
    })
}

/// Parse an MLSx timestamp: `YYYYMMDDHHmmSS[.fraction]`.
///
/// Also used on the payload of MDTM replies.
pub fn parse_mlsx_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let base = if s.len() >= 14 { &s[..14] } else { s };
    NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

// ─── Unix ────────────────────────────────────────────────────────────

fn parse_unix(line: &str) -> Option<FileInfo> {
    let caps = UNIX_RE.captures(line)?;

    let perms = caps.get(1)?.as_str();
    let kind = match perms.as_bytes().first() {
        Some(b'd') => FileKind::Directory,
        Some(b'l') => FileKind::Symlink,
        Some(b'-') => FileKind::File,
        _ => FileKind::Unknown,
    };

    let name_raw = caps.get(7)?.as_str();
    let (name, link_target) = match kind {
        FileKind::Symlink => match name_raw.find(" -> ") {
            Some(pos) => (
                name_raw[..pos].to_string(),
                Some(name_raw[pos + 4..].to_string()),
            ),
            None => (name_raw.to_string(), None),
        },
        _ => (name_raw.to_string(), None),
    };

    Some(FileInfo {
        name,
        kind,
        size: caps.get(5)?.as_str().parse::<u64>().unwrap_or(0),
        modified: parse_unix_date(caps.get(6)?.as_str()),
        permissions: Some(perms.to_string()),
        owner: caps.get(3).map(|m| m.as_str().to_string()),
        group: caps.get(4).map(|m| m.as_str().to_string()),
        link_target,
    })
}

/// Parse the date portion: "Jan  1 12:00" or "Jan  1  2025".
fn parse_unix_date(s: &str) -> Option<DateTime<Utc>> {
    let normalised = s.split_whitespace().collect::<Vec<_>>().join(" ");

    // "Jan 1 12:00" — the year is implied.
    if let Ok(dt) = NaiveDateTime::parse_from_str(
        &format!("{} {}", Utc::now().format("%Y"), normalised),
        "%Y %b %d %H:%M",
    ) {
        return Some(Utc.from_utc_datetime(&dt));
    }

    // "Jan 1 2025" — older entries carry the year, no time.
    if let Ok(date) = NaiveDate::parse_from_str(&normalised, "%b %d %Y") {
        let dt = date.and_time(NaiveTime::from_hms_opt(0, 0, 0)?);
        return Some(Utc.from_utc_datetime(&dt));
    }

    None
}

// ─── Windows / IIS ───────────────────────────────────────────────────

fn parse_windows(line: &str) -> Option<FileInfo> {
    let caps = WINDOWS_RE.captures(line)?;

    let size_or_dir = caps.get(3)?.as_str();
    let (kind, size) = if size_or_dir == "<DIR>" {
        (FileKind::Directory, 0)
    } else {
        (FileKind::File, size_or_dir.parse::<u64>().unwrap_or(0))
    };

    Some(FileInfo {
        name: caps.get(4)?.as_str().to_string(),
        kind,
        size,
        modified: parse_windows_date(caps.get(1)?.as_str(), caps.get(2)?.as_str()),
        permissions: None,
        owner: None,
        group: None,
        link_target: None,
    })
}

fn parse_windows_date(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let combined = format!("{} {}", date, time);
    if let Ok(dt) = NaiveDateTime::parse_from_str(&combined, "%m-%d-%y %I:%M%p") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&combined, "%m-%d-%y %H:%M") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    None
}
