//! Directory listing parser.
//!
//! Understands MLSD fact lines (RFC 3659), Unix `ls -l` output and the
//! Windows/IIS `LIST` format. Lines in none of these shapes (`total 12`,
//! banners) are skipped, as are `.` and `..`.

use crate::transfer::types::{EntryType, RemoteEntry};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

pub fn parse_listing(raw: &str) -> Vec<RemoteEntry> {
    raw.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .filter_map(parse_line)
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

fn parse_line(line: &str) -> Option<RemoteEntry> {
    if line.contains('=') && line.contains(';') {
        if let Some(e) = parse_mlsd(line) {
            return Some(e);
        }
    }
    parse_unix(line.trim_start()).or_else(|| parse_windows(line.trim_start()))
}

// ─── MLSD ────────────────────────────────────────────────────────────

/// `type=file;size=1234;modify=20260101120000; name with spaces`
pub fn parse_mlsd(line: &str) -> Option<RemoteEntry> {
    let line = line.trim_start();
    let (facts, name) = line.split_once(' ')?;
    if name.is_empty() {
        return None;
    }

    let mut entry_type = None;
    let mut size = 0;
    let mut modified_at = None;
    let mut mode = None;
    let mut seen = 0;

    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let Some((key, value)) = fact.split_once('=') else {
            continue;
        };
        seen += 1;
        match key.to_ascii_lowercase().as_str() {
            "type" => {
                entry_type = match value.to_ascii_lowercase().as_str() {
                    "cdir" | "pdir" => return None,
                    "dir" => Some(EntryType::Directory),
                    _ => Some(EntryType::File),
                }
            }
            "size" | "sizd" => size = value.parse().unwrap_or(0),
            "modify" => modified_at = parse_mlsd_time(value),
            "unix.mode" => mode = u32::from_str_radix(value, 8).ok(),
            _ => {}
        }
    }
    if seen == 0 {
        return None;
    }

    let entry_type = entry_type.unwrap_or(EntryType::File);
    Some(RemoteEntry {
        name: name.to_string(),
        entry_type,
        size,
        modified_at,
        permissions: mode.map(|m| unix_mode_string(m, entry_type == EntryType::Directory)),
    })
}

/// `YYYYMMDDHHMMSS[.sss]`, always UTC.
pub fn parse_mlsd_time(s: &str) -> Option<DateTime<Utc>> {
    let base = s.get(..14)?;
    NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

fn unix_mode_string(mode: u32, dir: bool) -> String {
    let mut s = String::with_capacity(10);
    s.push(if dir { 'd' } else { '-' });
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

// ─── Unix ────────────────────────────────────────────────────────────

fn unix_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^([dlcbps-][rwxsStT-]{9})[+@.]?\s+   # permissions
            \d+\s+                               # link count
            \S+\s+                               # owner
            (?:\S+\s+)?                          # group (absent on some servers)
            (\d+)\s+                             # size
            (\w{3}\s+\d{1,2}\s+[\d:]+)\s          # date
            (.+)$                                # name, possibly 'link -> target'
            ",
        )
        .ok()
    })
    .as_ref()
}

fn parse_unix(line: &str) -> Option<RemoteEntry> {
    let caps = unix_re()?.captures(line)?;
    let perms = caps.get(1)?.as_str();
    let size = caps.get(2)?.as_str().parse::<u64>().unwrap_or(0);
    let date = caps.get(3)?.as_str();
    let raw_name = caps.get(4)?.as_str();

    let entry_type = if perms.starts_with('d') {
        EntryType::Directory
    } else {
        EntryType::File
    };
    let name = match (perms.starts_with('l'), raw_name.find(" -> ")) {
        (true, Some(pos)) => &raw_name[..pos],
        _ => raw_name,
    };

    Some(RemoteEntry {
        name: name.to_string(),
        entry_type,
        size,
        modified_at: parse_unix_date(date, Utc::now()),
        permissions: Some(perms.to_string()),
    })
}

/// `Jan  1 12:00` (within the last six months) or `Jan  1  2025`.
fn parse_unix_date(s: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalised = s.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalised.contains(':') {
        let year = now.year();
        let dt = NaiveDateTime::parse_from_str(&format!("{} {}", year, normalised), "%Y %b %d %H:%M")
            .ok()?;
        let dt = Utc.from_utc_datetime(&dt);
        // A time-of-day stamp in the future belongs to last year.
        if dt > now + chrono::Duration::days(1) {
            let prev = NaiveDateTime::parse_from_str(
                &format!("{} {}", year - 1, normalised),
                "%Y %b %d %H:%M",
            )
            .ok()?;
            return Some(Utc.from_utc_datetime(&prev));
        }
        return Some(dt);
    }

    let date = NaiveDate::parse_from_str(&normalised, "%b %d %Y").ok()?;
    Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(0, 0, 0)?)))
}

// ─── Windows / IIS ───────────────────────────────────────────────────

fn windows_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^(\d{2}-\d{2}-\d{2,4})\s+           # date
            (\d{1,2}:\d{2}\s*(?:AM|PM)?)\s+     # time
            (<DIR>|\d+)\s+                      # size or <DIR>
            (.+)$                               # name
            ",
        )
        .ok()
    })
    .as_ref()
}

fn parse_windows(line: &str) -> Option<RemoteEntry> {
    let caps = windows_re()?.captures(line)?;
    let date = caps.get(1)?.as_str();
    let time = caps.get(2)?.as_str().replace(' ', "");
    let size_or_dir = caps.get(3)?.as_str();

    let (entry_type, size) = if size_or_dir == "<DIR>" {
        (EntryType::Directory, 0)
    } else {
        (EntryType::File, size_or_dir.parse::<u64>().unwrap_or(0))
    };

    Some(RemoteEntry {
        name: caps.get(4)?.as_str().to_string(),
        entry_type,
        size,
        modified_at: parse_windows_date(date, &time),
        permissions: None,
    })
}

fn parse_windows_date(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let combined = format!("{} {}", date, time);
    ["%m-%d-%y %I:%M%p", "%m-%d-%y %H:%M", "%m-%d-%Y %I:%M%p", "%m-%d-%Y %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&combined, fmt).ok())
        .map(|dt| Utc.from_utc_datetime(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_file_and_dir() {
        let raw = "total 8\r\n\
                   -rw-r--r--   1 user group  1234 Jan  1  2025 readme.txt\r\n\
                   drwxr-xr-x   2 root root   4096 Mar  1 09:30 sub dir\r\n";
        let entries = parse_listing(raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "readme.txt");
        assert_eq!(entries[0].entry_type, EntryType::File);
        assert_eq!(entries[0].size, 1234);
        assert_eq!(
            entries[0].modified_at.map(|d| d.to_rfc3339()),
            Some("2025-01-01T00:00:00+00:00".into())
        );
        assert_eq!(entries[1].name, "sub dir");
        assert_eq!(entries[1].entry_type, EntryType::Directory);
        assert_eq!(entries[1].permissions.as_deref(), Some("drwxr-xr-x"));
    }

    #[test]
    fn unix_symlink_keeps_link_name() {
        let entries = parse_listing("lrwxrwxrwx 1 root root 22 Jan  5 08:00 current -> /var/target");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "current");
        assert_eq!(entries[0].entry_type, EntryType::File);
    }

    #[test]
    fn recent_date_rolls_back_a_year() {
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let dt = parse_unix_date("Dec 24 10:00", now).unwrap();
        assert_eq!(dt.year(), 2025);
        let dt = parse_unix_date("Jan  9 10:00", now).unwrap();
        assert_eq!(dt.year(), 2026);
    }

    #[test]
    fn mlsd_facts() {
        let raw = "type=cdir;modify=20260101120000; .\r\n\
                   type=file;size=1024;modify=20260101120000;UNIX.mode=0644; example file.bin\r\n\
                   Type=dir;Modify=20250102030405.123; logs\r\n";
        let entries = parse_listing(raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "example file.bin");
        assert_eq!(entries[0].size, 1024);
        assert_eq!(entries[0].permissions.as_deref(), Some("-rw-r--r--"));
        assert_eq!(
            entries[0].modified_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(entries[1].entry_type, EntryType::Directory);
        assert_eq!(
            entries[1].modified_at,
            Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn windows_listing() {
        let raw = "01-01-26  12:00AM       <DIR>          My Documents\r\n\
                   02-15-26  03:30PM                 5120 notes.txt\r\n";
        let entries = parse_listing(raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, EntryType::Directory);
        assert_eq!(entries[0].name, "My Documents");
        assert_eq!(entries[1].size, 5120);
        assert_eq!(
            entries[1].modified_at,
            Some(Utc.with_ymd_and_hms(2026, 2, 15, 15, 30, 0).unwrap())
        );
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert!(parse_listing("total 0\n\n   \nnot a listing line\n").is_empty());
    }
}
