//! Разбор строк прогресса `rclone ... -P`.

use regex::Regex;
use std::sync::LazyLock;

const SIZE_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
const SPEED_UNITS: [&str; 5] = ["B/s", "KiB/s", "MiB/s", "GiB/s", "TiB/s"];

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ansi regex"));
static TRANSFERRED_FILES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Transferred:\s+(\d+)\s*/\s*(\d+),").expect("valid transferred regex")
});
static CHECKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Checks:\s+(\d+)").expect("valid checks regex"));
static ERRORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Errors:\s+(\d+)").expect("valid errors regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressLine {
    /// `Transferred: 10 MiB / 20 MiB, 50%, 2 MiB/s, ETA 5s`
    Bytes {
        size: String,
        percentage: String,
        speed: String,
        eta: String,
    },
    /// `Transferred: 1 / 2, 50%`
    Files { transferred: u64, total: u64 },
    Checks(u64),
    Errors(u64),
}

/// Классификатор строк вывода rclone. Вызывающий код не знает, как именно строка разбирается.
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> Option<ProgressLine>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RegexLineClassifier;

impl LineClassifier for RegexLineClassifier {
    fn classify(&self, line: &str) -> Option<ProgressLine> {
        let cleaned = ANSI_ESCAPE.replace_all(line, "");
        let line = cleaned.trim();

        if line.starts_with("Transferred:") {
            if let Some(caps) = TRANSFERRED_FILES.captures(line)
                && !line.contains("ETA")
            {
                return Some(ProgressLine::Files {
                    transferred: caps[1].parse().ok()?,
                    total: caps[2].parse().ok()?,
                });
            }
            return parse_bytes_line(line);
        }
        if let Some(caps) = CHECKS.captures(line) {
            return caps[1].parse().ok().map(ProgressLine::Checks);
        }
        if let Some(caps) = ERRORS.captures(line) {
            return caps[1].parse().ok().map(ProgressLine::Errors);
        }
        None
    }
}

fn parse_bytes_line(line: &str) -> Option<ProgressLine> {
    let body = line.strip_prefix("Transferred:")?;
    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() < 4 {
        return None;
    }
    Some(ProgressLine::Bytes {
        size: parts[0].trim().to_string(),
        percentage: parts[1].trim().to_string(),
        speed: parts[2].trim().to_string(),
        eta: parts[3].replace("ETA", "").trim().to_string(),
    })
}

/// `"12.3 MiB"` -> байты. Некорректная строка даёт 0.
pub fn parse_size(text: &str) -> u64 {
    scale_by_unit(text, &SIZE_UNITS)
}

/// `"1 MiB/s"` -> байт/с. Некорректная строка даёт 0.
pub fn parse_speed(text: &str) -> u64 {
    scale_by_unit(text, &SPEED_UNITS)
}

fn scale_by_unit(text: &str, units: &[&str]) -> u64 {
    let mut parts = text.split_whitespace();
    let (Some(number), Some(unit)) = (parts.next(), parts.next()) else {
        return 0;
    };
    let Ok(value) = number.parse::<f64>() else {
        return 0;
    };
    let Some(power) = units.iter().position(|candidate| *candidate == unit) else {
        return 0;
    };
    if !value.is_finite() || value < 0.0 {
        return 0;
    }
    (value * 1024f64.powi(power as i32)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_line_fields_match_substrings() {
        let line = RegexLineClassifier.classify("Transferred: 10 MiB, 50%, 2 MiB/s, ETA 30s");
        assert_eq!(
            line,
            Some(ProgressLine::Bytes {
                size: "10 MiB".into(),
                percentage: "50%".into(),
                speed: "2 MiB/s".into(),
                eta: "30s".into(),
            })
        );
    }

    #[test]
    fn real_rclone_bytes_line_with_totals() {
        let line = RegexLineClassifier
            .classify("Transferred:   \t   5.500 MiB / 11 MiB, 50%, 1.100 MiB/s, ETA 5s");
        let Some(ProgressLine::Bytes { size, eta, .. }) = line else {
            panic!("expected bytes line");
        };
        assert_eq!(size, "5.500 MiB / 11 MiB");
        assert_eq!(eta, "5s");
        assert_eq!(parse_size(&size), 5_767_168);
    }

    #[test]
    fn files_line_is_not_taken_for_bytes() {
        let line = RegexLineClassifier.classify("Transferred:            1 / 2, 50%");
        assert_eq!(
            line,
            Some(ProgressLine::Files {
                transferred: 1,
                total: 2
            })
        );
    }

    #[test]
    fn checks_and_errors() {
        assert_eq!(
            RegexLineClassifier.classify("Checks:                 4 / 4, 100%"),
            Some(ProgressLine::Checks(4))
        );
        assert_eq!(
            RegexLineClassifier.classify("Errors:                 3 (retrying may help)"),
            Some(ProgressLine::Errors(3))
        );
    }

    #[test]
    fn ansi_sequences_are_stripped() {
        let line = RegexLineClassifier.classify("\x1b[2K\x1b[1GErrors:   0");
        assert_eq!(line, Some(ProgressLine::Errors(0)));
    }

    #[test]
    fn unknown_lines_are_ignored() {
        assert_eq!(RegexLineClassifier.classify("Elapsed time:        1.2s"), None);
        assert_eq!(RegexLineClassifier.classify(""), None);
        assert_eq!(RegexLineClassifier.classify("Transferred: garbage"), None);
    }

    #[test]
    fn size_and_speed_scaling() {
        assert_eq!(parse_speed("1 MiB/s"), 1_048_576);
        assert_eq!(parse_speed("0 B/s"), 0);
        assert_eq!(parse_size("0 B"), 0);
        assert_eq!(parse_size("2 KiB"), 2048);
        assert_eq!(parse_size("1.5 GiB"), 1_610_612_736);
    }

    #[test]
    fn malformed_sizes_yield_zero() {
        assert_eq!(parse_size(""), 0);
        assert_eq!(parse_size("abc MiB"), 0);
        assert_eq!(parse_size("10"), 0);
        assert_eq!(parse_speed("10 parsecs"), 0);
        assert_eq!(parse_speed("10 MiB"), 0);
    }
}
