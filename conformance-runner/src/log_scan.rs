// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extracting run statistics from unstructured engine logs.
//!
//! Every line of every log fragment is matched against a fixed table of patterns. Each pattern
//! updates its own accumulator; patterns are independent of each other and of line order.

use crate::errors::{DurationParseError, LogScanError};
use camino::{Utf8Path, Utf8PathBuf};
use regex::{Captures, Regex};
use std::{
    fs,
    io::{BufWriter, Write},
    sync::LazyLock,
    time::Duration,
};
use tracing::{debug, info};

/// Run statistics accumulated from log fragments.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LogStats {
    /// The number of test cases the engine reported as executed.
    pub executed: usize,

    /// The number of test cases the engine reported as passed.
    pub successful: usize,

    /// The total suite duration, accumulated in whole seconds.
    pub duration: Duration,
}

impl LogStats {
    /// Returns true if every accumulator is still zero.
    pub fn is_empty(&self) -> bool {
        self.executed == 0 && self.successful == 0 && self.duration.is_zero()
    }
}

type ApplyFn = fn(&'static str, &Captures<'_>, &mut LogStats) -> Result<(), LogScanError>;

struct LogPattern {
    name: &'static str,
    regex: Regex,
    // Matching lines are echoed at info level.
    log_line: bool,
    apply: ApplyFn,
}

impl LogPattern {
    fn new(name: &'static str, regex: &str, log_line: bool, apply: ApplyFn) -> Self {
        Self {
            name,
            regex: Regex::new(regex).expect("log pattern is valid"),
            log_line,
            apply,
        }
    }
}

static LOG_PATTERNS: LazyLock<[LogPattern; 3]> = LazyLock::new(|| {
    [
        LogPattern::new(
            "ran-specs",
            r"Ran (?P<TestcasesRan>\d+).*Specs.in",
            false,
            |pattern, captures, stats| {
                stats.executed += capture_count(pattern, captures, "TestcasesRan")?;
                Ok(())
            },
        ),
        LogPattern::new(
            "passed-failed",
            r"(?P<Passed>\d+) Passed.*?(?P<Failed>\d+) Failed.*Pending",
            false,
            |pattern, captures, stats| {
                let passed = capture_count(pattern, captures, "Passed")?;
                // Only validated: failures are counted from structured reports.
                capture_count(pattern, captures, "Failed")?;
                stats.successful += passed;
                Ok(())
            },
        ),
        LogPattern::new(
            "suite-duration",
            r"Ginkgo ran \d+ suite in (?P<TestSuiteDuration>.+)",
            true,
            |pattern, captures, stats| {
                let value = captures
                    .name("TestSuiteDuration")
                    .map_or("", |m| m.as_str());
                let duration =
                    parse_go_duration(value).map_err(|err| LogScanError::InvalidDuration {
                        pattern,
                        value: value.to_owned(),
                        err,
                    })?;
                stats.duration += Duration::from_secs(duration.as_secs());
                Ok(())
            },
        ),
    ]
});

fn capture_count(
    pattern: &'static str,
    captures: &Captures<'_>,
    capture: &'static str,
) -> Result<usize, LogScanError> {
    let value = captures.name(capture).map_or("", |m| m.as_str());
    value.parse().map_err(|err| LogScanError::InvalidCount {
        pattern,
        capture,
        value: value.to_owned(),
        err,
    })
}

/// Accumulates [`LogStats`] across log fragments.
#[derive(Debug, Default)]
pub struct LogScanner {
    stats: LogStats,
    contents: String,
}

impl LogScanner {
    /// Creates a new scanner with all accumulators at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans one log fragment.
    pub fn scan_fragment(&mut self, fragment: &str) -> Result<(), LogScanError> {
        for line in fragment.lines() {
            self.scan_line(line)?;
        }
        self.contents.push_str(fragment);
        if !fragment.is_empty() && !fragment.ends_with('\n') {
            self.contents.push('\n');
        }
        Ok(())
    }

    fn scan_line(&mut self, line: &str) -> Result<(), LogScanError> {
        for pattern in LOG_PATTERNS.iter() {
            if let Some(captures) = pattern.regex.captures(line) {
                if pattern.log_line {
                    info!("{line}");
                }
                (pattern.apply)(pattern.name, &captures, &mut self.stats)?;
            }
        }
        Ok(())
    }

    /// Returns the statistics accumulated so far.
    pub fn stats(&self) -> LogStats {
        self.stats
    }

    /// Finishes scanning.
    ///
    /// Fails with [`LogScanError::NoInformation`] if no pattern produced a non-zero value.
    pub fn finish(self) -> Result<LogStats, LogScanError> {
        if self.stats.is_empty() {
            return Err(LogScanError::NoInformation {
                contents: self.contents,
            });
        }
        Ok(self.stats)
    }

    /// Scans the log fragments at `paths` in order, concatenating them into `combined_path`.
    pub fn scan_files(
        paths: &[Utf8PathBuf],
        combined_path: &Utf8Path,
    ) -> Result<LogStats, LogScanError> {
        let write_err = |err: std::io::Error| LogScanError::WriteCombined {
            path: combined_path.to_owned(),
            err,
        };
        let mut combined = BufWriter::new(fs::File::create(combined_path).map_err(write_err)?);

        let mut scanner = Self::new();
        for path in paths {
            debug!("scanning log fragment {path}");
            let bytes = fs::read(path).map_err(|err| LogScanError::Read {
                path: path.clone(),
                err,
            })?;
            combined.write_all(&bytes).map_err(write_err)?;
            if !bytes.is_empty() && !bytes.ends_with(b"\n") {
                combined.write_all(b"\n").map_err(write_err)?;
            }
            scanner.scan_fragment(&String::from_utf8_lossy(&bytes))?;
        }
        combined.flush().map_err(write_err)?;
        info!("merged log written to {combined_path}");

        scanner.finish()
    }
}

/// Parses a duration of the form produced by Go's `time.Duration`, e.g. `1h2m3.5s` or `300ms`.
///
/// Valid units are `h`, `m`, `s`, `ms`, `us` (or `µs`) and `ns`. Negative durations are rejected.
pub fn parse_go_duration(input: &str) -> Result<Duration, DurationParseError> {
    let trimmed = input.trim();
    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if rest.starts_with('-') {
        return Err(DurationParseError::new(input, "negative durations are not supported"));
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(DurationParseError::new(input, "empty duration"));
    }

    let mut total_secs = 0.0_f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, after_number) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(DurationParseError::new(input, "expected a number"));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| DurationParseError::new(input, "invalid number"))?;

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, after_unit) = after_number.split_at(unit_len);
        let unit_secs = match unit {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(DurationParseError::new(input, "missing unit")),
            _ => return Err(DurationParseError::new(input, "unknown unit")),
        };

        total_secs += value * unit_secs;
        rest = after_unit;
    }

    Duration::try_from_secs_f64(total_secs)
        .map_err(|_| DurationParseError::new(input, "duration out of range"))
}
