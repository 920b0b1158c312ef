//! Per-category error counting over a log window.

use regex::Regex;
use tracing::{debug, info, warn};

use warden_core::CategoryConfig;
use warden_state::ErrorCount;

use crate::error::{LogError, LogResult};
use crate::source::{LogEntry, LogSource};

#[derive(Debug, Clone)]
enum Pattern {
    Substring(String),
    Regex(Regex),
}

/// A named error signature.
#[derive(Debug, Clone)]
pub struct CategoryMatcher {
    name: String,
    pattern: Pattern,
}

impl CategoryMatcher {
    pub fn substring(name: &str, needle: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: Pattern::Substring(needle.to_string()),
        }
    }

    pub fn from_config(config: &CategoryConfig) -> LogResult<Self> {
        let pattern = if config.regex {
            let re = Regex::new(&config.pattern).map_err(|source| LogError::Pattern {
                name: config.name.clone(),
                source,
            })?;
            Pattern::Regex(re)
        } else {
            Pattern::Substring(config.pattern.clone())
        };
        Ok(Self {
            name: config.name.clone(),
            pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Occurrences of the signature in one message.
    pub fn count_in(&self, message: &str) -> u64 {
        match &self.pattern {
            Pattern::Substring(needle) => message.matches(needle.as_str()).count() as u64,
            Pattern::Regex(re) => re.find_iter(message).count() as u64,
        }
    }
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// One entry per configured category, in configuration order.
    pub counts: Vec<ErrorCount>,
    /// Newest entry timestamp seen, or the input cursor if nothing was new.
    pub cursor_us: u64,
    pub entries_scanned: usize,
    /// False when the source could not be read this cycle.
    pub available: bool,
}

impl ScanReport {
    pub fn count(&self, category: &str) -> u64 {
        self.counts
            .iter()
            .find(|c| c.category == category)
            .map_or(0, |c| c.count)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.count).sum()
    }
}

/// Counts error categories in entries newer than a cursor.
#[derive(Debug, Clone)]
pub struct LogErrorScanner {
    categories: Vec<CategoryMatcher>,
}

impl LogErrorScanner {
    pub fn new(categories: Vec<CategoryMatcher>) -> Self {
        Self { categories }
    }

    pub fn from_config(categories: &[CategoryConfig]) -> LogResult<Self> {
        let categories = categories
            .iter()
            .map(CategoryMatcher::from_config)
            .collect::<LogResult<Vec<_>>>()?;
        Ok(Self::new(categories))
    }

    pub fn categories(&self) -> &[CategoryMatcher] {
        &self.categories
    }

    /// Scan `source` for entries strictly newer than `since_us`.
    ///
    /// Never fails: an unreadable source yields zero counts, a warning, and
    /// the unchanged cursor.
    pub async fn scan(&self, source: &dyn LogSource, since_us: u64) -> ScanReport {
        match source.entries_since(since_us).await {
            Ok(entries) => {
                let report = self.count(&entries, since_us);
                if report.total() > 0 {
                    info!(
                        source = %source.describe(),
                        counts = %format_counts(&report.counts),
                        "error signatures found"
                    );
                } else {
                    debug!(
                        source = %source.describe(),
                        entries = report.entries_scanned,
                        "no error signatures"
                    );
                }
                report
            }
            Err(e) => {
                warn!(source = %source.describe(), error = %e, "could not read service logs");
                ScanReport {
                    counts: self.zero_counts(),
                    cursor_us: since_us,
                    entries_scanned: 0,
                    available: false,
                }
            }
        }
    }

    /// Count categories over already-fetched entries. Entries at or before
    /// `since_us` are ignored even if a source returned them.
    pub fn count(&self, entries: &[LogEntry], since_us: u64) -> ScanReport {
        let mut counts = self.zero_counts();
        let mut cursor_us = since_us;
        let mut scanned = 0;

        for entry in entries.iter().filter(|e| e.timestamp_us > since_us) {
            scanned += 1;
            cursor_us = cursor_us.max(entry.timestamp_us);
            for (slot, category) in counts.iter_mut().zip(&self.categories) {
                slot.count += category.count_in(&entry.message);
            }
        }

        ScanReport {
            counts,
            cursor_us,
            entries_scanned: scanned,
            available: true,
        }
    }

    fn zero_counts(&self) -> Vec<ErrorCount> {
        self.categories
            .iter()
            .map(|c| ErrorCount {
                category: c.name.clone(),
                count: 0,
            })
            .collect()
    }
}

fn format_counts(counts: &[ErrorCount]) -> String {
    counts
        .iter()
        .map(|c| format!("{}={}", c.category, c.count))
        .collect::<Vec<_>>()
        .join(" ")
}
