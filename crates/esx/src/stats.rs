// AI
//! 📊 stats.rs — "Did it work?" — every operator, every shutdown, forever.
//!
//! 🚀 Lock-free counters bumped by the client and the workers, plus a comfy table that
//! the CLI prints at the end so you know whether to celebrate or to open a ticket.
//!
//! ⚠️ Counting documents does not make them index faster. We've tried. Science says no.
//!
//! 🦆 The duck counted once. It got to three and lost interest.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS or HH:MM:SS. If it shows HH:MM:SS, you should probably call your mom.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Pipeline counters. Shared via `Arc`, bumped with relaxed atomics; nobody needs
/// these to be more consistent than "eventually, roughly, at shutdown exactly".
#[derive(Debug, Default)]
pub struct Stats {
    written: AtomicU64,
    dropped: AtomicU64,
    enqueued: AtomicU64,
    flushes: AtomicU64,
    failed_flushes: AtomicU64,
    delivered: AtomicU64,
    failed_docs: AtomicU64,
}

impl Stats {
    pub(crate) fn record_write(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueue(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// 📡 One flush attempt of `docs` documents, landed or not.
    pub(crate) fn record_flush(&self, docs: usize, landed: bool) {
        let docs = docs as u64;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        if landed {
            self.delivered.fetch_add(docs, Ordering::Relaxed);
        } else {
            self.failed_flushes.fetch_add(1, Ordering::Relaxed);
            self.failed_docs.fetch_add(docs, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed_docs: self.failed_docs.load(Ordering::Relaxed),
        }
    }
}

/// 📸 A point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub written: u64,
    pub dropped: u64,
    pub enqueued: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub delivered: u64,
    pub failed_docs: u64,
}

impl StatsSnapshot {
    /// 🎯 Documents that have been through a flush attempt, whatever the outcome.
    pub fn attempted(&self) -> u64 {
        self.delivered + self.failed_docs
    }

    /// 🗑️ Documents that were enqueued but never saw a flush. Nonzero after shutdown
    /// means the pipeline was closed with work still in flight.
    pub fn unflushed(&self) -> u64 {
        self.enqueued.saturating_sub(self.attempted())
    }

    /// 🍽️ Render the summary table.
    pub fn render(&self, elapsed: Duration) -> String {
        let docs_per_sec = if elapsed.as_secs_f64() > 0.0 {
            self.delivered as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let rows: [(&str, String); 8] = [
            ("written", format_number(self.written)),
            ("dropped", format_number(self.dropped)),
            ("enqueued", format_number(self.enqueued)),
            ("delivered", format_number(self.delivered)),
            (
                "failed",
                format!(
                    "{} docs in {} flushes",
                    format_number(self.failed_docs),
                    format_number(self.failed_flushes)
                ),
            ),
            ("flushes", format_number(self.flushes)),
            ("Docs/s", format_number(docs_per_sec as u64)),
            ("elapsed", format_duration(elapsed)),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_commas_make_big_numbers_friendly() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_long_runs_grow_an_hours_column() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3_661)), "01:01:01");
    }

    #[test]
    fn the_one_where_flush_outcomes_land_in_the_right_bucket() {
        let the_stats = Stats::default();
        for _ in 0..5 {
            the_stats.record_write();
            the_stats.record_enqueue();
        }
        the_stats.record_write();
        the_stats.record_drop();
        the_stats.record_flush(3, true);
        the_stats.record_flush(1, false);

        let the_snapshot = the_stats.snapshot();
        assert_eq!(the_snapshot.written, 6);
        assert_eq!(the_snapshot.dropped, 1);
        assert_eq!(the_snapshot.flushes, 2);
        assert_eq!(the_snapshot.failed_flushes, 1);
        assert_eq!(the_snapshot.attempted(), 4);
        assert_eq!(the_snapshot.unflushed(), 1);
    }

    #[test]
    fn the_one_where_the_table_mentions_everything() {
        let the_snapshot = StatsSnapshot {
            written: 12_000,
            delivered: 11_000,
            ..StatsSnapshot::default()
        };
        let the_table = the_snapshot.render(Duration::from_secs(11));
        assert!(the_table.contains("12,000"));
        assert!(the_table.contains("delivered"));
        assert!(the_table.contains("1,000"), "11,000 docs over 11s is 1,000 Docs/s");
        assert!(the_table.contains("00:11"));
    }
}
