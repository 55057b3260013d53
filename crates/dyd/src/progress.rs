// AI
//! 📊 progress.rs. "Are we there yet?" Every pipeline, every time, forever.
//!
//! 🚀 A full table scan has no known length up front (DynamoDB's item count is a
//! six-hour-old rumour), so this is a spinner, not a bar. It's fed once per flushed
//! object or written batch, and at the end the run is boiled down to a `RunSummary`
//! that the CLI prints as a comfy table.
//!
//! ⚠️  Warning: Watching this spinner will not make it go faster. Science says no.

use std::fmt;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};

// -- 📏 one mebibyte, not a megabyte, pedants.
const MIB: f64 = 1024.0 * 1024.0;

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
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

/// ⏱️ MM:SS, or HH:MM:SS if you should probably call your mom.
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

/// 🧭 Which way the data went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Export,
    Restore,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Export => f.write_str("export"),
            Direction::Restore => f.write_str("restore"),
        }
    }
}

/// 🧾 What a finished run did. Returned by the library, rendered by the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub direction: Direction,
    pub source: String,
    pub destination: String,
    pub records: u64,
    pub bytes: u64,
    /// 🪣 Archive objects written (export) or fetched (restore).
    pub objects: u64,
    /// 📚 Table write batches issued. Always zero on export.
    pub batches: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// 🍽️ The run, as a table so comfy it has lumbar support.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![Cell::new(self.direction.to_string()), Cell::new("")]);
        let rows: [(&str, String); 7] = [
            ("source", self.source.clone()),
            ("destination", self.destination.clone()),
            ("records", format_number(self.records)),
            ("data", format!("{:.2} MiB", self.bytes as f64 / MIB)),
            ("objects", format_number(self.objects)),
            ("batches", format_number(self.batches)),
            ("elapsed", format_duration(self.elapsed)),
        ];
        for (label, value) in rows {
            table.add_row(vec![Cell::new(label), Cell::new(value).set_alignment(CellAlignment::Right)]);
        }
        table
    }
}

/// 📊 Running counters plus a spinner to look at while they climb.
pub(crate) struct ProgressMetrics {
    label: String,
    records: u64,
    bytes: u64,
    objects: u64,
    batches: u64,
    spinner: ProgressBar,
    start_time: Instant,
}

impl fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("records", &self.records)
            .field("bytes", &self.bytes)
            .field("objects", &self.objects)
            .field("batches", &self.batches)
            .finish()
    }
}

impl ProgressMetrics {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {elapsed_precise} {msg}") {
            spinner.set_style(style);
        }
        Self {
            label: label.into(),
            records: 0,
            bytes: 0,
            objects: 0,
            batches: 0,
            spinner,
            start_time: Instant::now(),
        }
    }

    /// 🪣 One archive object went out (or came in).
    pub(crate) fn object_done(&mut self, records: u64, bytes: u64) {
        self.records += records;
        self.bytes += bytes;
        self.objects += 1;
        self.render();
    }

    /// 📚 One table batch landed.
    pub(crate) fn batch_done(&mut self, records: u64) {
        self.records += records;
        self.batches += 1;
        self.render();
    }

    fn render(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { self.records as f64 / elapsed } else { 0.0 };
        self.spinner.set_message(format!(
            "{}: {} records ({}/s), {} objects, {} batches",
            self.label,
            format_number(self.records),
            format_number(rate as u64),
            format_number(self.objects),
            format_number(self.batches),
        ));
        self.spinner.tick();
    }

    /// ✅ Stop the spinner and hand back the totals.
    pub(crate) fn finish(self, direction: Direction, source: String, destination: String) -> RunSummary {
        self.spinner.finish_and_clear();
        RunSummary {
            direction,
            source,
            destination,
            records: self.records,
            bytes: self.bytes,
            objects: self.objects,
            batches: self.batches,
            elapsed: self.start_time.elapsed(),
        }
    }
}
