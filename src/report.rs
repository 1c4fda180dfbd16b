//! Conversion report aggregation
//!
//! A report collects conversion records, conversion errors, and syntax errors
//! for one input unit. Reports merge by concatenation so results from many
//! files aggregate into one run-wide report with stable ordering.

use crate::error::{ConversionError, SyntaxError};
use crate::record::ConversionRecord;
use colored::{Color, Colorize};
use serde::Serialize;
use std::collections::HashMap;

/// Options for summary rendering
#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    /// Leading bullet for each record group (e.g. `"-"`)
    pub bullet: Option<String>,
    /// Insert a blank line between record groups
    pub separate_by_blank_line: bool,
}

/// Aggregated outcome of a conversion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    /// Conversion records in the order they were performed
    pub records: Vec<ConversionRecord>,
    /// Conversions that were recognized but could not be performed safely
    pub conversion_errors: Vec<ConversionError>,
    /// Input units that could not be analyzed at all
    pub syntax_errors: Vec<SyntaxError>,
}

impl Report {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a performed conversion
    pub fn add_record(&mut self, record: ConversionRecord) {
        self.records.push(record);
    }

    /// Log a conversion that could not be performed safely
    pub fn add_conversion_error(&mut self, error: ConversionError) {
        self.conversion_errors.push(error);
    }

    /// Log an unparseable input unit
    pub fn add_syntax_error(&mut self, error: SyntaxError) {
        self.syntax_errors.push(error);
    }

    /// Append another report's sequences after this one's
    ///
    /// Merging is associative and order-stable: the earlier report's entries
    /// always precede the later one's.
    pub fn merge(&mut self, other: Report) {
        self.records.extend(other.records);
        self.conversion_errors.extend(other.conversion_errors);
        self.syntax_errors.extend(other.syntax_errors);
    }

    /// Count of records flagged as needing human review
    pub fn annotation_count(&self) -> usize {
        self.records.iter().filter(|r| r.annotation).count()
    }

    /// Check whether the run produced no errors of any kind
    pub fn is_clean(&self) -> bool {
        self.conversion_errors.is_empty() && self.syntax_errors.is_empty()
    }

    /// Exit code for the run (0 = clean, 1 = conversion errors, 2 = syntax errors)
    pub fn exit_code(&self) -> i32 {
        if !self.syntax_errors.is_empty() {
            2
        } else if !self.conversion_errors.is_empty() {
            1
        } else {
            0
        }
    }

    /// Group identical records and count occurrences
    ///
    /// Two records belong to the same group iff their derived type tags match
    /// and their rendered original/converted texts are equal. Groups are
    /// sorted by descending count, tie-broken by ascending original type tag,
    /// then ascending converted type tag, then the rendered texts, which makes
    /// the ordering total: no two distinct groups compare equal, so output is
    /// reproducible across runs.
    pub fn unique_record_counts(&self) -> Vec<(ConversionRecord, usize)> {
        let mut counts: HashMap<(String, String), (ConversionRecord, usize)> = HashMap::new();
        for record in &self.records {
            let key = (record.original_syntax.clone(), record.converted_syntax.clone());
            counts
                .entry(key)
                .or_insert_with(|| (record.clone(), 0))
                .1 += 1;
        }

        let mut groups: Vec<(ConversionRecord, usize)> = counts.into_values().collect();
        groups.sort_by(|(a, count_a), (b, count_b)| {
            count_b
                .cmp(count_a)
                .then_with(|| a.original_syntax_type().cmp(&b.original_syntax_type()))
                .then_with(|| a.converted_syntax_type().cmp(&b.converted_syntax_type()))
                .then_with(|| a.original_syntax.cmp(&b.original_syntax))
                .then_with(|| a.converted_syntax.cmp(&b.converted_syntax))
        });
        groups
    }

    /// Render the frequency-sorted record summary with color
    pub fn colored_summary(&self, options: &SummaryOptions) -> String {
        self.render_summary(options, true)
    }

    /// Render the frequency-sorted record summary without color
    ///
    /// Byte-identical to [`Report::colored_summary`] with styling codes
    /// stripped.
    pub fn summary(&self, options: &SummaryOptions) -> String {
        self.render_summary(options, false)
    }

    /// Render the single-line aggregate statistics with color
    pub fn colored_stats(&self) -> String {
        self.render_stats(true)
    }

    /// Render the single-line aggregate statistics without color
    pub fn stats(&self) -> String {
        self.render_stats(false)
    }

    fn render_summary(&self, options: &SummaryOptions, colored: bool) -> String {
        let mut summary = String::new();
        for (record, count) in self.unique_record_counts() {
            if options.separate_by_blank_line && !summary.is_empty() {
                summary.push('\n');
            }
            summary.push_str(&self.format_record(&record, count, options, colored));
        }
        summary
    }

    fn format_record(
        &self,
        record: &ConversionRecord,
        count: usize,
        options: &SummaryOptions,
        colored: bool,
    ) -> String {
        let entry_prefix = match &options.bullet {
            Some(bullet) => format!("{} ", bullet),
            None => String::new(),
        };
        let indentation = if options.bullet.is_some() {
            " ".repeat(entry_prefix.len())
        } else {
            String::new()
        };

        let mut text = entry_prefix;
        text.push_str(&paint(
            &pluralize(count, "conversion", false),
            Color::Cyan,
            colored,
        ));
        text.push('\n');
        text.push_str(&indentation);
        text.push_str("  ");
        text.push_str(&paint("from: ", Color::Cyan, colored));
        text.push_str(&record.original_syntax);
        text.push('\n');
        text.push_str(&indentation);
        text.push_str("    ");
        text.push_str(&paint("to: ", Color::Cyan, colored));
        text.push_str(&record.converted_syntax);
        text.push('\n');
        text
    }

    fn render_stats(&self, colored: bool) -> String {
        let base_color = if !self.conversion_errors.is_empty() {
            Color::Magenta
        } else if self.annotation_count() > 0 {
            Color::Yellow
        } else {
            Color::Green
        };

        let mut text = pluralize(self.records.len(), "conversion", false);
        text.push_str(", ");
        text.push_str(&pluralize(self.conversion_errors.len(), "incomplete", false));
        text.push_str(", ");
        text.push_str(&pluralize(self.annotation_count(), "warning", false));
        text.push_str(", ");
        let mut stats = paint(&text, base_color, colored);

        let error_color = if self.syntax_errors.is_empty() {
            base_color
        } else {
            Color::Red
        };
        stats.push_str(&paint(
            &pluralize(self.syntax_errors.len(), "error", false),
            error_color,
            colored,
        ));
        stats
    }
}

fn paint(text: &str, color: Color, colored: bool) -> String {
    if colored {
        text.color(color).to_string()
    } else {
        text.to_string()
    }
}

/// Render a count with its noun, appending `s` except for exactly one
///
/// With `no_for_zero`, zero renders as the word `no` instead of the digit.
pub fn pluralize(number: usize, thing: &str, no_for_zero: bool) -> String {
    let mut text = if number == 0 && no_for_zero {
        "no".to_string()
    } else {
        number.to_string()
    };
    text.push(' ');
    text.push_str(thing);
    if number != 1 {
        text.push('s');
    }
    text
}
