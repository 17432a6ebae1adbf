//! Human-readable per-section summary table.
//!
//! Driver-side presentation of [`Summary`](crate::stats::Summary)
//! values: one line per section, a total line when several sections
//! ran, and a compact duration format that scales from milliseconds to
//! hours.

use std::time::Duration;

use crate::stats::Summary;

/// Pretty print a duration: `   0.123`, ` 02m06.500`, ` 1h02m03.5`.
pub fn duration_pprint(duration: Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs > 3600.0 {
        let h = (secs / 3600.0) as u64;
        let m = ((secs - 3600.0 * h as f64) / 60.0) as u64;
        let s = secs - 3600.0 * h as f64 - 60.0 * m as f64;
        format!("{h:2}h{m:02}m{s:04.1}")
    } else if secs > 60.0 {
        let m = (secs / 60.0) as u64;
        let s = secs - 60.0 * m as f64;
        format!(" {m:02}m{s:06.3}")
    } else {
        format!("{secs:10.3}")
    }
}

/// Render the end-of-run summary table.
///
/// `results` pairs each section name with its summary, in the order the
/// sections ran. A total line is appended when more than one section is
/// listed.
pub fn render_summary(results: &[(String, Summary)], total_duration: Duration) -> String {
    let mut out = String::new();

    out.push_str("Section name           |    duration |  copy rows |     errors\n");
    out.push_str("=============================================================\n");

    let mut total_loaded: u64 = 0;
    let mut total_rejected: u64 = 0;

    for (name, summary) in results {
        let display_name = if name.len() > 22 {
            format!("{}...", &name[..19])
        } else {
            name.clone()
        };

        out.push_str(&format!(
            "{:<22} | {}s | {:>10} | {:>10}\n",
            display_name,
            duration_pprint(summary.duration),
            summary.rows_loaded,
            summary.rows_rejected
        ));

        total_loaded += summary.rows_loaded;
        total_rejected += summary.rows_rejected;
    }

    if results.len() > 1 {
        out.push_str("=============================================================\n");
        out.push_str(&format!(
            "{:<22} | {}s | {:>10} | {:>10}\n",
            "Total",
            duration_pprint(total_duration),
            total_loaded,
            total_rejected
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(table: &str, loaded: u64, rejected: u64) -> Summary {
        Summary {
            table: table.to_string(),
            duration: Duration::from_millis(1234),
            rows_loaded: loaded,
            rows_rejected: rejected,
        }
    }

    #[test]
    fn test_duration_formats() {
        assert_eq!(duration_pprint(Duration::from_millis(123)), "     0.123");
        assert_eq!(duration_pprint(Duration::from_secs_f64(126.5)), " 02m06.500");
        assert_eq!(
            duration_pprint(Duration::from_secs(3723)),
            " 1h02m03.0"
        );
    }

    #[test]
    fn test_summary_table() {
        let results = vec![
            ("orders".to_string(), summary("orders", 100, 2)),
            ("customers".to_string(), summary("customers", 50, 0)),
        ];
        let table = render_summary(&results, Duration::from_secs(3));

        assert!(table.contains("orders"));
        assert!(table.contains("customers"));
        assert!(table.contains("Total"));
        assert!(table.contains("150"));
    }

    #[test]
    fn test_single_section_has_no_total() {
        let results = vec![("orders".to_string(), summary("orders", 10, 0))];
        let table = render_summary(&results, Duration::from_secs(1));
        assert!(!table.contains("Total"));
    }

    #[test]
    fn test_long_names_truncated() {
        let name = "a_very_long_section_name_indeed".to_string();
        let results = vec![(name, summary("t", 1, 0))];
        let table = render_summary(&results, Duration::from_secs(1));
        assert!(table.contains("a_very_long_section..."));
    }
}
