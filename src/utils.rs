//! # Utility Functions Module
//!
//! Formatting and validation helpers shared by the configuration layer and
//! the reporter.
//!
//! ## Formatting
//!
//! - Millisecond durations are rendered with a unit that keeps three
//!   significant digits readable (`µs`, `ms`, `s`)
//! - Fixed-width table rows and separators for the console summary
//!
//! ## Validation
//!
//! - Port numbers must stay out of the privileged range
//! - Instance counts must be positive

use anyhow::Result;

/// Format a duration given in milliseconds with an appropriate unit
///
/// ## Examples
///
/// ```rust
/// # use transport_race::utils::format_duration_ms;
/// assert_eq!(format_duration_ms(0.5), "500.00µs");
/// assert_eq!(format_duration_ms(12.5), "12.50ms");
/// assert_eq!(format_duration_ms(2500.0), "2.50s");
/// ```
pub fn format_duration_ms(ms: f64) -> String {
    if ms < 1.0 {
        format!("{:.2}µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{:.2}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

/// Render a list of millisecond durations compactly, e.g. `[1.20ms, 3.40ms]`
pub fn format_duration_list(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|&v| format_duration_ms(v)).collect();
    format!("[{}]", parts.join(", "))
}

/// Validate that a port number is outside the privileged range
///
/// Ports below 1024 usually need root to bind, and the benchmark is meant to
/// run as an ordinary user.
pub fn validate_port(port: u16) -> Result<()> {
    if port < 1024 {
        anyhow::bail!(
            "Port number {} is too low (below 1024). Please use a port between 1024 and 65535",
            port
        );
    }
    Ok(())
}

/// Validate the number of benchmark instances
pub fn validate_instance_count(count: usize) -> Result<()> {
    if count == 0 {
        anyhow::bail!("Instance count must be greater than 0");
    }
    Ok(())
}

/// Build a table row with each column left-aligned to its width
pub fn table_row(columns: &[&str], widths: &[usize]) -> String {
    let cells: Vec<String> = columns
        .iter()
        .zip(widths.iter())
        .map(|(col, &width)| format!("{:<width$}", col, width = width))
        .collect();
    format!("| {} |", cells.join(" | "))
}

/// Build a separator line matching [`table_row`]
pub fn table_separator(widths: &[usize]) -> String {
    let dashes: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    format!("+-{}-+", dashes.join("-+-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(0.0), "0.00µs");
        assert_eq!(format_duration_ms(0.25), "250.00µs");
        assert_eq!(format_duration_ms(1.0), "1.00ms");
        assert_eq!(format_duration_ms(999.994), "999.99ms");
        assert_eq!(format_duration_ms(1500.0), "1.50s");
    }

    #[test]
    fn test_format_duration_list() {
        assert_eq!(format_duration_list(&[]), "[]");
        assert_eq!(format_duration_list(&[1.2, 3.4]), "[1.20ms, 3.40ms]");
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port(1024).is_ok());
        assert!(validate_port(8000).is_ok());
        assert!(validate_port(65535).is_ok());
        assert!(validate_port(1023).is_err());
        assert!(validate_port(0).is_err());
    }

    #[test]
    fn test_validate_instance_count() {
        assert!(validate_instance_count(1).is_ok());
        assert!(validate_instance_count(0).is_err());
    }

    #[test]
    fn test_table_layout() {
        let widths = [4, 6];
        assert_eq!(table_row(&["a", "bb"], &widths), "| a    | bb     |");
        assert_eq!(table_separator(&widths), "+------+--------+");
        assert_eq!(
            table_row(&["a", "bb"], &widths).len(),
            table_separator(&widths).len()
        );
    }
}
