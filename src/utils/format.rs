//! Human-readable formatting of sizes, speeds and durations

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format bytes to a string such as "1.5 GB"
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} PB", value)
}

/// Format a speed in bytes per second, e.g. "2.5 MB/s"
pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second.max(0.0) as u64))
}

/// Format seconds as "45s", "2m 5s" or "2h 30m"
pub fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    if seconds < 60.0 {
        format!("{}s", seconds as u64)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0) as u64;
        let secs = (seconds % 60.0) as u64;
        format!("{}m {}s", minutes, secs)
    } else {
        let hours = (seconds / 3600.0) as u64;
        let minutes = ((seconds % 3600.0) / 60.0) as u64;
        format!("{}h {}m", hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.0 B");
        assert_eq!(format_bytes(1023), "1023.0 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(1024u64.pow(5)), "1.0 PB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(2.5 * 1024.0 * 1024.0), "2.5 MB/s");
        assert_eq!(format_speed(-3.0), "0.0 B/s");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(45.9), "45s");
        assert_eq!(format_time(125.0), "2m 5s");
        assert_eq!(format_time(9015.0), "2h 30m");
    }
}
