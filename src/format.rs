//! Textual rendering for `chronosctl` output and diagnostic logging.

use crate::manager::{DeviceStats, PartitionSnapshot};

/// Per-device usage report: header, type/vendor/version, memory block,
/// management block. Devices are separated by a blank line.
pub fn format_device_stats(stats: &[DeviceStats]) -> String {
    let mut out = String::new();
    for (i, d) in stats.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("Device {}: {}\n", d.idx, d.name));
        out.push_str(&format!("  Type: {}\n", d.type_tokens.join(" ")));
        out.push_str(&format!("  Vendor: {}\n", d.vendor));
        out.push_str(&format!("  Version: {}\n", d.version));

        let total_mb = d.total_memory as f64 / (1024.0 * 1024.0);
        let used = d.total_memory - d.available_memory;
        let used_mb = used as f64 / (1024.0 * 1024.0);
        let available_mb = d.available_memory as f64 / (1024.0 * 1024.0);
        let usage_pct = if d.total_memory == 0 {
            0.0
        } else {
            100.0 * used as f64 / d.total_memory as f64
        };
        out.push_str(&format!("  Memory: {total_mb:.2} MB total, {used_mb:.2} MB used, {available_mb:.2} MB available ({usage_pct:.2}% used)\n"));
        out.push_str(&format!(
            "  Active partitions: {}\n",
            d.active_partition_count
        ));
    }
    out
}

/// "Active partitions:" header, dashed separator, one block per entry
/// separated by a blank line, or "No active partitions" when empty.
pub fn format_listing(snapshots: &[PartitionSnapshot]) -> String {
    if snapshots.is_empty() {
        return "No active partitions".to_string();
    }

    let mut out = String::new();
    out.push_str("Active partitions:\n");
    out.push_str("------------------\n");
    for (i, p) in snapshots.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("ID: {}\n", p.id));
        out.push_str(&format!("Device: {} ({})\n", p.device_idx, p.device_name));
        out.push_str(&format!("Memory: {:.2}%\n", p.memory_fraction as f64 * 100.0));
        out.push_str(&format!(
            "Time remaining: {}s\n",
            p.remaining.as_secs()
        ));
        out.push_str(&format!("Owner: {} (pid {})\n", p.owner, p.pid));
    }
    out
}

/// `available` CLI command output: percentage to two decimal places.
pub fn format_available_fraction(pct: f64) -> String {
    format!("{pct:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_listing_reports_no_active_partitions() {
        assert_eq!(format_listing(&[]), "No active partitions");
    }

    #[test]
    fn listing_includes_required_fields() {
        let snapshot = PartitionSnapshot {
            id: "partition_0001".to_string(),
            device_idx: 0,
            device_name: "Fake GPU 0".to_string(),
            memory_fraction: 0.25,
            duration: std::time::Duration::from_secs(60),
            remaining: std::time::Duration::from_secs(30),
            owner: "alice".to_string(),
            pid: 100,
        };
        let rendered = format_listing(&[snapshot]);
        assert!(rendered.starts_with("Active partitions:\n"));
        assert!(rendered.contains("ID: partition_0001"));
        assert!(rendered.contains("Memory: 25.00%"));
        assert!(rendered.contains("Time remaining: 30s"));
        assert!(rendered.contains("Owner: alice (pid 100)"));
    }

    #[test]
    fn available_fraction_formats_two_decimals() {
        assert_eq!(format_available_fraction(100.0), "100.00");
        assert_eq!(format_available_fraction(33.333), "33.33");
    }
}
