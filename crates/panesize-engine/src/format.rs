//! Size label formatting.

use humansize::{BINARY, FormatSizeOptions};

/// Suffix of a provisional directory size.
pub const SCANNING_MARKER: &str = " (scanning…)";

fn label_options() -> FormatSizeOptions {
    BINARY.space_after_value(false)
}

/// Format a byte count, e.g. `450B` or `1.50KiB`.
pub fn format_bytes(bytes: u64) -> String {
    humansize::format_size(bytes, label_options())
}

/// Label for a directory row: exact, or provisional with the scanning marker.
pub fn size_label(bytes: u64, scanning: bool) -> String {
    let mut label = format_bytes(bytes);
    if scanning {
        label.push_str(SCANNING_MARKER);
    }
    label
}
