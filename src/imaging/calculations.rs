//! Pure calculation functions for sizing and savings math.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate output dimensions for a width-capped resize.
///
/// Preserves aspect ratio and never upscales: if the source width is already
/// within `max_width`, returns `None` and the caller keeps the original
/// dimensions.
///
/// # Examples
/// ```
/// # use pixlift::imaging::scaled_dimensions;
/// // 1600px wide capped at 800 → 800x600
/// assert_eq!(scaled_dimensions((1600, 1200), 800), Some((800, 600)));
///
/// // 600px wide capped at 800 → untouched
/// assert_eq!(scaled_dimensions((600, 400), 800), None);
/// ```
pub fn scaled_dimensions(source: (u32, u32), max_width: u32) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    if src_w <= max_width {
        return None;
    }

    let ratio = max_width as f64 / src_w as f64;
    let h = ((src_h as f64 * ratio).round() as u32).max(1);
    Some((max_width, h))
}

/// Format an aspect ratio (width / height) with two decimal places.
///
/// This is the string stored in image metadata records; keeping it formatted
/// here means the store, reports, and tests all agree on the rendering.
///
/// # Examples
/// ```
/// # use pixlift::imaging::aspect_ratio_label;
/// assert_eq!(aspect_ratio_label(2000, 1000), "2.00");
/// assert_eq!(aspect_ratio_label(1500, 1000), "1.50");
/// ```
pub fn aspect_ratio_label(width: u32, height: u32) -> String {
    if height == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", width as f64 / height as f64)
}

/// Percentage of bytes saved by optimization, formatted with two decimals.
///
/// A result of `"60.00"` means the optimized output is 60% smaller than the
/// original. Negative values are possible when the output grew. A zero-byte
/// original reports `"0.00"` rather than dividing by zero.
///
/// # Examples
/// ```
/// # use pixlift::imaging::compression_ratio_percent;
/// assert_eq!(compression_ratio_percent(1_000_000, 400_000), "60.00");
/// assert_eq!(compression_ratio_percent(1000, 1250), "-25.00");
/// ```
pub fn compression_ratio_percent(original: u64, optimized: u64) -> String {
    if original == 0 {
        return "0.00".to_string();
    }
    let saved = 1.0 - optimized as f64 / original as f64;
    format!("{:.2}", saved * 100.0)
}

/// Signed byte delta between original and optimized sizes.
///
/// Positive means the optimization shrank the data; negative means it grew
/// (tiny sources fanned out into several variants can do that).
pub fn bytes_saved(original: u64, optimized: u64) -> i64 {
    original as i64 - optimized as i64
}
