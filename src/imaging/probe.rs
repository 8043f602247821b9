//! Container-level probing of source encoding facts.
//!
//! Recovers two things the decoder API does not report:
//! - `source_quality` (1-100): how aggressively the source was already
//!   compressed. Lossless sources report 100, which switches variant encodes
//!   to near-lossless.
//! - `chroma_subsampling`: `"4:2:0"` / `"4:2:2"` / `"4:4:4"` for JPEG,
//!   `"none"` where the notion does not apply.
//!
//! For JPEG: walks the marker stream. Quality is inverted from the luminance
//! quantization table (DQT) against the IJG reference table; subsampling is
//! read from the SOF component sampling factors.
//! For WebP: sniffs the RIFF chunk list, VP8L (lossless) vs VP8 (lossy,
//! always 4:2:0). PNG and TIFF are lossless by definition.
//!
//! Zero external dependencies. Probing never fails: any parse problem
//! degrades to the defaults.

use std::path::Path;

/// Assumed quality for lossy sources whose container does not carry one
/// (lossy WebP) and for anything unparseable.
const DEFAULT_QUALITY: u8 = 80;

/// IJG Annex K luminance quantization table, the reference point for the
/// quality estimate. Row-major; only the sum matters, so zigzag order is
/// irrelevant here.
const REFERENCE_LUMA_DQT: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99, //
];

/// Encoding facts probed from a source container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub source_quality: u8,
    pub chroma_subsampling: String,
}

impl ProbeResult {
    pub fn lossless() -> Self {
        Self {
            source_quality: 100,
            chroma_subsampling: "none".to_string(),
        }
    }
}

impl Default for ProbeResult {
    fn default() -> Self {
        Self {
            source_quality: DEFAULT_QUALITY,
            chroma_subsampling: "none".to_string(),
        }
    }
}

/// Probe a file on disk. Unreadable files probe as default.
pub fn probe_file(path: &Path) -> ProbeResult {
    match std::fs::read(path) {
        Ok(bytes) => probe_bytes(&bytes),
        Err(_) => ProbeResult::default(),
    }
}

/// Probe raw container bytes, dispatching on the magic signature.
pub fn probe_bytes(data: &[u8]) -> ProbeResult {
    if data.starts_with(&[0xFF, 0xD8]) {
        return probe_jpeg(data);
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return probe_webp(data);
    }
    if data.starts_with(b"\x89PNG\r\n\x1a\n")
        || data.starts_with(&[0x49, 0x49, 0x2A, 0x00])
        || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
    {
        return ProbeResult::lossless();
    }
    ProbeResult::default()
}

// ---------------------------------------------------------------------------
// JPEG: DQT quality estimate + SOF subsampling
// ---------------------------------------------------------------------------

/// Walk the JPEG marker stream collecting the luminance quantization table
/// and the frame header's sampling factors. Stops at SOS (entropy-coded data
/// follows) or on any structural damage, keeping whatever was found.
fn probe_jpeg(data: &[u8]) -> ProbeResult {
    let mut luma_table: Option<[u16; 64]> = None;
    let mut subsampling: Option<&'static str> = None;

    let mut pos = 2; // past SOI
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        match marker {
            // Fill byte before a marker
            0xFF => {
                pos += 1;
                continue;
            }
            // Standalone markers without a length field
            0x01 | 0xD8 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            // SOS / EOI: nothing of interest past here
            0xDA | 0xD9 => break,
            _ => {}
        }

        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if seg_len < 2 || pos + 2 + seg_len > data.len() {
            break;
        }
        let segment = &data[pos + 4..pos + 2 + seg_len];

        match marker {
            0xDB => {
                if luma_table.is_none() {
                    luma_table = find_luma_quant_table(segment);
                }
            }
            // SOF0-15, minus DHT (C4), JPG (C8), DAC (CC)
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                if subsampling.is_none() {
                    subsampling = sof_subsampling(segment);
                }
            }
            _ => {}
        }

        if luma_table.is_some() && subsampling.is_some() {
            break;
        }
        pos += 2 + seg_len;
    }

    ProbeResult {
        source_quality: luma_table
            .map(estimate_quality)
            .unwrap_or(DEFAULT_QUALITY),
        chroma_subsampling: subsampling.unwrap_or("none").to_string(),
    }
}

/// Pull table 0 (luminance) out of a DQT segment.
///
/// Segment layout, repeated per table:
///   Byte 0:   Pq/Tq (precision high nibble: 0 = 8-bit, 1 = 16-bit;
///             table id low nibble)
///   Bytes 1+: 64 entries, 1 or 2 bytes each, zigzag order
fn find_luma_quant_table(mut seg: &[u8]) -> Option<[u16; 64]> {
    while !seg.is_empty() {
        let precision = seg[0] >> 4;
        let table_id = seg[0] & 0x0F;
        let entry_size = if precision == 0 { 1 } else { 2 };
        let table_bytes = 64 * entry_size;
        if seg.len() < 1 + table_bytes {
            return None;
        }

        if table_id == 0 {
            let mut table = [0u16; 64];
            for (i, slot) in table.iter_mut().enumerate() {
                *slot = if entry_size == 1 {
                    seg[1 + i] as u16
                } else {
                    u16::from_be_bytes([seg[1 + 2 * i], seg[2 + 2 * i]])
                };
            }
            return Some(table);
        }

        seg = &seg[1 + table_bytes..];
    }
    None
}

/// Invert the IJG quality-to-scale mapping from the observed table.
///
/// The encoder scales the reference table by `5000/Q` (Q < 50) or
/// `200 - 2Q` (Q >= 50); comparing table sums recovers the scale percent and
/// from it the quality. This is an estimate; custom tables land wherever
/// their aggressiveness puts them.
fn estimate_quality(table: [u16; 64]) -> u8 {
    // An identity table (all ones) is what Q=100 produces after clamping.
    if table.iter().all(|&v| v <= 1) {
        return 100;
    }

    let sum: u32 = table.iter().map(|&v| u32::from(v)).sum();
    let reference_sum: u32 = REFERENCE_LUMA_DQT.iter().map(|&v| u32::from(v)).sum();
    let scale = sum as f64 * 100.0 / reference_sum as f64;

    let quality = if scale <= 100.0 {
        (200.0 - scale) / 2.0
    } else {
        5000.0 / scale
    };
    (quality.round() as i32).clamp(1, 100) as u8
}

/// Read the chroma subsampling from a SOF segment's first (luma) component.
///
/// Segment layout: precision (1) + height (2) + width (2) + component
/// count (1), then per component: id (1) + H/V sampling nibbles (1) +
/// quant table id (1).
fn sof_subsampling(seg: &[u8]) -> Option<&'static str> {
    if seg.len() < 6 {
        return None;
    }
    let components = seg[5] as usize;
    if components < 3 {
        // Grayscale: no chroma planes to subsample
        return Some("none");
    }
    if seg.len() < 6 + 3 {
        return None;
    }

    let factors = seg[7];
    Some(match (factors >> 4, factors & 0x0F) {
        (2, 2) => "4:2:0",
        (2, 1) => "4:2:2",
        (1, 2) => "4:4:0",
        (1, 1) => "4:4:4",
        _ => "none",
    })
}

// ---------------------------------------------------------------------------
// WebP: RIFF chunk sniff
// ---------------------------------------------------------------------------

/// Walk the RIFF chunk list looking for the frame payload. VP8X extended
/// files carry the actual frame in a later chunk, so keep walking past
/// metadata chunks.
fn probe_webp(data: &[u8]) -> ProbeResult {
    let mut pos = 12;
    while pos + 8 <= data.len() {
        let fourcc = &data[pos..pos + 4];
        let size =
            u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
                as usize;

        match fourcc {
            b"VP8L" => return ProbeResult::lossless(),
            b"VP8 " => {
                // VP8 is always 4:2:0; the quality knob is not stored
                return ProbeResult {
                    source_quality: DEFAULT_QUALITY,
                    chroma_subsampling: "4:2:0".to_string(),
                };
            }
            _ => {}
        }

        // Chunks are padded to even sizes
        pos += 8 + size + (size % 2);
    }
    ProbeResult::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- synthetic container builders --

    fn jpeg_with(segments: &[Vec<u8>]) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        for seg in segments {
            data.extend_from_slice(seg);
        }
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
        data
    }

    fn dqt_segment(table_id: u8, table: &[u16; 64]) -> Vec<u8> {
        let mut seg = vec![0xFF, 0xDB];
        seg.extend_from_slice(&((2 + 1 + 64) as u16).to_be_bytes());
        seg.push(table_id); // 8-bit precision
        seg.extend(table.iter().map(|&v| v as u8));
        seg
    }

    /// (component id, packed H/V nibbles) triples into a baseline SOF0.
    fn sof_segment(components: &[(u8, u8)]) -> Vec<u8> {
        let mut seg = vec![0xFF, 0xC0];
        seg.extend_from_slice(&((2 + 6 + components.len() * 3) as u16).to_be_bytes());
        seg.push(8); // sample precision
        seg.extend_from_slice(&1000u16.to_be_bytes());
        seg.extend_from_slice(&2000u16.to_be_bytes());
        seg.push(components.len() as u8);
        for (i, &(id, hv)) in components.iter().enumerate() {
            seg.push(id);
            seg.push(hv);
            seg.push(if i == 0 { 0 } else { 1 });
        }
        seg
    }

    /// The forward IJG scaling, for round-trip estimates.
    fn ijg_scaled(quality: u32) -> [u16; 64] {
        let scale = if quality < 50 {
            5000 / quality
        } else {
            200 - 2 * quality
        };
        let mut out = [0u16; 64];
        for (slot, &v) in out.iter_mut().zip(REFERENCE_LUMA_DQT.iter()) {
            *slot = ((u32::from(v) * scale + 50) / 100).clamp(1, 255) as u16;
        }
        out
    }

    fn webp_with(chunks: &[(&[u8; 4], usize)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"RIFF");
        data.extend_from_slice(&0u32.to_le_bytes()); // riff size, unchecked
        data.extend_from_slice(b"WEBP");
        for &(fourcc, size) in chunks {
            data.extend_from_slice(fourcc);
            data.extend_from_slice(&(size as u32).to_le_bytes());
            data.extend(std::iter::repeat_n(0u8, size + size % 2));
        }
        data
    }

    // -- JPEG quality --

    #[test]
    fn reference_table_estimates_quality_50() {
        let jpeg = jpeg_with(&[dqt_segment(0, &REFERENCE_LUMA_DQT)]);
        assert_eq!(probe_bytes(&jpeg).source_quality, 50);
    }

    #[test]
    fn identity_table_estimates_quality_100() {
        let jpeg = jpeg_with(&[dqt_segment(0, &[1u16; 64])]);
        assert_eq!(probe_bytes(&jpeg).source_quality, 100);
    }

    #[test]
    fn scaled_tables_round_trip() {
        for quality in [75u32, 90] {
            let jpeg = jpeg_with(&[dqt_segment(0, &ijg_scaled(quality))]);
            assert_eq!(
                probe_bytes(&jpeg).source_quality,
                quality as u8,
                "round-trip at quality {quality}"
            );
        }
    }

    #[test]
    fn heavily_compressed_table_estimates_low() {
        let jpeg = jpeg_with(&[dqt_segment(0, &ijg_scaled(10))]);
        assert!(probe_bytes(&jpeg).source_quality < 30);
    }

    #[test]
    fn chroma_table_alone_is_not_enough() {
        // Table id 1 only; no luminance table to estimate from
        let jpeg = jpeg_with(&[dqt_segment(1, &REFERENCE_LUMA_DQT)]);
        assert_eq!(probe_bytes(&jpeg).source_quality, DEFAULT_QUALITY);
    }

    #[test]
    fn luma_table_found_after_chroma_table() {
        let jpeg = jpeg_with(&[
            dqt_segment(1, &REFERENCE_LUMA_DQT),
            dqt_segment(0, &[1u16; 64]),
        ]);
        assert_eq!(probe_bytes(&jpeg).source_quality, 100);
    }

    // -- JPEG subsampling --

    #[test]
    fn sof_420_sampling() {
        let jpeg = jpeg_with(&[sof_segment(&[(1, 0x22), (2, 0x11), (3, 0x11)])]);
        assert_eq!(probe_bytes(&jpeg).chroma_subsampling, "4:2:0");
    }

    #[test]
    fn sof_422_sampling() {
        let jpeg = jpeg_with(&[sof_segment(&[(1, 0x21), (2, 0x11), (3, 0x11)])]);
        assert_eq!(probe_bytes(&jpeg).chroma_subsampling, "4:2:2");
    }

    #[test]
    fn sof_444_sampling() {
        let jpeg = jpeg_with(&[sof_segment(&[(1, 0x11), (2, 0x11), (3, 0x11)])]);
        assert_eq!(probe_bytes(&jpeg).chroma_subsampling, "4:4:4");
    }

    #[test]
    fn grayscale_has_no_subsampling() {
        let jpeg = jpeg_with(&[sof_segment(&[(1, 0x11)])]);
        assert_eq!(probe_bytes(&jpeg).chroma_subsampling, "none");
    }

    #[test]
    fn dqt_and_sof_combine() {
        let jpeg = jpeg_with(&[
            dqt_segment(0, &ijg_scaled(75)),
            sof_segment(&[(1, 0x22), (2, 0x11), (3, 0x11)]),
        ]);
        let probe = probe_bytes(&jpeg);
        assert_eq!(probe.source_quality, 75);
        assert_eq!(probe.chroma_subsampling, "4:2:0");
    }

    #[test]
    fn truncated_jpeg_degrades_to_defaults() {
        let mut jpeg = jpeg_with(&[dqt_segment(0, &REFERENCE_LUMA_DQT)]);
        jpeg.truncate(10);
        assert_eq!(probe_bytes(&jpeg), ProbeResult::default());
    }

    // -- WebP --

    #[test]
    fn webp_lossless_chunk() {
        let webp = webp_with(&[(b"VP8L", 16)]);
        assert_eq!(probe_bytes(&webp), ProbeResult::lossless());
    }

    #[test]
    fn webp_lossy_chunk() {
        let webp = webp_with(&[(b"VP8 ", 16)]);
        let probe = probe_bytes(&webp);
        assert_eq!(probe.source_quality, DEFAULT_QUALITY);
        assert_eq!(probe.chroma_subsampling, "4:2:0");
    }

    #[test]
    fn webp_extended_walks_past_metadata_chunks() {
        let webp = webp_with(&[(b"VP8X", 10), (b"EXIF", 7), (b"VP8L", 16)]);
        assert_eq!(probe_bytes(&webp), ProbeResult::lossless());
    }

    // -- other formats and failure paths --

    #[test]
    fn png_magic_is_lossless() {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(&[0; 16]);
        assert_eq!(probe_bytes(&png), ProbeResult::lossless());
    }

    #[test]
    fn tiff_magic_both_byte_orders() {
        assert_eq!(
            probe_bytes(&[0x49, 0x49, 0x2A, 0x00, 0, 0, 0, 0]),
            ProbeResult::lossless()
        );
        assert_eq!(
            probe_bytes(&[0x4D, 0x4D, 0x00, 0x2A, 0, 0, 0, 0]),
            ProbeResult::lossless()
        );
    }

    #[test]
    fn garbage_bytes_probe_as_default() {
        assert_eq!(probe_bytes(b"not an image at all"), ProbeResult::default());
        assert_eq!(probe_bytes(&[]), ProbeResult::default());
    }

    #[test]
    fn missing_file_probes_as_default() {
        assert_eq!(
            probe_file(Path::new("/nonexistent/image.jpg")),
            ProbeResult::default()
        );
    }
}
