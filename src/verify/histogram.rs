//! Color-histogram comparison.
//!
//! Deliberately a cheap heuristic rather than a learned embedding: zero
//! cold-start latency and reproducible scores, at the cost of accuracy.

use image::{imageops::FilterType, DynamicImage};

/// Both images are squashed to this square before comparison, normalizing
/// away resolution and aspect differences.
pub const COMPARE_EDGE: u32 = 100;

/// Intensity bins per color channel (bin width 256/16).
pub const BINS_PER_CHANNEL: usize = 16;

const BIN_WIDTH: usize = 256 / BINS_PER_CHANNEL;

/// Concatenated R/G/B intensity histograms as one 48-length vector, each
/// bin normalized by pixel count so the vector is a probability
/// distribution independent of image size.
pub fn color_histogram(image: &DynamicImage) -> Vec<f64> {
    let small = image
        .resize_exact(COMPARE_EDGE, COMPARE_EDGE, FilterType::Triangle)
        .to_rgb8();

    let mut histogram = vec![0.0f64; BINS_PER_CHANNEL * 3];
    for pixel in small.pixels() {
        let [r, g, b] = pixel.0;
        histogram[r as usize / BIN_WIDTH] += 1.0;
        histogram[BINS_PER_CHANNEL + g as usize / BIN_WIDTH] += 1.0;
        histogram[BINS_PER_CHANNEL * 2 + b as usize / BIN_WIDTH] += 1.0;
    }

    let total_pixels = f64::from(COMPARE_EDGE * COMPARE_EDGE);
    for bin in &mut histogram {
        *bin /= total_pixels;
    }

    histogram
}

/// `dot(a, b) / (|a| * |b|)`, 0.0 when either vector is all zeros.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (&lhs, &rhs) in a.iter().zip(b) {
        dot += lhs * rhs;
        norm_a += lhs * lhs;
        norm_b += rhs * rhs;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
