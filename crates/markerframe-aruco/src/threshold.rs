//! Otsu thresholding for binarization and bit decoding.

use markerframe_core::GrayImageView;

/// Global Otsu threshold of a whole image.
pub fn otsu_threshold(image: &GrayImageView<'_>) -> u8 {
    let mut hist = [0u32; 256];
    for &v in image.data {
        hist[v as usize] += 1;
    }
    otsu_from_histogram(&hist)
}

/// Otsu threshold of a set of sample intensities.
pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    otsu_from_histogram(&hist)
}

/// Pixels strictly below the returned value count as dark.
fn otsu_from_histogram(hist: &[u32; 256]) -> u8 {
    let total: u64 = hist.iter().map(|&h| h as u64).sum();
    if total == 0 {
        return 127;
    }

    let min_v = hist.iter().position(|&h| h > 0).unwrap_or(0);
    let max_v = hist.iter().rposition(|&h| h > 0).unwrap_or(255);
    if min_v == max_v {
        return min_v as u8;
    }
    let nonzero_bins = hist.iter().filter(|&&h| h > 0).count();
    if nonzero_bins <= 2 {
        return ((min_v + max_v + 1) / 2) as u8;
    }

    let total = total as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127usize;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t;
        }
    }

    // `best_t` is the last dark bin; dark means strictly below the result
    (best_t + 1).min(255) as u8
}
