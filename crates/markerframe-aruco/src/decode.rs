//! Bit decoding of a marker seen through an image quad.

use crate::threshold::otsu_threshold_from_samples;
use markerframe_core::{homography_from_4pt, GrayImageView, Homography, Quad};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Decoder configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeParams {
    /// Marker border width in cells (OpenCV uses 1).
    pub border_bits: usize,
    /// Require border-black ratio >= this.
    pub min_border_score: f32,
    /// Also try white-on-black markers.
    pub detect_inverted: bool,
    /// Minimum projected cell size in pixels.
    pub min_cell_px: f32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            border_bits: 1,
            min_border_score: 0.85,
            detect_inverted: false,
            min_cell_px: 3.0,
        }
    }
}

/// Raw code read from one quad, before dictionary lookup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodedQuad {
    /// Observed inner bits (row-major, black=1), with `quad[0]` as top-left.
    pub code: u64,
    pub border_score: f32,
    /// Whether polarity was inverted to maximize `border_score`.
    pub inverted: bool,
}

const THRESH_SUBDIV: usize = 3;

/// Read the `bits × bits` payload of the marker whose outline is `quad`.
///
/// `quad` must be clockwise in the image; `quad[0]` is read as the top-left
/// cell corner. Returns `None` if any sample leaves the image or the border
/// is not dark enough.
pub fn decode_quad(
    image: &GrayImageView<'_>,
    quad: &Quad,
    bits: usize,
    params: &DecodeParams,
) -> Option<DecodedQuad> {
    let cells = bits + 2 * params.border_bits;
    if bits == 0 || bits * bits > 64 {
        return None;
    }

    let shortest_side = (0..4)
        .map(|i| (quad[(i + 1) % 4] - quad[i]).norm())
        .fold(f32::INFINITY, f32::min);
    if shortest_side / (cells as f32) < params.min_cell_px {
        return None;
    }

    let side = cells as f64;
    let canonical = [
        Point2::new(0.0, 0.0),
        Point2::new(side, 0.0),
        Point2::new(side, side),
        Point2::new(0.0, side),
    ];
    let img_quad = quad.map(|p| Point2::new(p.x as f64, p.y as f64));
    let h = homography_from_4pt(&canonical, &img_quad)?;

    let samples = sample_cells(image, &h, cells)?;
    let thr_samples = sample_threshold_grid(image, &h, cells);
    let thr = if thr_samples.is_empty() {
        otsu_threshold_from_samples(&samples)
    } else {
        otsu_threshold_from_samples(&thr_samples)
    };

    decode_samples(&samples, thr, cells, bits, params)
}

fn sample_cells(image: &GrayImageView<'_>, h: &Homography, cells: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(cells * cells);
    for cy in 0..cells {
        for cx in 0..cells {
            let q = h.apply(Point2::new(cx as f64 + 0.5, cy as f64 + 0.5));
            out.push(image.mean_3x3(q.x as f32, q.y as f32)?);
        }
    }
    Some(out)
}

fn sample_threshold_grid(image: &GrayImageView<'_>, h: &Homography, cells: usize) -> Vec<u8> {
    let grid = cells * THRESH_SUBDIV;
    let step = 1.0 / THRESH_SUBDIV as f64;
    let mut out = Vec::with_capacity(grid * grid);
    for ty in 0..grid {
        for tx in 0..grid {
            let q = h.apply(Point2::new(
                (tx as f64 + 0.5) * step,
                (ty as f64 + 0.5) * step,
            ));
            let (x, y) = (q.x as f32, q.y as f32);
            if image.contains(x.floor() as i32, y.floor() as i32) {
                out.push(image.sample_bilinear_u8(x, y));
            }
        }
    }
    out
}

fn decode_samples(
    samples: &[u8],
    thr: u8,
    cells: usize,
    bits: usize,
    params: &DecodeParams,
) -> Option<DecodedQuad> {
    let border = params.border_bits;
    let use_border = border > 0;
    let polarities: &[bool] = if params.detect_inverted {
        &[false, true]
    } else {
        &[false]
    };

    let mut best: Option<DecodedQuad> = None;
    for &inverted in polarities {
        let mut border_ok = 0u32;
        let mut border_total = 0u32;
        let mut code = 0u64;

        for cy in 0..cells {
            for cx in 0..cells {
                let is_black = (samples[cy * cells + cx] < thr) != inverted;
                let is_border = use_border
                    && (cx < border || cy < border || cx + border >= cells || cy + border >= cells);
                if is_border {
                    border_total += 1;
                    border_ok += is_black as u32;
                } else if is_black {
                    code |= 1u64 << ((cy - border) * bits + (cx - border));
                }
            }
        }

        let border_score = if use_border {
            border_ok as f32 / border_total.max(1) as f32
        } else {
            1.0
        };
        if border_score < params.min_border_score {
            continue;
        }
        if best.map_or(true, |b| border_score > b.border_score) {
            best = Some(DecodedQuad {
                code,
                border_score,
                inverted,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use markerframe_core::GrayImage;

    /// 4x4 payload with a 1-cell border, drawn axis-aligned.
    fn draw(code: u64, cell: usize, x0: usize, y0: usize) -> GrayImage {
        let mut img = GrayImage::new(x0 * 2 + 6 * cell, y0 * 2 + 6 * cell, 255);
        for cy in 0..6 {
            for cx in 0..6 {
                let border = cx == 0 || cy == 0 || cx == 5 || cy == 5;
                let bit = !border && (code >> ((cy - 1) * 4 + (cx - 1))) & 1 == 1;
                if border || bit {
                    img.fill_rect(x0 + cx * cell, y0 + cy * cell, cell, cell, 0);
                }
            }
        }
        img
    }

    fn outline(cell: usize, x0: usize, y0: usize) -> Quad {
        let (a, b) = (x0 as f32, y0 as f32);
        let s = (6 * cell) as f32;
        [
            Point2::new(a, b),
            Point2::new(a + s, b),
            Point2::new(a + s, b + s),
            Point2::new(a, b + s),
        ]
    }

    #[test]
    fn reads_axis_aligned_payload() {
        let img = draw(0x8013, 10, 20, 20);
        let d = decode_quad(&img.view(), &outline(10, 20, 20), 4, &DecodeParams::default())
            .expect("decoded");
        assert_eq!(d.code, 0x8013);
        assert_eq!(d.border_score, 1.0);
        assert!(!d.inverted);
    }

    #[test]
    fn starting_corner_rotates_the_reading() {
        let img = draw(0x8013, 10, 20, 20);
        let q = outline(10, 20, 20);
        // read with the drawn top-right as quad[0]
        let shifted = [q[1], q[2], q[3], q[0]];
        let d = decode_quad(&img.view(), &shifted, 4, &DecodeParams::default()).expect("decoded");
        assert_eq!(d.code, crate::rotate_code_u64(0x8013, 4, 3));
    }

    #[test]
    fn white_square_has_no_border() {
        let mut img = GrayImage::new(100, 100, 255);
        img.fill_rect(20, 20, 60, 60, 200);
        let small = outline(10, 20, 20);
        assert!(decode_quad(&img.view(), &small, 4, &DecodeParams::default()).is_none());
    }

    #[test]
    fn inverted_marker_needs_opt_in() {
        let mut img = draw(0x1268, 10, 20, 20);
        for v in img.data.iter_mut() {
            *v = 255 - *v;
        }
        let q = outline(10, 20, 20);
        assert!(decode_quad(&img.view(), &q, 4, &DecodeParams::default()).is_none());

        let params = DecodeParams {
            detect_inverted: true,
            ..DecodeParams::default()
        };
        let d = decode_quad(&img.view(), &q, 4, &params).expect("decoded");
        assert!(d.inverted);
        assert_eq!(d.code, 0x1268);
    }
}
