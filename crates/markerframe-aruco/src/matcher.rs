//! Dictionary matching and rotation helpers.

use crate::Dictionary;

/// Dictionary hit for one decoded bit grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    pub id: u32,
    /// Quarter turns with `observed == rotate_code_u64(code[id], n, rotation)`.
    pub rotation: u8,
    /// Corrected bits.
    pub hamming: u8,
}

/// Compares observed codes with every dictionary entry in all four orientations.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    /// `orientations[id][r]` is entry `id` turned `r` quarter turns.
    orientations: Vec<[u64; 4]>,
}

impl Matcher {
    /// `max_hamming` above the dictionary's `max_correction_bits` is clamped.
    pub fn new(dict: Dictionary, max_hamming: u8) -> Self {
        let n = dict.marker_size;
        let orientations = dict
            .codes
            .iter()
            .map(|&code| [0u8, 1, 2, 3].map(|r| rotate_code_u64(code, n, r)))
            .collect();
        Self {
            max_hamming: max_hamming.min(dict.max_correction_bits),
            dict,
            orientations,
        }
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Closest entry within `max_hamming`; ties go to the lower id, then rotation.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        self.orientations
            .iter()
            .enumerate()
            .flat_map(|(id, codes)| {
                codes.iter().enumerate().map(move |(r, &code)| Match {
                    id: id as u32,
                    rotation: r as u8,
                    hamming: (observed ^ code).count_ones() as u8,
                })
            })
            .filter(|m| m.hamming <= self.max_hamming)
            .min_by_key(|m| (m.hamming, m.id, m.rotation))
    }
}

/// Turn an `n x n` row-major bit grid (bit `y * n + x`, top-left first) by
/// `rot` quarter turns clockwise.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    // source cell of output cell (x, y)
    let source = |x: usize, y: usize| match rot & 3 {
        0 => (x, y),
        1 => (y, n - 1 - x),
        2 => (n - 1 - x, n - 1 - y),
        _ => (n - 1 - y, x),
    };
    (0..n * n).fold(0u64, |out, idx| {
        let (sx, sy) = source(idx % n, idx / n);
        out | (((code >> (sy * n + sx)) & 1) << idx)
    })
}
