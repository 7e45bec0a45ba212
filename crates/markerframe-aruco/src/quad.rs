//! Square candidates from dark connected components.

use markerframe_core::{GrayImageView, Quad};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Geometric filters for quad candidates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadParams {
    /// Minimum number of dark pixels in a component.
    pub min_area_px: usize,
    /// Minimum length of every quad side, in pixels.
    pub min_side_px: f32,
    /// Drop components that touch the image border.
    pub reject_border_touching: bool,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            min_area_px: 64,
            min_side_px: 12.0,
            reject_border_touching: true,
        }
    }
}

/// A dark blob approximated by four outline corners, clockwise in the image.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadCandidate {
    pub corners: Quad,
    pub area_px: usize,
}

impl QuadCandidate {
    pub fn center(&self) -> Point2<f32> {
        quad_center(&self.corners)
    }
}

pub(crate) fn quad_center(q: &Quad) -> Point2<f32> {
    let s = q.iter().fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords);
    Point2::from(s / 4.0)
}

/// Shoelace sum; positive for clockwise order in image coordinates (y down).
fn signed_area2(q: &Quad) -> f32 {
    (0..4)
        .map(|i| {
            let a = q[i];
            let b = q[(i + 1) % 4];
            a.x * b.y - b.x * a.y
        })
        .sum()
}

/// Whether `p` lies inside the convex quad `q`.
pub(crate) fn quad_contains(q: &Quad, p: &Point2<f32>) -> bool {
    let orientation = signed_area2(q).signum();
    (0..4).all(|i| {
        let a = q[i];
        let b = q[(i + 1) % 4];
        let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
        cross * orientation >= 0.0
    })
}

/// Find quad candidates among pixels darker than `threshold`.
pub fn find_quads(
    image: &GrayImageView<'_>,
    threshold: u8,
    params: &QuadParams,
) -> Vec<QuadCandidate> {
    let (w, h) = (image.width, image.height);
    let dark = |x: i32, y: i32| image.contains(x, y) && image.get(x, y) < threshold;

    let mut visited = vec![false; w * h];
    let mut out = Vec::new();
    let mut component: Vec<(i32, i32)> = Vec::new();
    let mut queue = VecDeque::new();
    let mut n_components = 0usize;

    for y0 in 0..h as i32 {
        for x0 in 0..w as i32 {
            let idx0 = y0 as usize * w + x0 as usize;
            if visited[idx0] || !dark(x0, y0) {
                continue;
            }
            n_components += 1;

            component.clear();
            visited[idx0] = true;
            queue.push_back((x0, y0));
            let mut touches_border = false;

            while let Some((x, y)) = queue.pop_front() {
                component.push((x, y));
                if x == 0 || y == 0 || x + 1 == w as i32 || y + 1 == h as i32 {
                    touches_border = true;
                }
                for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
                    if !dark(nx, ny) {
                        continue;
                    }
                    let nidx = ny as usize * w + nx as usize;
                    if !visited[nidx] {
                        visited[nidx] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }

            if component.len() < params.min_area_px {
                continue;
            }
            if touches_border && params.reject_border_touching {
                continue;
            }

            // outline pixel centres
            let outline: Vec<Point2<f32>> = component
                .iter()
                .filter(|&&(x, y)| {
                    !dark(x - 1, y) || !dark(x + 1, y) || !dark(x, y - 1) || !dark(x, y + 1)
                })
                .map(|&(x, y)| Point2::new(x as f32 + 0.5, y as f32 + 0.5))
                .collect();

            let Some(corners) = extreme_corners(&outline) else {
                continue;
            };
            if !passes_shape_checks(&corners, params) {
                continue;
            }
            out.push(QuadCandidate {
                corners,
                area_px: component.len(),
            });
        }
    }

    log::debug!(
        "quad search: {} dark components, {} quad candidates (threshold {})",
        n_components,
        out.len(),
        threshold
    );
    out
}

/// Four outline extremes: the point farthest from the centroid, the point
/// farthest from that one, and the extreme points on either side of the
/// diagonal they span. Corners are pushed half a pixel diagonal outwards so
/// they sit on pixel edges rather than pixel centres.
fn extreme_corners(outline: &[Point2<f32>]) -> Option<Quad> {
    if outline.len() < 4 {
        return None;
    }
    let n = outline.len() as f32;
    let c = Point2::from(
        outline
            .iter()
            .fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords)
            / n,
    );

    let farthest_from = |q: Point2<f32>| {
        outline
            .iter()
            .copied()
            .fold((q, -1.0f32), |best, p| {
                let d = (p - q).norm_squared();
                if d > best.1 {
                    (p, d)
                } else {
                    best
                }
            })
            .0
    };
    let p0 = farthest_from(c);
    let p2 = farthest_from(p0);
    let diag = p2 - p0;
    if diag.norm_squared() < 1.0 {
        return None;
    }

    let mut neg = (p0, 0.0f32);
    let mut pos = (p0, 0.0f32);
    for &p in outline {
        let v = p - p0;
        let cross = diag.x * v.y - diag.y * v.x;
        if cross < neg.1 {
            neg = (p, cross);
        }
        if cross > pos.1 {
            pos = (p, cross);
        }
    }
    if neg.1 >= 0.0 || pos.1 <= 0.0 {
        return None;
    }

    let mut quad = [p0, pos.0, p2, neg.0];
    if signed_area2(&quad) < 0.0 {
        quad.swap(1, 3);
    }

    let center = quad_center(&quad);
    for p in quad.iter_mut() {
        let dir = *p - center;
        let len = dir.norm();
        if len > 0.0 {
            *p += dir * (std::f32::consts::FRAC_1_SQRT_2 / len);
        }
    }
    Some(quad)
}

fn passes_shape_checks(q: &Quad, params: &QuadParams) -> bool {
    let min_side2 = params.min_side_px * params.min_side_px;
    let mut sign = 0.0f32;
    for i in 0..4 {
        let a = q[i];
        let b = q[(i + 1) % 4];
        let c = q[(i + 2) % 4];
        if (b - a).norm_squared() < min_side2 {
            return false;
        }
        let turn = (b - a).perp(&(c - b));
        if turn == 0.0 || (sign != 0.0 && turn.signum() != sign) {
            return false;
        }
        sign = turn.signum();
    }
    true
}
