//! Lightweight grayscale buffers shared by detector backends.

/// Borrowed row-major 8-bit grayscale image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

/// Owned row-major 8-bit grayscale image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl<'a> GrayImageView<'a> {
    /// Wrap a raw buffer, returning `None` when `data.len() != width * height`.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Option<Self> {
        let expected = width.checked_mul(height)?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Pixel value, or 0 outside the image.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> u8 {
        if !self.contains(x, y) {
            return 0;
        }
        self.data[y as usize * self.width + x as usize]
    }

    /// Mean of the 3x3 neighbourhood around `(x, y)`; `None` if it leaves the image.
    pub fn mean_3x3(&self, x: f32, y: f32) -> Option<u8> {
        let ix = x.floor() as i32;
        let iy = y.floor() as i32;
        if !self.contains(ix - 1, iy - 1) || !self.contains(ix + 1, iy + 1) {
            return None;
        }

        let mut sum = 0u32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                sum += self.get(ix + dx, iy + dy) as u32;
            }
        }
        Some((sum / 9) as u8)
    }

    /// Bilinear interpolation; samples outside the image read as 0.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let p00 = self.get(x0, y0) as f32;
        let p10 = self.get(x0 + 1, y0) as f32;
        let p01 = self.get(x0, y0 + 1) as f32;
        let p11 = self.get(x0 + 1, y0 + 1) as f32;

        let a = p00 + fx * (p10 - p00);
        let b = p01 + fx * (p11 - p01);
        a + fy * (b - a)
    }

    #[inline]
    pub fn sample_bilinear_u8(&self, x: f32, y: f32) -> u8 {
        self.sample_bilinear(x, y).clamp(0.0, 255.0) as u8
    }
}

impl GrayImage {
    pub fn new(width: usize, height: usize, fill: u8) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    /// Fill the axis-aligned block `[x0, x0+w) × [y0, y0+h)`, clipped to the image.
    pub fn fill_rect(&mut self, x0: usize, y0: usize, w: usize, h: usize, value: u8) {
        let x1 = (x0 + w).min(self.width);
        let y1 = (y0 + h).min(self.height);
        for y in y0.min(y1)..y1 {
            let row = y * self.width;
            self.data[row + x0.min(x1)..row + x1].fill(value);
        }
    }
}
