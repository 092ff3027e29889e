//! Float image planes and the Gaussian/Laplacian pyramid operations
//! used by exposure fusion.
//!
//! Borders are handled by reflection without repeating the edge sample
//! (`dcb|abcd|cba`), so a 1-pixel-wide plane stays well defined.

/// Interleaved `f32` image with an arbitrary channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl FloatImage {
    pub fn zeros(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; width * height * channels],
        }
    }

    pub fn from_data(width: usize, height: usize, channels: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width * height * channels);
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[(y * self.width + x) * self.channels + c]
    }

    /// `self += other`, shapes must match.
    pub fn add_assign(&mut self, other: &FloatImage) {
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// `self -= other`, shapes must match.
    pub fn sub_assign(&mut self, other: &FloatImage) {
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a -= b;
        }
    }

    /// `self += weight * img` where `weight` is single-channel and `img`
    /// has `self.channels` channels.
    pub fn add_weighted(&mut self, weight: &FloatImage, img: &FloatImage) {
        let ch = self.channels;
        for (i, w) in weight.data.iter().enumerate() {
            for c in 0..ch {
                self.data[i * ch + c] += w * img.data[i * ch + c];
            }
        }
    }
}

/// Reflect an out-of-range index back into `0..len`.
#[inline]
fn reflect(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let n = len as isize;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Separable 5-tap binomial blur.
fn blur(src: &FloatImage) -> FloatImage {
    let (w, h, ch) = (src.width, src.height, src.channels);
    let mut tmp = FloatImage::zeros(w, h, ch);
    for y in 0..h {
        for x in 0..w {
            for c in 0..ch {
                let mut acc = 0.0;
                for (k, kv) in KERNEL.iter().enumerate() {
                    let sx = reflect(x as isize + k as isize - 2, w);
                    acc += kv * src.at(sx, y, c);
                }
                tmp.data[(y * w + x) * ch + c] = acc;
            }
        }
    }
    let mut out = FloatImage::zeros(w, h, ch);
    for y in 0..h {
        for x in 0..w {
            for c in 0..ch {
                let mut acc = 0.0;
                for (k, kv) in KERNEL.iter().enumerate() {
                    let sy = reflect(y as isize + k as isize - 2, h);
                    acc += kv * tmp.at(x, sy, c);
                }
                out.data[(y * w + x) * ch + c] = acc;
            }
        }
    }
    out
}

/// Blur and drop every other row and column. Output is
/// `ceil(w / 2) × ceil(h / 2)`.
pub fn pyr_down(src: &FloatImage) -> FloatImage {
    let blurred = blur(src);
    let (w, h, ch) = (src.width.div_ceil(2), src.height.div_ceil(2), src.channels);
    let mut out = FloatImage::zeros(w, h, ch);
    for y in 0..h {
        for x in 0..w {
            for c in 0..ch {
                out.data[(y * w + x) * ch + c] = blurred.at(2 * x, 2 * y, c);
            }
        }
    }
    out
}

/// Upsample to `width × height` by zero insertion and blur.
pub fn pyr_up(src: &FloatImage, width: usize, height: usize) -> FloatImage {
    let ch = src.channels;
    let mut spread = FloatImage::zeros(width, height, ch);
    for y in 0..src.height {
        let dy = 2 * y;
        if dy >= height {
            break;
        }
        for x in 0..src.width {
            let dx = 2 * x;
            if dx >= width {
                break;
            }
            for c in 0..ch {
                // Times four to restore energy lost to the inserted zeros.
                spread.data[(dy * width + dx) * ch + c] = 4.0 * src.at(x, y, c);
            }
        }
    }
    blur(&spread)
}

/// Gaussian pyramid with `levels + 1` entries, finest first.
pub fn gaussian_pyramid(src: &FloatImage, levels: usize) -> Vec<FloatImage> {
    let mut pyr = Vec::with_capacity(levels + 1);
    pyr.push(src.clone());
    for lvl in 0..levels {
        let next = pyr_down(&pyr[lvl]);
        pyr.push(next);
    }
    pyr
}

/// Laplacian pyramid: band-pass levels plus the coarsest Gaussian level.
pub fn laplacian_pyramid(src: &FloatImage, levels: usize) -> Vec<FloatImage> {
    let mut pyr = gaussian_pyramid(src, levels);
    for lvl in 0..levels {
        let (w, h) = (pyr[lvl].width, pyr[lvl].height);
        let up = pyr_up(&pyr[lvl + 1], w, h);
        pyr[lvl].sub_assign(&up);
    }
    pyr
}

/// Rebuild an image from a Laplacian pyramid. `None` for an empty one.
pub fn collapse(mut pyr: Vec<FloatImage>) -> Option<FloatImage> {
    let mut acc = pyr.pop()?;
    while let Some(mut finer) = pyr.pop() {
        let up = pyr_up(&acc, finer.width, finer.height);
        finer.add_assign(&up);
        acc = finer;
    }
    Some(acc)
}

/// 4-neighbour Laplacian of a single-channel plane.
pub fn laplacian(src: &FloatImage) -> FloatImage {
    debug_assert_eq!(src.channels, 1);
    let (w, h) = (src.width, src.height);
    let mut out = FloatImage::zeros(w, h, 1);
    for y in 0..h {
        for x in 0..w {
            let xi = x as isize;
            let yi = y as isize;
            let left = src.at(reflect(xi - 1, w), y, 0);
            let right = src.at(reflect(xi + 1, w), y, 0);
            let up = src.at(x, reflect(yi - 1, h), 0);
            let down = src.at(x, reflect(yi + 1, h), 0);
            out.data[y * w + x] = left + right + up + down - 4.0 * src.at(x, y, 0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_indices() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(-2, 5), 2);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(6, 5), 2);
        assert_eq!(reflect(3, 1), 0);
        assert_eq!(reflect(-1, 2), 1);
    }

    #[test]
    fn pyr_down_halves_rounding_up() {
        let img = FloatImage::zeros(7, 4, 3);
        let down = pyr_down(&img);
        assert_eq!((down.width, down.height, down.channels), (4, 2, 3));
    }

    #[test]
    fn constant_image_survives_pyramid_roundtrip() {
        let img = FloatImage::from_data(9, 6, 1, vec![0.5; 54]);
        let pyr = laplacian_pyramid(&img, 3);
        assert_eq!(pyr.len(), 4);
        let rebuilt = collapse(pyr).unwrap();
        for v in rebuilt.data {
            assert!((v - 0.5).abs() < 1e-5, "got {v}");
        }
    }

    #[test]
    fn laplacian_of_constant_is_zero() {
        let img = FloatImage::from_data(4, 4, 1, vec![0.3; 16]);
        assert!(laplacian(&img).data.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn laplacian_of_spike() {
        let mut data = vec![0.0; 9];
        data[4] = 1.0;
        let lap = laplacian(&FloatImage::from_data(3, 3, 1, data));
        assert_eq!(lap.data[4], -4.0);
        // Top edge mirrors the spike's row back onto itself.
        assert_eq!(lap.data[1], 2.0);
        assert_eq!(lap.data[0], 0.0);
    }
}
