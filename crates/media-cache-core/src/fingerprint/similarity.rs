use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher as _;
use twox_hash::XxHash64;

/// Side of the spatial grid the image is reduced to.
const GRID: u32 = 4;
/// Quantisation levels per colour channel.
const LEVELS: u16 = 4;

/// Perceptual digest of an image's coarse colour layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimilarityFingerprint(String);

impl SimilarityFingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SimilarityFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce the image to a GRID x GRID colour histogram and hash it.
///
/// Each cell is the box average of its region, each channel quantised to
/// LEVELS buckets. Resizing or mild recompression keeps the buckets, so the
/// digest stays equal.
pub fn compute_similarity_fingerprint(image: &DynamicImage) -> SimilarityFingerprint {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut hasher = XxHash64::with_seed(0);
    if width > 0 && height > 0 {
        for cell_y in 0..GRID {
            let (y0, y1) = cell_bounds(cell_y, height);
            for cell_x in 0..GRID {
                let (x0, x1) = cell_bounds(cell_x, width);
                let mut sums = [0u64; 3];
                for y in y0..y1 {
                    for x in x0..x1 {
                        let pixel = rgb.get_pixel(x, y);
                        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                            *sum += channel as u64;
                        }
                    }
                }
                let count = ((x1 - x0) * (y1 - y0)) as u64;
                for sum in sums {
                    hasher.write_u8(quantize((sum / count) as u8));
                }
            }
        }
    }
    SimilarityFingerprint(format!("{:016x}", hasher.finish()))
}

/// Pixel range covered by one grid cell; never empty for a non-empty axis.
fn cell_bounds(cell: u32, extent: u32) -> (u32, u32) {
    let start = (cell * extent / GRID).min(extent - 1);
    let end = ((cell + 1) * extent / GRID).clamp(start + 1, extent);
    (start, end)
}

fn quantize(channel: u8) -> u8 {
    ((channel as u16 * LEVELS) / 256) as u8
}
