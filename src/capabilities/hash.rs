// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Average-hash perceptual fingerprints

use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;

use super::PerceptualHasher;
use crate::Result;

/// Side of the grayscale thumbnail; the hash has `HASH_SIDE²` bits
pub const HASH_SIDE: u32 = 8;
pub const HASH_BITS: usize = (HASH_SIDE * HASH_SIDE) as usize;

/// Compute the 64-character aHash bit string of an image.
///
/// Bit *i* is `1` when pixel *i* of the 8×8 grayscale thumbnail is brighter
/// than the thumbnail's mean luminance.
pub fn average_hash(image: &DynamicImage) -> String {
    let thumb = image
        .resize_exact(HASH_SIDE, HASH_SIDE, FilterType::Triangle)
        .to_luma8();

    let total: u32 = thumb.pixels().map(|p| p[0] as u32).sum();
    let mean = total as f64 / HASH_BITS as f64;

    thumb
        .pixels()
        .map(|p| if p[0] as f64 > mean { '1' } else { '0' })
        .collect()
}

/// Number of differing bits between two fingerprints.
///
/// `None` when either side is not a 64-bit hash (e.g. a failed, empty one).
pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    let valid = |h: &str| h.len() == HASH_BITS && h.bytes().all(|c| c == b'0' || c == b'1');
    if !valid(a) || !valid(b) {
        return None;
    }
    Some(a.bytes().zip(b.bytes()).filter(|(x, y)| x != y).count() as u32)
}

pub struct AverageHasher;

#[async_trait]
impl PerceptualHasher for AverageHasher {
    fn name(&self) -> &'static str {
        "average-hash"
    }

    async fn fingerprint(&self, image: &DynamicImage) -> Result<String> {
        Ok(average_hash(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient() -> DynamicImage {
        let img = RgbImage::from_fn(64, 64, |x, _| {
            let v = (x * 4) as u8;
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_hash_shape() {
        let hash = average_hash(&gradient());
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c == '0' || c == '1'));
    }

    #[test]
    fn test_identical_images_hash_identically() {
        assert_eq!(average_hash(&gradient()), average_hash(&gradient()));
    }

    #[test]
    fn test_gradient_splits_left_and_right() {
        let hash = average_hash(&gradient());
        // Each row: darker left half, brighter right half
        for row in hash.as_bytes().chunks(8) {
            assert_eq!(row, b"00001111");
        }
    }

    #[test]
    fn test_flat_image_is_all_zero() {
        let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([90, 90, 90])));
        assert_eq!(average_hash(&flat), "0".repeat(64));
    }

    #[test]
    fn test_hamming_distance() {
        let a = "0".repeat(64);
        let mut b = "0".repeat(63);
        b.push('1');
        assert_eq!(hamming_distance(&a, &a), Some(0));
        assert_eq!(hamming_distance(&a, &b), Some(1));
        assert_eq!(hamming_distance(&a, ""), None);
    }

    #[test]
    fn test_resized_copy_is_near_duplicate() {
        let original = gradient();
        let smaller = original.resize_exact(32, 32, FilterType::Triangle);
        let distance = hamming_distance(&average_hash(&original), &average_hash(&smaller));
        assert!(distance.unwrap() <= 8);
    }
}
