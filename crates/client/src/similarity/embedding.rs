//! Embedding comparison.
//!
//! Each image is reduced to a 16x16 RGB thumbnail, mean-centred and L2-normalised, so the cosine
//! similarity of two embeddings is a plain dot product. Centring makes the score insensitive to
//! overall brightness; flat images fall back to their raw colour.

use image::DynamicImage;
use image::imageops::FilterType;
use imgdup_core::DuplicateRelation;
use rayon::prelude::*;

use super::{LoadedImage, relation_from_pairs};

const THUMBNAIL_SIDE: u32 = 16;
const EPSILON: f32 = 1e-6;

/// Unit-length embedding of `image`.
pub fn embed(image: &DynamicImage) -> Vec<f32> {
    let thumbnail = image
        .resize_exact(THUMBNAIL_SIDE, THUMBNAIL_SIDE, FilterType::Triangle)
        .to_rgb8();
    let raw: Vec<f32> = thumbnail.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();

    let mean = raw.iter().sum::<f32>() / raw.len() as f32;
    let centred: Vec<f32> = raw.iter().map(|v| v - mean).collect();

    normalize(centred)
        .or_else(|| normalize(raw.clone()))
        .unwrap_or_else(|| vec![1.0 / (raw.len() as f32).sqrt(); raw.len()])
}

fn normalize(mut v: Vec<f32>) -> Option<Vec<f32>> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < EPSILON {
        return None;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    Some(v)
}

/// Cosine similarity of two unit-length embeddings.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    f64::from(dot).clamp(-1.0, 1.0)
}

/// Report pairs whose cosine similarity is at least `threshold`.
pub fn detect(images: &[LoadedImage], threshold: f64) -> DuplicateRelation {
    let embeddings: Vec<Vec<f32>> = images.par_iter().map(|img| embed(&img.image)).collect();

    relation_from_pairs(images, |i, j| cosine(&embeddings[i], &embeddings[j]) >= threshold)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::blocks;
    use super::*;
    use image::{Rgb, RgbImage};

    fn flat(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([r, g, b])))
    }

    #[test]
    fn test_embedding_is_unit_length() {
        for image in [DynamicImage::ImageRgb8(blocks(64, 4)), flat(10, 200, 30), flat(0, 0, 0)] {
            let e = embed(&image);
            assert_eq!(e.len(), (THUMBNAIL_SIDE * THUMBNAIL_SIDE * 3) as usize);
            let norm: f32 = e.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
        }
    }

    #[test]
    fn test_self_similarity_is_one() {
        let e = embed(&DynamicImage::ImageRgb8(blocks(64, 9)));
        assert!((cosine(&e, &e) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_rescaled_copy_is_close() {
        let a = embed(&DynamicImage::ImageRgb8(blocks(64, 5)));
        let b = embed(&DynamicImage::ImageRgb8(blocks(128, 5)));
        assert!(cosine(&a, &b) > 0.95);
    }

    #[test]
    fn test_brightness_shift_is_close() {
        let base = blocks(64, 6);
        let brighter = RgbImage::from_fn(64, 64, |x, y| {
            let Rgb([r, g, b]) = *base.get_pixel(x, y);
            Rgb([r / 2 + 60, g / 2 + 60, b / 2 + 60])
        });
        let a = embed(&DynamicImage::ImageRgb8(base));
        let b = embed(&DynamicImage::ImageRgb8(brighter));
        assert!(cosine(&a, &b) > 0.95);
    }

    #[test]
    fn test_unrelated_images_are_far() {
        let a = embed(&DynamicImage::ImageRgb8(blocks(64, 1)));
        let b = embed(&DynamicImage::ImageRgb8(blocks(64, 2)));
        assert!(cosine(&a, &b) < 0.5);
    }

    #[test]
    fn test_detect_threshold_one_keeps_only_exact() {
        let images = vec![
            LoadedImage { name: "a".into(), image: DynamicImage::ImageRgb8(blocks(64, 3)) },
            LoadedImage { name: "b".into(), image: DynamicImage::ImageRgb8(blocks(64, 3)) },
            LoadedImage { name: "c".into(), image: DynamicImage::ImageRgb8(blocks(64, 8)) },
        ];
        let relation = detect(&images, 0.999);
        assert_eq!(relation.get("a").unwrap(), ["b".to_string()]);
        assert!(relation.get("c").unwrap().is_empty());
    }
}
