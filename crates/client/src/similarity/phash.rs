//! Perceptual hash comparison.

use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};
use imgdup_core::{DetectionMode, DuplicateRelation};
use rayon::prelude::*;

use super::{LoadedImage, relation_from_pairs};

/// 8x8 DCT mean hash, 64 bits.
pub fn hasher() -> Hasher {
    HasherConfig::new()
        .hash_size(8, 8)
        .hash_alg(HashAlg::Mean)
        .preproc_dct()
        .to_hasher()
}

/// Report pairs whose hashes differ in at most `round((1 - threshold) * 64)` bits.
pub fn detect(images: &[LoadedImage], threshold: f64) -> DuplicateRelation {
    let max_distance = DetectionMode::max_distance(threshold);
    let hasher = hasher();

    let hashes: Vec<ImageHash> = images.par_iter().map(|img| hasher.hash_image(&img.image)).collect();

    relation_from_pairs(images, |i, j| hashes[i].dist(&hashes[j]) <= max_distance)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::blocks;
    use super::*;
    use image::DynamicImage;

    fn loaded(name: &str, size: u32, seed: u64) -> LoadedImage {
        LoadedImage { name: name.to_string(), image: DynamicImage::ImageRgb8(blocks(size, seed)) }
    }

    #[test]
    fn test_hash_is_64_bits() {
        let hash = hasher().hash_image(&loaded("a", 64, 1).image);
        assert_eq!(hash.as_bytes().len(), 8);
    }

    #[test]
    fn test_identical_images_always_match() {
        let images = vec![loaded("a", 64, 7), loaded("b", 64, 7)];
        let relation = detect(&images, 1.0);
        assert_eq!(relation.get("a").unwrap(), ["b".to_string()]);
        assert_eq!(relation.get("b").unwrap(), ["a".to_string()]);
    }

    #[test]
    fn test_unrelated_images_do_not_match() {
        let images = vec![loaded("a", 64, 1), loaded("b", 64, 2), loaded("c", 64, 3)];
        let relation = detect(&images, 0.85);
        for (_, dups) in relation.iter() {
            assert!(dups.is_empty());
        }
    }

    #[test]
    fn test_zero_threshold_matches_everything() {
        let images = vec![loaded("a", 64, 1), loaded("b", 64, 2)];
        let relation = detect(&images, 0.0);
        assert_eq!(relation.get("a").unwrap(), ["b".to_string()]);
    }
}
