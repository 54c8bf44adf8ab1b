//! Request-level data model: image names, categories and the policies derived from them.
//!
//! The category is chosen once per request and passed explicitly to every stage that depends on
//! it (resolution selection, detection mode). Nothing here holds ambient state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Similarity threshold applied when a request omits one or sends an unusable value.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Number of bits in the perceptual hash compared in [`DetectionMode::Phash`].
pub const PHASH_BITS: u32 = 64;

/// Opaque identifier naming one remote image (a CDN path segment).
pub type ImageName = String;

/// Check that `name` can be used as a file name inside a staging directory.
///
/// Accepts a single non-empty path segment; rejects separators, NUL and a leading dot (which also
/// covers `.`/`..`). Dot files in a staging directory are partial downloads.
pub fn validate_image_name(name: &str) -> Result<(), Error> {
    let invalid = name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']);
    if invalid { Err(Error::InvalidImageName(name.to_string())) } else { Ok(()) }
}

/// Kind of artwork being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Poster,
    Profile,
    Backdrop,
    Logo,
}

impl ImageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageCategory::Poster => "poster",
            ImageCategory::Profile => "profile",
            ImageCategory::Backdrop => "backdrop",
            ImageCategory::Logo => "logo",
        }
    }

    /// CDN resolution fetched for this category. The only place image size policy lives.
    pub fn resolution(&self) -> Resolution {
        match self {
            ImageCategory::Poster | ImageCategory::Profile => Resolution::Narrow,
            ImageCategory::Backdrop => Resolution::Wide,
            ImageCategory::Logo => Resolution::Default,
        }
    }

    /// Detection mode used by the similarity backend for this category.
    pub fn detection_mode(&self) -> DetectionMode {
        match self {
            ImageCategory::Logo => DetectionMode::Phash,
            _ => DetectionMode::Cnn,
        }
    }
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poster" => Ok(ImageCategory::Poster),
            "profile" => Ok(ImageCategory::Profile),
            "backdrop" => Ok(ImageCategory::Backdrop),
            "logo" => Ok(ImageCategory::Logo),
            other => Err(Error::InvalidInput(format!("unknown image type: {other:?}"))),
        }
    }
}

/// CDN resolution tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Posters and profiles.
    Narrow,
    /// Backdrops.
    Wide,
    /// Everything else.
    Default,
}

impl Resolution {
    /// Path segment understood by the CDN.
    pub fn token(&self) -> &'static str {
        match self {
            Resolution::Narrow => "w342",
            Resolution::Wide => "w780",
            Resolution::Default => "w500",
        }
    }
}

/// How the similarity backend compares images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Binary perceptual hash compared by Hamming distance.
    Phash,
    /// Embedding vectors compared by cosine similarity.
    Cnn,
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Phash => "phash",
            DetectionMode::Cnn => "cnn",
        }
    }

    /// Maximum Hamming distance equivalent to a similarity threshold: `round((1 - t) * 64)`.
    pub fn max_distance(threshold: f64) -> u32 {
        let t = threshold.clamp(0.0, 1.0);
        ((1.0 - t) * f64::from(PHASH_BITS)).round() as u32
    }
}

/// Coerce a client supplied threshold into `[0, 1]`.
///
/// Numbers and numeric strings are accepted. Anything missing, unparsable, non-finite or out of
/// range resolves to `default` instead of failing the request.
pub fn coerce_threshold(raw: Option<&Value>, default: f64) -> f64 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(t) if t.is_finite() && (0.0..=1.0).contains(&t) => t,
        Some(t) => {
            tracing::warn!(threshold = t, default, "similarity threshold out of range, using default");
            default
        }
        None => {
            if raw.is_some_and(|v| !v.is_null()) {
                tracing::warn!(raw = ?raw, default, "invalid similarity threshold, using default");
            }
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_image_name() {
        assert!(validate_image_name("abc123.jpg").is_ok());
        assert!(validate_image_name("kqjL17yufvn9OVLyXYpvtyrFfak.png").is_ok());
        assert!(validate_image_name("").is_err());
        assert!(validate_image_name(".").is_err());
        assert!(validate_image_name("..").is_err());
        assert!(validate_image_name("a/b.jpg").is_err());
        assert!(validate_image_name("a\\b.jpg").is_err());
        assert!(validate_image_name("a\0b").is_err());
    }

    #[test]
    fn test_validate_image_name_rejects_dot_files() {
        assert!(validate_image_name(".x.jpg").is_err());
        assert!(validate_image_name(".a.jpg.part").is_err());
        assert!(validate_image_name("x.jpg.").is_ok());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("poster".parse::<ImageCategory>().unwrap(), ImageCategory::Poster);
        assert_eq!("logo".parse::<ImageCategory>().unwrap(), ImageCategory::Logo);
        assert!("Poster".parse::<ImageCategory>().is_err());
        assert!("".parse::<ImageCategory>().is_err());
    }

    #[test]
    fn test_category_serde() {
        let cat: ImageCategory = serde_json::from_value(json!("backdrop")).unwrap();
        assert_eq!(cat, ImageCategory::Backdrop);
        assert_eq!(serde_json::to_value(ImageCategory::Profile).unwrap(), json!("profile"));
    }

    #[test]
    fn test_resolution_policy() {
        assert_eq!(ImageCategory::Poster.resolution().token(), "w342");
        assert_eq!(ImageCategory::Profile.resolution().token(), "w342");
        assert_eq!(ImageCategory::Backdrop.resolution().token(), "w780");
        assert_eq!(ImageCategory::Logo.resolution().token(), "w500");
    }

    #[test]
    fn test_detection_mode_policy() {
        assert_eq!(ImageCategory::Logo.detection_mode(), DetectionMode::Phash);
        assert_eq!(ImageCategory::Poster.detection_mode(), DetectionMode::Cnn);
        assert_eq!(ImageCategory::Backdrop.detection_mode(), DetectionMode::Cnn);
    }

    #[test]
    fn test_max_distance() {
        assert_eq!(DetectionMode::max_distance(0.85), 10);
        assert_eq!(DetectionMode::max_distance(1.0), 0);
        assert_eq!(DetectionMode::max_distance(0.0), 64);
        assert_eq!(DetectionMode::max_distance(0.9), 6);
    }

    #[test]
    fn test_coerce_threshold_valid() {
        assert_eq!(coerce_threshold(Some(&json!(0.9)), DEFAULT_THRESHOLD), 0.9);
        assert_eq!(coerce_threshold(Some(&json!(1)), DEFAULT_THRESHOLD), 1.0);
        assert_eq!(coerce_threshold(Some(&json!("0.7")), DEFAULT_THRESHOLD), 0.7);
    }

    #[test]
    fn test_coerce_threshold_fallback() {
        assert_eq!(coerce_threshold(None, DEFAULT_THRESHOLD), 0.85);
        assert_eq!(coerce_threshold(Some(&Value::Null), DEFAULT_THRESHOLD), 0.85);
        assert_eq!(coerce_threshold(Some(&json!("very similar")), DEFAULT_THRESHOLD), 0.85);
        assert_eq!(coerce_threshold(Some(&json!([0.5])), DEFAULT_THRESHOLD), 0.85);
        assert_eq!(coerce_threshold(Some(&json!(4.2)), DEFAULT_THRESHOLD), 0.85);
        assert_eq!(coerce_threshold(Some(&json!(-0.1)), DEFAULT_THRESHOLD), 0.85);
    }
}
