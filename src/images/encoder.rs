//! Size-tiered JPEG re-encoding for inline image storage.
//!
//! Uploads are stored inside their database row, so every payload has to
//! fit under a fixed byte budget. Small inputs pass through untouched;
//! larger ones are downscaled and re-encoded as JPEG with a resolution cap
//! and quality chosen from step tables keyed by the input size. If the
//! first attempt is still over budget one harsher pass is made before the
//! upload is rejected.

use std::io::Cursor;

use anyhow::bail;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};

/// MIME type of every re-encoded payload.
pub const JPEG_MIME: &str = "image/jpeg";

/// Errors surfaced to the uploader.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The bytes are empty or not an image we can read.
    #[error("Unsupported or corrupt image: {0}")]
    Decode(String),

    /// Even the harshest pass could not get under the limit.
    #[error("Image too large, please use a smaller file ({size} bytes, limit {limit})")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// The JPEG encoder itself failed.
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// One step of the size table: inputs strictly larger than `above_bytes`
/// get at most `max_dimension` pixels on their longer side and `quality`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SizeTier {
    pub above_bytes: u64,
    pub max_dimension: u32,
    pub quality: f32,
}

/// Thresholds and step tables driving [`encode_for_inline`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EncoderPolicy {
    /// Inputs at or below this size are stored unchanged.
    #[serde(default = "default_pass_through_limit")]
    pub pass_through_limit: u64,

    /// Hard cap on the stored payload.
    #[serde(default = "default_inline_limit")]
    pub inline_limit: u64,

    #[serde(default = "default_max_dimension")]
    pub default_max_dimension: u32,

    #[serde(default = "default_quality")]
    pub default_quality: f32,

    /// Ordered by `above_bytes`, ascending.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<SizeTier>,

    /// Quality used by the second, harsher pass.
    #[serde(default = "default_retry_quality")]
    pub retry_quality: f32,
}

fn default_pass_through_limit() -> u64 {
    500_000
}

// Leaves room for the ~4/3 base64 inflation under a 1 MB document budget.
fn default_inline_limit() -> u64 {
    750_000
}

fn default_max_dimension() -> u32 {
    1280
}

fn default_quality() -> f32 {
    0.6
}

fn default_tiers() -> Vec<SizeTier> {
    vec![
        SizeTier {
            above_bytes: 2_000_000,
            max_dimension: 1024,
            quality: 0.4,
        },
        SizeTier {
            above_bytes: 5_000_000,
            max_dimension: 800,
            quality: 0.3,
        },
        SizeTier {
            above_bytes: 10_000_000,
            max_dimension: 640,
            quality: 0.2,
        },
    ]
}

fn default_retry_quality() -> f32 {
    0.1
}

impl Default for EncoderPolicy {
    fn default() -> Self {
        Self {
            pass_through_limit: default_pass_through_limit(),
            inline_limit: default_inline_limit(),
            default_max_dimension: default_max_dimension(),
            default_quality: default_quality(),
            tiers: default_tiers(),
            retry_quality: default_retry_quality(),
        }
    }
}

/// Resolution cap and quality chosen for a given input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedTier {
    pub max_dimension: u32,
    pub quality: f32,
    /// True when the harsher second pass produced the output.
    pub retried: bool,
}

impl EncoderPolicy {
    /// Pick the resolution cap and quality for an input of `size` bytes.
    pub fn tier_for(&self, size: u64) -> AppliedTier {
        let (max_dimension, quality) = self
            .tiers
            .iter()
            .filter(|tier| size > tier.above_bytes)
            .last()
            .map(|tier| (tier.max_dimension, tier.quality))
            .unwrap_or((self.default_max_dimension, self.default_quality));

        AppliedTier {
            max_dimension,
            quality,
            retried: false,
        }
    }

    /// Settings for the second pass: the smallest cap in the table and the
    /// retry quality.
    pub fn retry_tier(&self) -> AppliedTier {
        let max_dimension = self
            .tiers
            .iter()
            .map(|tier| tier.max_dimension)
            .chain(std::iter::once(self.default_max_dimension))
            .min()
            .unwrap_or(self.default_max_dimension);

        AppliedTier {
            max_dimension,
            quality: self.retry_quality,
            retried: true,
        }
    }

    /// Reject tables that would let a larger input get a bigger cap or a
    /// higher quality than a smaller one.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inline_limit == 0 {
            bail!("encoder.inline_limit must be positive");
        }
        if self.pass_through_limit > self.inline_limit {
            bail!(
                "encoder.pass_through_limit ({}) exceeds encoder.inline_limit ({})",
                self.pass_through_limit,
                self.inline_limit
            );
        }
        if self.default_max_dimension == 0 {
            bail!("encoder.default_max_dimension must be positive");
        }
        check_quality("encoder.default_quality", self.default_quality)?;
        check_quality("encoder.retry_quality", self.retry_quality)?;

        let mut prev_bytes: Option<u64> = None;
        let mut prev_dimension = self.default_max_dimension;
        let mut prev_quality = self.default_quality;

        for (i, tier) in self.tiers.iter().enumerate() {
            if prev_bytes.is_some_and(|prev| tier.above_bytes <= prev) {
                bail!("encoder.tiers[{}].above_bytes must be strictly increasing", i);
            }
            if tier.max_dimension == 0 || tier.max_dimension > prev_dimension {
                bail!(
                    "encoder.tiers[{}].max_dimension ({}) must be positive and not exceed {}",
                    i,
                    tier.max_dimension,
                    prev_dimension
                );
            }
            check_quality(&format!("encoder.tiers[{}].quality", i), tier.quality)?;
            if tier.quality > prev_quality {
                bail!(
                    "encoder.tiers[{}].quality ({}) must not exceed {}",
                    i,
                    tier.quality,
                    prev_quality
                );
            }

            prev_bytes = Some(tier.above_bytes);
            prev_dimension = tier.max_dimension;
            prev_quality = tier.quality;
        }

        if self.retry_quality > prev_quality {
            bail!(
                "encoder.retry_quality ({}) must not exceed the lowest tier quality ({})",
                self.retry_quality,
                prev_quality
            );
        }

        Ok(())
    }
}

fn check_quality(name: &str, quality: f32) -> anyhow::Result<()> {
    if !(quality > 0.0 && quality <= 1.0) {
        bail!("{} must be in (0, 1], got {}", name, quality);
    }
    Ok(())
}

/// Result of [`encode_for_inline`].
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// `None` when the input passed through unchanged.
    pub tier: Option<AppliedTier>,
}

impl EncodedImage {
    pub fn reencoded(&self) -> bool {
        self.tier.is_some()
    }
}

/// Produce a payload no larger than `policy.inline_limit`.
///
/// Inputs at or below the pass-through limit are returned byte for byte
/// (their header is still sniffed for MIME type and dimensions). Anything
/// larger is decoded, capped, flattened to RGB and re-encoded as JPEG.
/// Animated inputs keep only their first frame.
pub fn encode_for_inline(data: &[u8], policy: &EncoderPolicy) -> Result<EncodedImage, EncodeError> {
    let size = data.len() as u64;
    if size == 0 {
        return Err(EncodeError::Decode("empty file".to_string()));
    }

    if size <= policy.pass_through_limit {
        return pass_through(data);
    }

    let img = image::load_from_memory(data).map_err(|e| EncodeError::Decode(e.to_string()))?;

    let tier = policy.tier_for(size);
    let first = reencode(&img, tier)?;
    tracing::debug!(
        input_bytes = size,
        output_bytes = first.bytes.len(),
        max_dimension = tier.max_dimension,
        quality = tier.quality,
        "Re-encoded image"
    );
    if first.bytes.len() as u64 <= policy.inline_limit {
        return Ok(first);
    }

    let retry = policy.retry_tier();
    let second = reencode(&img, retry)?;
    let output = second.bytes.len() as u64;
    tracing::debug!(
        first_pass_bytes = first.bytes.len(),
        output_bytes = output,
        max_dimension = retry.max_dimension,
        quality = retry.quality,
        "Retried with harsher settings"
    );

    if output > policy.inline_limit {
        return Err(EncodeError::PayloadTooLarge {
            size: output,
            limit: policy.inline_limit,
        });
    }

    Ok(second)
}

fn pass_through(data: &[u8]) -> Result<EncodedImage, EncodeError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| EncodeError::Decode(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| EncodeError::Decode("unrecognised image format".to_string()))?;

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| EncodeError::Decode(e.to_string()))?;

    Ok(EncodedImage {
        bytes: data.to_vec(),
        mime_type: format.to_mime_type().to_string(),
        width,
        height,
        tier: None,
    })
}

fn reencode(img: &DynamicImage, tier: AppliedTier) -> Result<EncodedImage, EncodeError> {
    let (width, height) = fit_within(img.width(), img.height(), tier.max_dimension);

    let rgb = if (width, height) == (img.width(), img.height()) {
        img.to_rgb8()
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3).to_rgb8()
    };

    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let encoder = JpegEncoder::new_with_quality(&mut cursor, jpeg_quality(tier.quality));
        rgb.write_with_encoder(encoder)
            .map_err(|e| EncodeError::Encode(e.to_string()))?;
    }

    Ok(EncodedImage {
        bytes: buffer,
        mime_type: JPEG_MIME.to_string(),
        width,
        height,
        tier: Some(tier),
    })
}

/// Scale `(width, height)` so the longer side is at most `max_dimension`,
/// keeping the aspect ratio. The shorter side is rounded and never zero.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }

    let scale = |side: u32, longer: u32| -> u32 {
        let scaled = (side as f64 * max_dimension as f64 / longer as f64).round() as u32;
        scaled.max(1)
    };

    if width > height {
        (max_dimension, scale(height, width))
    } else {
        (scale(width, height), max_dimension)
    }
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn noise_image(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
    }

    fn encode_jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        img.write_with_encoder(encoder).unwrap();
        buffer
    }

    fn encode_png(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_empty_input_is_decode_error() {
        let err = encode_for_inline(&[], &EncoderPolicy::default()).unwrap_err();
        assert!(matches!(err, EncodeError::Decode(_)));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let small = vec![0x42u8; 1_000];
        let err = encode_for_inline(&small, &EncoderPolicy::default()).unwrap_err();
        assert!(matches!(err, EncodeError::Decode(_)));

        let large = vec![0x42u8; 600_000];
        let err = encode_for_inline(&large, &EncoderPolicy::default()).unwrap_err();
        assert!(matches!(err, EncodeError::Decode(_)));
    }

    #[test]
    fn test_small_input_passes_through_unchanged() {
        let img = RgbImage::from_pixel(40, 30, Rgb([10, 200, 30]));
        let data = encode_png(&DynamicImage::ImageRgb8(img));
        assert!(data.len() as u64 <= 500_000);

        let out = encode_for_inline(&data, &EncoderPolicy::default()).unwrap();
        assert_eq!(out.bytes, data);
        assert_eq!(out.mime_type, "image/png");
        assert_eq!((out.width, out.height), (40, 30));
        assert!(!out.reencoded());
    }

    #[test]
    fn test_large_input_reencoded_under_cap() {
        let mut rng = StdRng::seed_from_u64(1);
        let img = RgbImage::from_fn(1600, 1200, |x, y| {
            let base = ((x + y) % 200) as u8;
            Rgb([
                base + rng.gen_range(0..16),
                base / 2 + rng.gen_range(0..16),
                200 - base + rng.gen_range(0..16),
            ])
        });
        let data = encode_png(&DynamicImage::ImageRgb8(img));
        assert!(data.len() as u64 > 500_000);

        let policy = EncoderPolicy::default();
        let out = encode_for_inline(&data, &policy).unwrap();
        assert!(out.reencoded());
        assert_eq!(out.mime_type, JPEG_MIME);
        assert!(out.bytes.len() as u64 <= policy.inline_limit);
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_alpha_is_dropped() {
        let mut rng = StdRng::seed_from_u64(7);
        let img = RgbaImage::from_fn(700, 500, |_, _| {
            Rgba([rng.gen(), rng.gen(), rng.gen(), rng.gen()])
        });
        let data = encode_png(&DynamicImage::ImageRgba8(img));
        assert!(data.len() as u64 > 500_000);

        let out = encode_for_inline(&data, &EncoderPolicy::default()).unwrap();
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn test_fit_within_keeps_small_images() {
        assert_eq!(fit_within(800, 600, 1280), (800, 600));
        assert_eq!(fit_within(1280, 1280, 1280), (1280, 1280));
    }

    #[test]
    fn test_fit_within_landscape_and_portrait() {
        assert_eq!(fit_within(4000, 3000, 640), (640, 480));
        assert_eq!(fit_within(3000, 4000, 640), (480, 640));
        assert_eq!(fit_within(2000, 2000, 800), (800, 800));
        // 682.67 rounds up
        assert_eq!(fit_within(1920, 1280, 1024), (1024, 683));
    }

    #[test]
    fn test_fit_within_never_zero() {
        assert_eq!(fit_within(10_000, 1, 640), (640, 1));
    }

    #[test]
    fn test_fit_within_preserves_aspect_ratio() {
        for (w, h) in [(4032, 3024), (1000, 3333), (5000, 17), (1281, 1279)] {
            for cap in [1280, 1024, 800, 640] {
                let (fw, fh) = fit_within(w, h, cap);
                assert!(fw <= cap && fh <= cap);
                let expected_h = fw as f64 * h as f64 / w as f64;
                assert!(
                    (fh as f64 - expected_h).abs() <= 1.0,
                    "{}x{} -> {}x{} at cap {}",
                    w,
                    h,
                    fw,
                    fh,
                    cap
                );
            }
        }
    }

    #[test]
    fn test_tier_table_values() {
        let policy = EncoderPolicy::default();

        let t = policy.tier_for(600_000);
        assert_eq!((t.max_dimension, t.quality), (1280, 0.6));

        let t = policy.tier_for(2_000_000);
        assert_eq!((t.max_dimension, t.quality), (1280, 0.6));

        let t = policy.tier_for(2_000_001);
        assert_eq!((t.max_dimension, t.quality), (1024, 0.4));

        let t = policy.tier_for(5_000_001);
        assert_eq!((t.max_dimension, t.quality), (800, 0.3));

        let t = policy.tier_for(12_000_000);
        assert_eq!((t.max_dimension, t.quality), (640, 0.2));
    }

    #[test]
    fn test_tier_tables_are_non_increasing() {
        let policy = EncoderPolicy::default();
        let mut prev = policy.tier_for(0);

        for size in (0..=20_000_000u64).step_by(250_000) {
            let tier = policy.tier_for(size);
            assert!(tier.max_dimension <= prev.max_dimension, "cap grew at {}", size);
            assert!(tier.quality <= prev.quality, "quality grew at {}", size);
            prev = tier;
        }
    }

    #[test]
    fn test_retry_tier_is_harshest() {
        let policy = EncoderPolicy::default();
        let retry = policy.retry_tier();
        assert_eq!(retry.max_dimension, 640);
        assert!(retry.quality < 0.2);
        assert!(retry.retried);
    }

    #[test]
    fn test_default_policy_is_valid() {
        EncoderPolicy::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_growing_dimension() {
        let mut policy = EncoderPolicy::default();
        policy.tiers[1].max_dimension = 2000;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_growing_quality() {
        let mut policy = EncoderPolicy::default();
        policy.tiers[2].quality = 0.9;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered_thresholds() {
        let mut policy = EncoderPolicy::default();
        policy.tiers.swap(0, 1);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_pass_through_above_inline_limit() {
        let policy = EncoderPolicy {
            pass_through_limit: 800_000,
            ..EncoderPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_retry_pass_rescues_oversized_first_pass() {
        let img = noise_image(256, 256, 3);
        let data = encode_jpeg(&img, 100);

        let policy = EncoderPolicy {
            pass_through_limit: 100,
            inline_limit: 50_000,
            default_max_dimension: 1280,
            default_quality: 1.0,
            tiers: Vec::new(),
            retry_quality: 0.05,
        };

        let out = encode_for_inline(&data, &policy).unwrap();
        let tier = out.tier.unwrap();
        assert!(tier.retried);
        assert!(out.bytes.len() as u64 <= policy.inline_limit);
    }

    #[test]
    fn test_payload_too_large_when_retry_fails() {
        let img = noise_image(200, 200, 4);
        let data = encode_jpeg(&img, 90);

        // Smaller than the JPEG headers alone
        let policy = EncoderPolicy {
            pass_through_limit: 100,
            inline_limit: 200,
            tiers: Vec::new(),
            ..EncoderPolicy::default()
        };

        let err = encode_for_inline(&data, &policy).unwrap_err();
        match err {
            EncodeError::PayloadTooLarge { size, limit } => {
                assert_eq!(limit, 200);
                assert!(size > limit);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_twelve_megabyte_jpeg_uses_smallest_tier() {
        let img = noise_image(4000, 3000, 12);
        let data = encode_jpeg(&img, 100);
        assert!(data.len() > 10_000_000, "fixture only {} bytes", data.len());

        let policy = EncoderPolicy::default();
        let out = encode_for_inline(&data, &policy).unwrap();
        let tier = out.tier.unwrap();

        assert_eq!(tier.max_dimension, 640);
        assert_eq!(tier.quality, 0.2);
        assert!(!tier.retried);
        assert_eq!((out.width, out.height), (640, 480));
        assert!(out.bytes.len() as u64 <= 750_000);
    }
}
