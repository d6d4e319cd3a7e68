//! Image preprocessing for the recognition model.

use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::Array4;
use tracing::debug;

use crate::error::OcrError;
use crate::models::config::{RecognitionConfig, WidthPolicy};

/// A packed `(1, 3, height, width)` planar tensor ready for inference.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub tensor: Array4<f32>,
    pub width: u32,
    pub height: u32,
}

impl PreparedInput {
    /// Tensor shape as passed to the inference adapter.
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }
}

/// Resizes, normalizes and packs crops for the recognition model.
#[derive(Debug, Clone, Default)]
pub struct RecognitionPreprocessor {
    config: RecognitionConfig,
}

impl RecognitionPreprocessor {
    /// Create a preprocessor from recognition settings.
    pub fn new(config: RecognitionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Prepare a rectified crop for the recognition model.
    ///
    /// The crop is scaled to the model height keeping its aspect ratio; crops
    /// wider than `max_width` are squeezed or cropped per the width policy.
    pub fn prepare(&self, crop: &RgbImage) -> Result<PreparedInput, OcrError> {
        let height = self.config.image_height;
        self.validate()?;

        let (crop_width, crop_height) = crop.dimensions();
        if crop_width == 0 || crop_height == 0 {
            debug!("Empty crop, emitting a blank single-column input");
            return Ok(PreparedInput {
                tensor: Array4::zeros((1, 3, height as usize, 1)),
                width: 1,
                height,
            });
        }

        let resized = if let Some(fixed_width) = self.config.fixed_width {
            resize(crop, fixed_width, height)
        } else {
            let natural = natural_width(crop_width, crop_height, height);
            let max_width = self.config.max_width;

            if natural <= max_width {
                resize(crop, natural, height)
            } else {
                match self.config.width_policy {
                    WidthPolicy::Squeeze => resize(crop, max_width, height),
                    WidthPolicy::Crop => {
                        // Keep the source columns that map onto the first `max_width` outputs
                        let keep = ((max_width as f64 * crop_height as f64 / height as f64).ceil()
                            as u32)
                            .clamp(1, crop_width);
                        let kept = imageops::crop_imm(crop, 0, 0, keep, crop_height).to_image();
                        resize(&kept, max_width, height)
                    }
                }
            }
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        self.normalize_into(&resized, &mut tensor);

        debug!(
            "Prepared crop {}x{} as input {}x{}",
            crop_width, crop_height, width, height
        );

        Ok(PreparedInput {
            tensor,
            width,
            height,
        })
    }

    /// Prepare a crop for a fixed `(height, width)` input, keeping the aspect
    /// ratio and zero-padding the normalized tensor on the right.
    pub fn prepare_padded(
        &self,
        crop: &RgbImage,
        height: u32,
        width: u32,
    ) -> Result<PreparedInput, OcrError> {
        if height == 0 || width == 0 {
            return Err(OcrError::Preprocessing(format!(
                "invalid padded input size {}x{}",
                width, height
            )));
        }

        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        let (crop_width, crop_height) = crop.dimensions();
        if crop_width > 0 && crop_height > 0 {
            let resize_width = natural_width(crop_width, crop_height, height).min(width);
            let resized = resize(crop, resize_width, height);
            self.normalize_into(&resized, &mut tensor);
        }

        Ok(PreparedInput {
            tensor,
            width,
            height,
        })
    }

    fn validate(&self) -> Result<(), OcrError> {
        let config = &self.config;
        if config.image_height == 0 {
            return Err(OcrError::Preprocessing("image_height must be positive".to_string()));
        }
        if config.max_width == 0 {
            return Err(OcrError::Preprocessing("max_width must be positive".to_string()));
        }
        if config.fixed_width == Some(0) {
            return Err(OcrError::Preprocessing("fixed_width must be positive".to_string()));
        }
        Ok(())
    }

    /// Write `image` into the top-left of `tensor` in planar order.
    fn normalize_into(&self, image: &RgbImage, tensor: &mut Array4<f32>) {
        let factor = if self.config.is_scale { 1.0 / 255.0 } else { 1.0 };
        let mean = self.config.mean;
        let scale = self.config.scale;

        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 * factor;
                tensor[[0, c, y as usize, x as usize]] = (value - mean[c]) * scale[c];
            }
        }
    }
}

/// Width after scaling a `width x height` crop to `target_height`.
fn natural_width(width: u32, height: u32, target_height: u32) -> u32 {
    let ratio = width as f64 / height.max(1) as f64;
    ((target_height as f64 * ratio).ceil() as u32).max(1)
}

fn resize(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use pretty_assertions::assert_eq;

    fn preprocessor(config: RecognitionConfig) -> RecognitionPreprocessor {
        RecognitionPreprocessor::new(config)
    }

    #[test]
    fn test_planar_packing() {
        let crop = RgbImage::from_vec(2, 1, vec![10, 20, 30, 40, 50, 60]).unwrap();
        let prepared = preprocessor(RecognitionConfig {
            image_height: 1,
            mean: [0.0; 3],
            scale: [1.0; 3],
            is_scale: false,
            ..Default::default()
        })
        .prepare(&crop)
        .unwrap();

        assert_eq!(prepared.shape(), [1, 3, 1, 2]);
        assert_eq!(
            prepared.tensor.iter().copied().collect::<Vec<_>>(),
            vec![10.0, 40.0, 20.0, 50.0, 30.0, 60.0]
        );
    }

    #[test]
    fn test_default_normalization() {
        let crop = RgbImage::from_fn(64, 32, |x, _| {
            if x < 32 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });
        let prepared = preprocessor(RecognitionConfig::default()).prepare(&crop).unwrap();

        assert_eq!((prepared.width, prepared.height), (64, 32));
        assert_eq!(prepared.tensor[[0, 0, 0, 0]], -1.0);
        assert_eq!(prepared.tensor[[0, 2, 31, 63]], 1.0);
    }

    #[test]
    fn test_aspect_ratio_is_preserved() {
        let crop = RgbImage::new(100, 50);
        let prepared = preprocessor(RecognitionConfig::default()).prepare(&crop).unwrap();

        assert_eq!((prepared.width, prepared.height), (64, 32));
    }

    #[test]
    fn test_wide_crop_is_squeezed() {
        let crop = RgbImage::new(1000, 32);
        let prepared = preprocessor(RecognitionConfig::default()).prepare(&crop).unwrap();

        assert_eq!(prepared.shape(), [1, 3, 32, 320]);
    }

    #[test]
    fn test_wide_crop_is_cropped() {
        // Left 500 columns black, rest white: cropping keeps only black.
        let crop = RgbImage::from_fn(1000, 32, |x, _| {
            if x < 500 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });
        let prepared = preprocessor(RecognitionConfig {
            width_policy: WidthPolicy::Crop,
            ..Default::default()
        })
        .prepare(&crop)
        .unwrap();

        assert_eq!(prepared.shape(), [1, 3, 32, 320]);
        assert!(prepared.tensor.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_fixed_width_ignores_aspect_ratio() {
        let crop = RgbImage::new(50, 10);
        let prepared = preprocessor(RecognitionConfig {
            fixed_width: Some(100),
            ..Default::default()
        })
        .prepare(&crop)
        .unwrap();

        assert_eq!((prepared.width, prepared.height), (100, 32));
    }

    #[test]
    fn test_empty_crop_is_tolerated() {
        let prepared = preprocessor(RecognitionConfig::default())
            .prepare(&RgbImage::new(0, 0))
            .unwrap();

        assert_eq!(prepared.shape(), [1, 3, 32, 1]);
        assert!(prepared.tensor.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_padded_input() {
        let crop = RgbImage::from_pixel(20, 48, Rgb([255, 255, 255]));
        let prepared = preprocessor(RecognitionConfig::default())
            .prepare_padded(&crop, 48, 192)
            .unwrap();

        assert_eq!(prepared.shape(), [1, 3, 48, 192]);
        assert_eq!(prepared.tensor[[0, 1, 10, 19]], 1.0);
        assert_eq!(prepared.tensor[[0, 1, 10, 20]], 0.0);
    }

    #[test]
    fn test_invalid_config() {
        let err = preprocessor(RecognitionConfig {
            image_height: 0,
            ..Default::default()
        })
        .prepare(&RgbImage::new(4, 4))
        .unwrap_err();

        assert!(matches!(err, OcrError::Preprocessing(_)));
    }
}
