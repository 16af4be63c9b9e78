//! Paired geometric augmentation; image and mask always receive the same transform.

use image::imageops;
use image::{GrayImage, RgbImage};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentConfig {
    /// Probability of a horizontal flip.
    pub flip_horizontal_prob: f32,
    /// Probability of a vertical flip.
    pub flip_vertical_prob: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl AugmentConfig {
    pub fn none() -> Self {
        Self {
            flip_horizontal_prob: 0.0,
            flip_vertical_prob: 0.0,
        }
    }

    pub fn train_default() -> Self {
        Self {
            flip_horizontal_prob: 0.5,
            flip_vertical_prob: 0.5,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.flip_horizontal_prob <= 0.0 && self.flip_vertical_prob <= 0.0
    }

    pub fn apply<R: Rng + ?Sized>(
        &self,
        mut image: RgbImage,
        mut mask: GrayImage,
        rng: &mut R,
    ) -> (RgbImage, GrayImage) {
        if self.flip_horizontal_prob > 0.0 && rng.random::<f32>() < self.flip_horizontal_prob {
            image = imageops::flip_horizontal(&image);
            mask = imageops::flip_horizontal(&mask);
        }
        if self.flip_vertical_prob > 0.0 && rng.random::<f32>() < self.flip_vertical_prob {
            image = imageops::flip_vertical(&image);
            mask = imageops::flip_vertical(&mask);
        }
        (image, mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use rand::SeedableRng;

    #[test]
    fn flips_image_and_mask_together() {
        let mut image = RgbImage::new(4, 2);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        let mut mask = GrayImage::new(4, 2);
        mask.put_pixel(0, 0, Luma([255]));

        let cfg = AugmentConfig {
            flip_horizontal_prob: 1.0,
            flip_vertical_prob: 0.0,
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let (image, mask) = cfg.apply(image, mask, &mut rng);
        assert_eq!(image.get_pixel(3, 0), &Rgb([255, 0, 0]));
        assert_eq!(mask.get_pixel(3, 0), &Luma([255]));
        assert_eq!(mask.get_pixel(0, 0), &Luma([0]));
    }

    #[test]
    fn none_is_identity() {
        assert!(AugmentConfig::none().is_identity());
        assert!(!AugmentConfig::train_default().is_identity());
    }
}
