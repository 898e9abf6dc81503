use fast_image_resize::images::{Image, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbImage;
use ndarray::Array4;

use crate::error::DecodeError;

/// Channel layout the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ChannelOrder {
    Rgb,
    /// OpenCV decode order.
    Bgr,
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub channel_order: ChannelOrder,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            height: 128,
            width: 128,
            channels: 3,
            channel_order: ChannelOrder::Bgr,
        }
    }
}

#[derive(Debug)]
pub struct Processor {
    pub config: PreprocessConfig,
}

impl Processor {
    /// Create a new instance of the Processor struct
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Shape of the tensor `preprocess` produces, NHWC.
    pub fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, self.config.height, self.config.width, self.config.channels)
    }

    /// Bilinear resize to the configured size. Always returns a fresh buffer,
    /// even when the source already has the target size.
    pub fn resize(&self, img: &RgbImage) -> Result<Image<'static>, DecodeError> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::ZeroSize { width, height });
        }
        let src = ImageRef::new(width, height, img.as_raw(), PixelType::U8x3)
            .map_err(|e| DecodeError::Resize(e.to_string()))?;
        let mut dst = Image::new(
            self.config.width as u32,
            self.config.height as u32,
            PixelType::U8x3,
        );
        let options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        let mut resizer = Resizer::new();
        resizer
            .resize(&src, &mut dst, Some(&options))
            .map_err(|e| DecodeError::Resize(e.to_string()))?;
        Ok(dst)
    }

    /// Resize, then scale to [0, 1], then add the batch axis.
    /// Returns a `(1, height, width, 3)` tensor.
    pub fn preprocess(&self, img: &RgbImage) -> Result<Array4<f32>, DecodeError> {
        let resized = self.resize(img)?;
        let order = self.config.channel_order;
        let values: Vec<f32> = resized
            .buffer()
            .chunks_exact(3)
            .flat_map(|px| match order {
                ChannelOrder::Rgb => [px[0], px[1], px[2]],
                ChannelOrder::Bgr => [px[2], px[1], px[0]],
            })
            .map(|v| v as f32 / 255.0)
            .collect();
        Ok(Array4::from_shape_vec(self.input_shape(), values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn processor(order: ChannelOrder) -> Processor {
        Processor::new(PreprocessConfig {
            channel_order: order,
            ..PreprocessConfig::default()
        })
    }

    #[test]
    fn output_has_batch_shape() {
        let img = RgbImage::from_pixel(300, 40, Rgb([0, 128, 255]));
        let tensor = processor(ChannelOrder::Rgb).preprocess(&img).unwrap();
        assert_eq!(tensor.shape(), &[1, 128, 128, 3]);
    }

    #[test]
    fn values_are_scaled_to_unit_range() {
        let img = RgbImage::from_fn(50, 70, |x, y| Rgb([(x * 5) as u8, (y * 3) as u8, 255]));
        let tensor = processor(ChannelOrder::Rgb).preprocess(&img).unwrap();
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn uniform_color_survives_resize() {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 0, 51]));
        let tensor = processor(ChannelOrder::Rgb).preprocess(&img).unwrap();
        let tol = 1.5 / 255.0;
        assert!((tensor[[0, 64, 64, 0]] - 1.0).abs() < tol);
        assert!(tensor[[0, 64, 64, 1]].abs() < tol);
        assert!((tensor[[0, 64, 64, 2]] - 0.2).abs() < tol);
    }

    #[test]
    fn bgr_order_swaps_red_and_blue() {
        let img = RgbImage::from_pixel(128, 128, Rgb([255, 0, 0]));
        let tensor = processor(ChannelOrder::Bgr).preprocess(&img).unwrap();
        assert!(tensor[[0, 5, 5, 0]] < 0.01);
        assert!(tensor[[0, 5, 5, 2]] > 0.99);
    }

    #[test]
    fn custom_target_size() {
        let p = Processor::new(PreprocessConfig {
            width: 32,
            height: 16,
            ..PreprocessConfig::default()
        });
        let tensor = p.preprocess(&RgbImage::new(5, 5)).unwrap();
        assert_eq!(tensor.shape(), &[1, 16, 32, 3]);
    }
}
