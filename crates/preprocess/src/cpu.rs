use crate::config::{DEFAULT_INPUT_SIZE, NORMALIZE_DIVISOR};
use crate::{Preprocessed, PreprocessError};
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::RgbImage;
use ndarray::{Array, IxDyn};

/// Turns encoded image files into classifier input tensors.
///
/// The image is forced to RGB, scaled with Lanczos3 so it covers a
/// `input_size x input_size` box, cropped around its center to exactly that
/// box and normalized channel by channel with [`normalize_channel`].
pub struct ImagePreprocessor {
    input_size: u32,
    resizer: Resizer,
}

impl ImagePreprocessor {
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            resizer: Resizer::new(),
        }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub fn preprocess(&mut self, encoded: &[u8]) -> Result<Preprocessed, PreprocessError> {
        let _s = span!("preprocess");

        let rgb = Self::decode_rgb(encoded)?;

        tracing::trace!(
            width = rgb.width(),
            height = rgb.height(),
            encoded_bytes = encoded.len(),
            "Decoded image"
        );

        let image = self.fit(&rgb)?;
        let tensor = Self::normalize(&image)?;

        Ok(Preprocessed { tensor, image })
    }

    /// Decodes any supported format, dropping alpha and expanding grayscale.
    pub fn decode_rgb(encoded: &[u8]) -> Result<RgbImage, PreprocessError> {
        Ok(image::load_from_memory(encoded)?.to_rgb8())
    }

    /// Resize-to-cover followed by a center crop to the target square.
    pub fn fit(&mut self, rgb: &RgbImage) -> Result<RgbImage, PreprocessError> {
        let _s = span!("fit");

        let src = ImageRef::new(rgb.width(), rgb.height(), rgb.as_raw(), PixelType::U8x3)?;
        let mut dst = Image::new(self.input_size, self.input_size, PixelType::U8x3);

        self.resizer.resize(
            &src,
            &mut dst,
            &ResizeOptions::new()
                .resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3))
                .fit_into_destination(Some((0.5, 0.5))),
        )?;

        // Buffer length always matches the dimensions we allocated above.
        let fitted = RgbImage::from_raw(self.input_size, self.input_size, dst.buffer().to_vec())
            .ok_or(fast_image_resize::ImageBufferError::InvalidBufferSize)?;

        Ok(fitted)
    }

    /// Builds the `[1, H, W, 3]` tensor.
    pub fn normalize(image: &RgbImage) -> Result<Array<f32, IxDyn>, PreprocessError> {
        let _s = span!("normalize");

        let width = image.width() as usize;
        let height = image.height() as usize;

        let data: Vec<f32> = image
            .as_raw()
            .iter()
            .copied()
            .map(normalize_channel)
            .collect();

        Ok(Array::from_shape_vec(IxDyn(&[1, height, width, 3]), data)?)
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

#[inline]
pub fn normalize_channel(value: u8) -> f32 {
    (value as f32 / NORMALIZE_DIVISOR) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn test_output_shape_for_non_square_jpeg() {
        let img = RgbImage::from_pixel(320, 240, Rgb([40, 80, 120]));
        let jpeg = encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);

        let out = ImagePreprocessor::default().preprocess(&jpeg).unwrap();

        assert_eq!(out.tensor.shape(), &[1, 224, 224, 3]);
        assert_eq!(out.image.dimensions(), (224, 224));
    }

    #[test]
    fn test_custom_input_size() {
        let img = RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]));
        let png = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let out = ImagePreprocessor::new(32).preprocess(&png).unwrap();

        assert_eq!(out.tensor.shape(), &[1, 32, 32, 3]);
    }

    #[test]
    fn test_normalization_formula() {
        assert_eq!(normalize_channel(0), -1.0);
        assert_eq!(normalize_channel(127), 0.0);
        assert!((normalize_channel(255) - (255.0 / 127.0 - 1.0)).abs() < f32::EPSILON);
        assert!(normalize_channel(255) > 1.0, "127.0 divisor overshoots 1.0");
    }

    #[test]
    fn test_values_stay_in_range() {
        let mut img = RgbImage::new(50, 50);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 5) as u8, (y * 5) as u8, ((x + y) * 2) as u8]);
        }
        img.put_pixel(0, 0, Rgb([255, 255, 255]));
        let png = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let out = ImagePreprocessor::default().preprocess(&png).unwrap();

        let max = 255.0 / 127.0 - 1.0;
        assert!(
            out.tensor
                .iter()
                .all(|&v| (-1.0..=max + 1e-6).contains(&v)),
            "All values must lie in [-1, {max}]"
        );
    }

    #[test]
    fn test_black_image_normalizes_to_minus_one() {
        let img = RgbImage::from_pixel(224, 224, Rgb([0, 0, 0]));
        let png = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let out = ImagePreprocessor::default().preprocess(&png).unwrap();

        assert!(out.tensor.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_grayscale_is_expanded_to_rgb() {
        let img = GrayImage::from_pixel(30, 30, Luma([200]));
        let png = encode(DynamicImage::ImageLuma8(img), ImageFormat::Png);

        let rgb = ImagePreprocessor::decode_rgb(&png).unwrap();
        assert_eq!(rgb.get_pixel(15, 15), &Rgb([200, 200, 200]));

        let out = ImagePreprocessor::new(30).preprocess(&png).unwrap();
        assert_eq!(out.tensor.shape(), &[1, 30, 30, 3]);
    }

    #[test]
    fn test_alpha_is_discarded() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([10, 20, 30, 0]));
        let png = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);

        let rgb = ImagePreprocessor::decode_rgb(&png).unwrap();

        assert_eq!(rgb.get_pixel(8, 8), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_center_crop_keeps_middle_of_wide_image() {
        // Red | Green | Blue thirds; a square center crop sees only green.
        let mut img = RgbImage::new(300, 100);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = match x {
                0..=99 => Rgb([255, 0, 0]),
                100..=199 => Rgb([0, 255, 0]),
                _ => Rgb([0, 0, 255]),
            };
        }
        let png = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let out = ImagePreprocessor::default().preprocess(&png).unwrap();

        for x in [20, 112, 204] {
            let px = out.image.get_pixel(x, 112);
            assert!(
                px[1] > 200 && px[0] < 60 && px[2] < 60,
                "Pixel at x={x} should be green, got {px:?}"
            );
        }
    }

    #[test]
    fn test_corrupt_bytes_fail_to_decode() {
        let result = ImagePreprocessor::default().preprocess(b"definitely not an image");

        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }
}
