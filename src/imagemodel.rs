// imagemodel.rs — Image model stage: brightness constant + gradient.
//
// Input : the filter's u8 input image buffer.
// Output: image constant  Buffer<f32>       normalized, low-pass filtered brightness
//         image gradient  Buffer<[f32; 2]>  (∂/∂x, ∂/∂y) of the constant
//
//   u8 ──/255──▶ f32 ──binomial rows──▶ tmp ──binomial cols──▶ constant
//                                                   │
//                             central diff rows/cols┴──▶ gradient
//
// Intensities are normalized to [0, 1] so gamma and max-flow keep the same
// meaning whatever the camera's bit depth is.

use crate::buffer::Buffer;
use crate::convolution::{convolve_cols, convolve_rows, convolve_separable, BINOMIAL_5, CENTRAL_DIFF};
use crate::image::Image;

/// Computes the brightness constant and its gradient from an input image.
pub struct ImageModel {
    input_image: Buffer<u8>,
    image_constant: Buffer<f32>,
    image_gradient: Buffer<[f32; 2]>,
    // Host scratch, sized once at construction.
    normalized: Image<f32>,
    tmp: Image<f32>,
    gx: Image<f32>,
    gy: Image<f32>,
}

impl ImageModel {
    /// Bind to `input_image` and allocate the output buffers.
    pub fn new(input_image: &Buffer<u8>) -> Self {
        let (h, w) = (input_image.height(), input_image.width());
        ImageModel {
            input_image: input_image.clone(),
            image_constant: Buffer::new(h, w),
            image_gradient: Buffer::new(h, w),
            normalized: Image::new(w, h),
            tmp: Image::new(w, h),
            gx: Image::new(w, h),
            gy: Image::new(w, h),
        }
    }

    /// Recompute the image constant and gradient from the current input.
    pub fn compute(&mut self) {
        {
            let input = self.input_image.read();
            for y in 0..input.height() {
                let src = input.row(y);
                for (dst, &v) in self.normalized.row_mut(y).iter_mut().zip(src) {
                    *dst = v as f32 / 255.0;
                }
            }
        }

        let mut constant = self.image_constant.write();
        convolve_separable(&self.normalized, &BINOMIAL_5, &BINOMIAL_5, &mut self.tmp, &mut constant);

        convolve_rows(&constant, &CENTRAL_DIFF, &mut self.gx);
        convolve_cols(&constant, &CENTRAL_DIFF, &mut self.gy);

        let mut gradient = self.image_gradient.write();
        for y in 0..gradient.height() {
            let (gx, gy) = (self.gx.row(y), self.gy.row(y));
            for (x, g) in gradient.row_mut(y).iter_mut().enumerate() {
                *g = [gx[x], gy[x]];
            }
        }
    }

    pub fn input_image(&self) -> &Buffer<u8> {
        &self.input_image
    }

    pub fn image_constant(&self) -> &Buffer<f32> {
        &self.image_constant
    }

    pub fn image_gradient(&self) -> &Buffer<[f32; 2]> {
        &self.image_gradient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_for(img: &Image<u8>) -> ImageModel {
        let input = Buffer::new(img.height(), img.width());
        input.upload(img).unwrap();
        ImageModel::new(&input)
    }

    #[test]
    fn test_outputs_match_input_shape() {
        let model = model_for(&Image::new(7, 3));
        assert_eq!(model.image_constant().height(), 3);
        assert_eq!(model.image_constant().width(), 7);
        assert_eq!(model.image_gradient().channels(), 2);
        assert_eq!(model.image_gradient().width(), 7);
    }

    #[test]
    fn test_constant_image_has_zero_gradient() {
        let mut model = model_for(&Image::filled(6, 6, 100u8));
        model.compute();
        let constant = model.image_constant().to_image();
        let gradient = model.image_gradient().to_image();
        for (x, y, c) in constant.pixels() {
            assert!((c - 100.0 / 255.0).abs() < 1e-6, "constant at ({x},{y}) = {c}");
            assert_eq!(gradient.get(x, y), [0.0, 0.0], "gradient at ({x},{y})");
        }
    }

    #[test]
    fn test_horizontal_ramp_gradient() {
        // value = 10x → normalized slope 10/255 per pixel along x, none along y.
        let mut model = model_for(&Image::from_fn(16, 8, |x, _| (10 * x) as u8));
        model.compute();
        let gradient = model.image_gradient().to_image();
        for y in 0..8 {
            for x in 4..12 {
                let [gx, gy] = gradient.get(x, y);
                assert!((gx - 10.0 / 255.0).abs() < 1e-5, "gx at ({x},{y}) = {gx}");
                assert!(gy.abs() < 1e-6, "gy at ({x},{y}) = {gy}");
            }
        }
    }

    #[test]
    fn test_compute_tracks_input_changes() {
        let input = Buffer::new(4, 4);
        input.upload(&Image::filled(4, 4, 0u8)).unwrap();
        let mut model = ImageModel::new(&input);
        model.compute();
        assert_eq!(model.image_constant().to_image().get(2, 2), 0.0);

        input.upload(&Image::filled(4, 4, 255u8)).unwrap();
        model.compute();
        assert!((model.image_constant().to_image().get(2, 2) - 1.0).abs() < 1e-6);
    }
}
