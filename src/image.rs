// image.rs — Runtime-sized host image container, generic over pixel type.
//
// `Image<T>` is the host-side half of every transfer in this crate: frames
// are loaded from an `Image<u8>`, flow fields are downloaded into an
// `Image<[f32; 2]>`. The device-side half is `buffer::Buffer<T>` (CPU
// reference) or `gpu::buffer::GpuBuffer<T>` (wgpu).
//
// PIXEL TYPES
// ───────────
//   u8        1 channel   raw camera intensity
//   f32       1 channel   normalized brightness (image constant, updated image)
//   [f32; 2]  2 channels  gradient (gx, gy) or flow (dx, dy)
//
// Every pixel type is `bytemuck::Pod`, so a row of pixels can be viewed as
// bytes for a GPU upload without any unsafe pointer casts.
//
// Memory layout (stride = 5, width = 4):
//
//   data index:  0  1  2  3 [4]  5  6  7  8 [9] 10 11 12 13 [14]
//   pixel:       ■  ■  ■  ■  ·   ■  ■  ■  ■  ·   ■  ■  ■  ■  ·
//   row:         |--- row 0 ---|  |--- row 1 ---|  |--- row 2 ---|
//
// [4], [9], [14] are padding elements. Uploads compact them away; downloads
// write only the active pixels and leave the padding untouched.

use std::fmt;

/// Trait for types that can serve as pixel values in an `Image` or a
/// device buffer.
pub trait Pixel: Copy + Default + PartialEq + Send + Sync + bytemuck::Pod + fmt::Debug + 'static {
    /// Number of scalar channels packed into one pixel.
    const CHANNELS: usize;
}

impl Pixel for u8 {
    const CHANNELS: usize = 1;
}

impl Pixel for f32 {
    const CHANNELS: usize = 1;
}

impl Pixel for [f32; 2] {
    const CHANNELS: usize = 2;
}

/// A 2D image with runtime dimensions, generic over pixel type `T`.
pub struct Image<T: Pixel> {
    /// Pixel data in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in *elements* (not bytes). stride >= width.
    stride: usize,
}

// Manual impl: a clone is a deep copy of the pixel vector.
impl<T: Pixel> Clone for Image<T> {
    fn clone(&self) -> Self {
        Image {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image. Stride equals width.
    pub fn new(width: usize, height: usize) -> Self {
        Self::new_with_stride(width, height, width)
    }

    /// Create a zero-initialized image with an explicit stride.
    ///
    /// # Panics
    /// Panics if `stride < width`.
    pub fn new_with_stride(width: usize, height: usize, stride: usize) -> Self {
        assert!(
            stride >= width,
            "stride ({stride}) must be >= width ({width})"
        );
        Image {
            data: vec![T::default(); height * stride],
            width,
            height,
            stride,
        }
    }

    /// Create an image where every pixel has the same value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image {
            data: vec![value; width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from an existing pixel vector (no stride padding).
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Create an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image::from_vec(width, height, data)
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of scalar channels per pixel.
    #[inline]
    pub fn channels(&self) -> usize {
        T::CHANNELS
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Get the pixel at (x, y) with coordinates clamped to the image, i.e.
    /// replicate-border addressing. Every stage kernel reads through this.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.stride + x]
    }

    /// Set the pixel at (x, y).
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        self.data[idx] = value;
    }

    /// Borrow a single row (active pixels only, no padding).
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Mutable borrow of a single row.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Iterate over all pixels as `(x, y, value)` tuples, skipping padding.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Set every pixel (padding included) to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Copy every active pixel from `src`.
    ///
    /// # Panics
    /// Panics if the dimensions differ.
    pub fn copy_from(&mut self, src: &Image<T>) {
        assert!(
            self.width == src.width && self.height == src.height,
            "copy_from: {}×{} into {}×{}",
            src.width,
            src.height,
            self.width,
            self.height,
        );
        for y in 0..self.height {
            self.row_mut(y).copy_from_slice(src.row(y));
        }
    }

    /// Access the underlying data as a flat slice (includes stride padding).
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

// Debug formatting — prints the top-left corner, useful for small images in tests.
impl<T: Pixel> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

impl<T: Pixel> std::ops::Index<(usize, usize)> for Image<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        self.bounds_check(x, y);
        &self.data[y * self.stride + x]
    }
}

impl<T: Pixel> std::ops::IndexMut<(usize, usize)> for Image<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let img: Image<[f32; 2]> = Image::new(10, 5);
        assert_eq!(img.width(), 10);
        assert_eq!(img.height(), 5);
        assert_eq!(img.channels(), 2);
        for (_, _, v) in img.pixels() {
            assert_eq!(v, [0.0, 0.0]);
        }
    }

    #[test]
    fn test_channels_per_pixel_type() {
        assert_eq!(Image::<u8>::new(1, 1).channels(), 1);
        assert_eq!(Image::<f32>::new(1, 1).channels(), 1);
        assert_eq!(Image::<[f32; 2]>::new(1, 1).channels(), 2);
    }

    #[test]
    fn test_from_vec_layout() {
        let data: Vec<u8> = (0..12).collect();
        let img = Image::from_vec(4, 3, data);
        assert_eq!(img.get(3, 0), 3);
        assert_eq!(img.get(0, 1), 4);
        assert_eq!(img.row(2), &[8, 9, 10, 11]);
    }

    #[test]
    fn test_from_fn() {
        let img = Image::from_fn(3, 2, |x, y| (x + 10 * y) as f32);
        assert_eq!(img.get(2, 0), 2.0);
        assert_eq!(img.get(1, 1), 11.0);
    }

    #[test]
    fn test_get_clamped_replicates_border() {
        let img = Image::from_vec(2, 2, vec![1.0f32, 2.0, 3.0, 4.0]);
        assert_eq!(img.get_clamped(-3, 0), 1.0);
        assert_eq!(img.get_clamped(5, 0), 2.0);
        assert_eq!(img.get_clamped(0, 9), 3.0);
        assert_eq!(img.get_clamped(7, 7), 4.0);
    }

    #[test]
    fn test_copy_from_skips_padding() {
        let src = Image::from_vec(3, 2, vec![1u8, 2, 3, 4, 5, 6]);
        let mut dst: Image<u8> = Image::new_with_stride(3, 2, 5);
        dst.copy_from(&src);
        assert_eq!(dst.row(0), &[1, 2, 3]);
        assert_eq!(dst.row(1), &[4, 5, 6]);
        assert_eq!(dst.as_slice()[3], 0);
    }

    #[test]
    fn test_index_read_write() {
        let mut img: Image<f32> = Image::new(4, 3);
        img[(1, 2)] = 0.5;
        assert_eq!(img[(1, 2)], 0.5);
        assert_eq!(img.get(1, 2), 0.5);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds() {
        let img: Image<u8> = Image::new(4, 4);
        img.get(4, 0);
    }

    #[test]
    #[should_panic(expected = "stride")]
    fn test_stride_less_than_width() {
        let _img: Image<u8> = Image::new_with_stride(10, 5, 8);
    }
}
