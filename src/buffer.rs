// buffer.rs — CPU reference storage primitive shared between stages.
//
// A `Buffer<T>` stands in for a block of device memory: a fixed-shape image
// behind a shared handle. Cloning a `Buffer` clones the *handle*, never the
// pixels, so a stage that is "bound" to another stage's output simply holds
// a clone of that handle. Rebinding an input is a handle swap.
//
//   stage A ──owns──▶ Rc<RefCell<Image<T>>> ◀──reads── stage B
//
// The four transfer primitives mirror `gpu::buffer::GpuBuffer`:
//   upload     host image  → buffer
//   download   buffer      → host image
//   copy_from  buffer      → buffer
//   clear      zero-fill
//
// All of them check shapes first and fail with `ShapeMismatch` rather than
// truncating. The shape is fixed at allocation; nothing here reallocates.
//
// `Rc` (not `Arc`) because the filter is driven from a single thread and
// does no internal locking.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::error::{check_shape, Result, Shape};
use crate::image::{Image, Pixel};

/// Shared handle to a fixed-shape block of pixels.
pub struct Buffer<T: Pixel> {
    data: Rc<RefCell<Image<T>>>,
}

impl<T: Pixel> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Buffer { data: Rc::clone(&self.data) }
    }
}

impl<T: Pixel> Buffer<T> {
    /// Allocate a zero-filled buffer of `height` rows by `width` columns.
    pub fn new(height: usize, width: usize) -> Self {
        Buffer {
            data: Rc::new(RefCell::new(Image::new(width, height))),
        }
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.data.borrow().height()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.data.borrow().width()
    }

    #[inline]
    pub fn channels(&self) -> usize {
        T::CHANNELS
    }

    pub fn shape(&self) -> Shape {
        let img = self.data.borrow();
        Shape::new(img.height(), img.width(), T::CHANNELS)
    }

    /// Copy a host image into this buffer.
    pub fn upload(&self, src: &Image<T>) -> Result<()> {
        check_shape(self.shape(), image_shape(src))?;
        self.data.borrow_mut().copy_from(src);
        Ok(())
    }

    /// Copy this buffer into a host image.
    pub fn download(&self, dst: &mut Image<T>) -> Result<()> {
        check_shape(self.shape(), image_shape(dst))?;
        dst.copy_from(&self.data.borrow());
        Ok(())
    }

    /// Device-to-device copy from `src` into this buffer.
    pub fn copy_from(&self, src: &Buffer<T>) -> Result<()> {
        check_shape(self.shape(), src.shape())?;
        if self.ptr_eq(src) {
            return Ok(());
        }
        self.data.borrow_mut().copy_from(&src.data.borrow());
        Ok(())
    }

    /// Zero-fill.
    pub fn clear(&self) {
        self.data.borrow_mut().fill(T::default());
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Buffer<T>) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    /// Read access for stage kernels.
    pub(crate) fn read(&self) -> Ref<'_, Image<T>> {
        self.data.borrow()
    }

    /// Write access for stage kernels.
    pub(crate) fn write(&self) -> RefMut<'_, Image<T>> {
        self.data.borrow_mut()
    }

    /// Download into a freshly allocated host image.
    pub fn to_image(&self) -> Image<T> {
        self.data.borrow().clone()
    }
}

impl<T: Pixel> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer<{}>({})", std::any::type_name::<T>(), self.shape())
    }
}

/// Shape of a host image in the same convention as `Buffer::shape`.
pub(crate) fn image_shape<T: Pixel>(img: &Image<T>) -> Shape {
    Shape::new(img.height(), img.width(), T::CHANNELS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;

    #[test]
    fn test_new_buffer_is_zero() {
        let buf: Buffer<[f32; 2]> = Buffer::new(3, 5);
        assert_eq!(buf.shape(), Shape::new(3, 5, 2));
        for (_, _, v) in buf.to_image().pixels() {
            assert_eq!(v, [0.0, 0.0]);
        }
    }

    #[test]
    fn test_upload_download() {
        let buf: Buffer<u8> = Buffer::new(2, 3);
        let src = Image::from_vec(3, 2, vec![1u8, 2, 3, 4, 5, 6]);
        buf.upload(&src).unwrap();
        let mut dst = Image::new(3, 2);
        buf.download(&mut dst).unwrap();
        assert_eq!(dst.as_slice(), src.as_slice());
    }

    #[test]
    fn test_upload_wrong_shape_fails() {
        let buf: Buffer<u8> = Buffer::new(4, 4);
        let err = buf.upload(&Image::new(5, 4)).unwrap_err();
        match err {
            FlowError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, Shape::new(4, 4, 1));
                assert_eq!(actual, Shape::new(4, 5, 1));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_download_wrong_shape_fails() {
        let buf: Buffer<f32> = Buffer::new(4, 4);
        let mut dst = Image::new(4, 3);
        assert!(matches!(
            buf.download(&mut dst),
            Err(FlowError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_clone_shares_storage() {
        let a: Buffer<f32> = Buffer::new(2, 2);
        let b = a.clone();
        a.upload(&Image::filled(2, 2, 0.25)).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(b.to_image().get(1, 1), 0.25);
    }

    #[test]
    fn test_copy_from_duplicates_data() {
        let a: Buffer<f32> = Buffer::new(2, 2);
        let b: Buffer<f32> = Buffer::new(2, 2);
        a.upload(&Image::filled(2, 2, 0.5)).unwrap();
        b.copy_from(&a).unwrap();
        assert!(!a.ptr_eq(&b));
        a.clear();
        assert_eq!(b.to_image().get(0, 0), 0.5);
        assert_eq!(a.to_image().get(0, 0), 0.0);
    }

    #[test]
    fn test_copy_from_self_is_noop() {
        let a: Buffer<f32> = Buffer::new(2, 2);
        a.upload(&Image::filled(2, 2, 0.5)).unwrap();
        a.copy_from(&a.clone()).unwrap();
        assert_eq!(a.to_image().get(1, 0), 0.5);
    }

    #[test]
    fn test_copy_from_wrong_shape_fails() {
        let a: Buffer<f32> = Buffer::new(2, 2);
        let b: Buffer<f32> = Buffer::new(3, 2);
        assert!(matches!(
            b.copy_from(&a),
            Err(FlowError::ShapeMismatch { .. })
        ));
    }
}
