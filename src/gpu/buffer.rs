// gpu/buffer.rs — Device-resident counterpart of `buffer::Buffer`.
//
// A `GpuBuffer<T>` is a storage buffer holding `height * width` elements of
// `T`, tightly packed row-major. Like the CPU buffer, cloning clones the
// handle (`Arc<wgpu::Buffer>`), so binding a stage to another stage's output
// is a handle clone and rebinding is a handle swap.
//
// SIZE AND PADDING
// ────────────────
// wgpu requires copy and write sizes to be multiples of 4 bytes. `u8`
// images are therefore rounded up to a whole number of u32 words; the pad
// bytes are zero and never read by the shaders.
//
// TRANSFERS
// ─────────
//   upload     queue.write_buffer; strided host rows are compacted first
//   download   copy to a MAP_READ staging buffer, map, poll, unpack
//   copy_from  copy_buffer_to_buffer (also available as an encoder step)
//   clear      clear_buffer         (also available as an encoder step)
//
// `download` blocks until the GPU is idle. Use it for outputs and tests,
// not inside a frame.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::image_shape;
use crate::error::{check_shape, Result, Shape};
use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::{Image, Pixel};

/// Round `value` up to the next multiple of `alignment`.
pub(crate) fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Shared handle to a fixed-shape storage buffer on the GPU.
pub struct GpuBuffer<T: Pixel> {
    buffer: Arc<wgpu::Buffer>,
    height: usize,
    width: usize,
    _marker: PhantomData<T>,
}

impl<T: Pixel> Clone for GpuBuffer<T> {
    fn clone(&self) -> Self {
        GpuBuffer {
            buffer: Arc::clone(&self.buffer),
            height: self.height,
            width: self.width,
            _marker: PhantomData,
        }
    }
}

impl<T: Pixel> GpuBuffer<T> {
    /// Allocate a zero-initialized buffer of `height` rows by `width` columns.
    pub fn new(gpu: &GpuDevice, height: usize, width: usize, label: &str) -> Self {
        let size = align_to((height * width * std::mem::size_of::<T>()) as u64, wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        GpuBuffer {
            buffer: Arc::new(buffer),
            height,
            width,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn channels(&self) -> usize {
        T::CHANNELS
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.height, self.width, T::CHANNELS)
    }

    /// Unpadded payload size in bytes.
    fn byte_len(&self) -> usize {
        self.height * self.width * std::mem::size_of::<T>()
    }

    /// Allocated size in bytes (payload rounded up to 4).
    pub fn size(&self) -> u64 {
        self.buffer.size()
    }

    /// Copy a host image into this buffer.
    ///
    /// The write is staged on the queue and lands before the next submit.
    pub fn upload(&self, gpu: &GpuDevice, src: &Image<T>) -> Result<()> {
        check_shape(self.shape(), image_shape(src))?;
        let mut bytes = Vec::with_capacity(self.size() as usize);
        for y in 0..src.height() {
            bytes.extend_from_slice(bytemuck::cast_slice(src.row(y)));
        }
        bytes.resize(self.size() as usize, 0);
        gpu.queue.write_buffer(&self.buffer, 0, &bytes);
        Ok(())
    }

    /// Copy this buffer into a host image. Blocks until the GPU is idle.
    pub fn download(&self, gpu: &GpuDevice, dst: &mut Image<T>) -> Result<()> {
        check_shape(self.shape(), image_shape(dst))?;

        let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GpuBuffer::download"),
            size: self.size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some("GpuBuffer::download") },
        );
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, self.size());
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            // The receiver only disappears if this function already returned.
            let _ = tx.send(r);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| GpuError::MapCallbackDropped)?
            .map_err(GpuError::from)?;

        {
            let mapped = slice.get_mapped_range();
            // The mapped range is only guaranteed byte-aligned for our
            // purposes; collect into an owned, properly aligned Vec<T>.
            let pixels: Vec<T> = bytemuck::pod_collect_to_vec(&mapped[..self.byte_len()]);
            for (y, row) in pixels.chunks_exact(self.width).enumerate() {
                dst.row_mut(y).copy_from_slice(row);
            }
        }
        staging.unmap();
        Ok(())
    }

    /// Download into a freshly allocated host image.
    pub fn to_image(&self, gpu: &GpuDevice) -> Result<Image<T>> {
        let mut img = Image::new(self.width, self.height);
        self.download(gpu, &mut img)?;
        Ok(img)
    }

    /// Device-to-device copy from `src` into this buffer, submitted immediately.
    pub fn copy_from(&self, gpu: &GpuDevice, src: &GpuBuffer<T>) -> Result<()> {
        let mut encoder = gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some("GpuBuffer::copy_from") },
        );
        self.encode_copy_from(&mut encoder, src)?;
        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Record a copy from `src` into `encoder`. Copying a buffer onto
    /// itself records nothing.
    pub fn encode_copy_from(&self, encoder: &mut wgpu::CommandEncoder, src: &GpuBuffer<T>) -> Result<()> {
        check_shape(self.shape(), src.shape())?;
        if !self.ptr_eq(src) {
            encoder.copy_buffer_to_buffer(&src.buffer, 0, &self.buffer, 0, self.size());
        }
        Ok(())
    }

    /// Zero-fill, submitted immediately.
    pub fn clear(&self, gpu: &GpuDevice) {
        let mut encoder = gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some("GpuBuffer::clear") },
        );
        self.encode_clear(&mut encoder);
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Record a zero-fill into `encoder`.
    pub fn encode_clear(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.buffer, 0, None);
    }

    /// Whether both handles refer to the same device buffer.
    pub fn ptr_eq(&self, other: &GpuBuffer<T>) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// The whole buffer as a bind group resource.
    pub(crate) fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

impl<T: Pixel> fmt::Debug for GpuBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuBuffer<{}>({}, {} bytes)", std::any::type_name::<T>(), self.shape(), self.size())
    }
}
