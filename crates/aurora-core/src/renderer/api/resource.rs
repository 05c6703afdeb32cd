// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed wrappers over raw GPU resources.
//!
//! Each wrapper owns the handles of one logical resource and knows how to
//! create and destroy it through a [`GraphicsDevice`]. Destruction releases
//! views before the underlying resource and is idempotent; a destroyed
//! wrapper can be re-created, which is how dynamic buffers grow.

use super::buffer::{BufferDescriptor, BufferId, BufferKind, BufferUsageMode, IndexStride};
use super::texture::{
    Extent2D, TextureAspect, TextureDescriptor, TextureFormat, TextureId, TextureUsage,
    TextureViewDescriptor, TextureViewId,
};
use super::vertex::{vertex_stride, VertexAttributes};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;
use std::borrow::Cow;

/// The required size alignment of a uniform buffer, in bytes.
pub const UNIFORM_BUFFER_ALIGNMENT: u64 = 16;

fn destroy_view(device: &dyn GraphicsDevice, view: &mut Option<TextureViewId>, what: &str) {
    if let Some(id) = view.take() {
        if let Err(e) = device.destroy_texture_view(id) {
            log::warn!("Failed to destroy {what} view {id:?}: {e}");
        }
    }
}

fn destroy_texture(device: &dyn GraphicsDevice, texture: &mut Option<TextureId>, what: &str) {
    if let Some(id) = texture.take() {
        if let Err(e) = device.destroy_texture(id) {
            log::warn!("Failed to destroy {what} texture {id:?}: {e}");
        }
    }
}

fn destroy_buffer(device: &dyn GraphicsDevice, buffer: &mut Option<BufferId>, what: &str) {
    if let Some(id) = buffer.take() {
        if let Err(e) = device.destroy_buffer(id) {
            log::warn!("Failed to destroy {what} buffer {id:?}: {e}");
        }
    }
}

// --- Vertex buffer ---

/// An interleaved vertex buffer carrying a fixed attribute set.
#[derive(Debug)]
pub struct VertexBuffer {
    id: Option<BufferId>,
    attributes: VertexAttributes,
    stride: u32,
    count: u32,
    mode: BufferUsageMode,
}

impl VertexBuffer {
    /// Creates a vertex buffer for `count` vertices carrying `attributes`.
    ///
    /// `Immutable` buffers require initial `data`; for other modes the data
    /// is optional. In `GpuWrite` mode the buffer additionally exposes a raw
    /// storage view addressing its contents as 4-byte elements.
    pub fn create(
        device: &dyn GraphicsDevice,
        label: &str,
        attributes: VertexAttributes,
        count: u32,
        mode: BufferUsageMode,
        data: Option<&[u8]>,
    ) -> Result<Self, ResourceError> {
        let stride = vertex_stride(attributes);
        let size = stride as u64 * count as u64;
        if mode == BufferUsageMode::Immutable && data.is_none() {
            return Err(ResourceError::BackendError(format!(
                "immutable vertex buffer '{label}' requires initial data"
            )));
        }

        let descriptor = BufferDescriptor {
            label: Some(Cow::Owned(label.to_string())),
            size,
            mode,
            kind: BufferKind::Vertex,
        };
        let id = match data {
            Some(bytes) => device.create_buffer_with_data(&descriptor, bytes)?,
            None => device.create_buffer(&descriptor)?,
        };
        Ok(Self {
            id: Some(id),
            attributes,
            stride,
            count,
            mode,
        })
    }

    pub fn id(&self) -> Option<BufferId> {
        self.id
    }

    pub fn attributes(&self) -> VertexAttributes {
        self.attributes
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn mode(&self) -> BufferUsageMode {
        self.mode
    }

    pub fn size_bytes(&self) -> u64 {
        self.stride as u64 * self.count as u64
    }

    /// The element count of the raw storage view (4-byte elements).
    /// Only meaningful in `GpuWrite` mode.
    pub fn raw_element_count(&self) -> u64 {
        self.size_bytes() / 4
    }

    pub fn is_created(&self) -> bool {
        self.id.is_some()
    }

    /// Releases the buffer. Safe to call repeatedly.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        destroy_buffer(device, &mut self.id, "vertex");
    }
}

// --- Index buffer ---

/// An index buffer with a `U16` or `U32` element width.
#[derive(Debug)]
pub struct IndexBuffer {
    id: Option<BufferId>,
    stride: IndexStride,
    count: u32,
    mode: BufferUsageMode,
}

impl IndexBuffer {
    /// Creates an index buffer from 32-bit indices.
    ///
    /// The requested stride is widened to `U32` automatically when any index
    /// cannot fit in 16 bits would be addressed, i.e. when `indices.len()`
    /// exceeds `u16::MAX`. The `U16` path narrows the data.
    pub fn create(
        device: &dyn GraphicsDevice,
        label: &str,
        indices: &[u32],
        requested: IndexStride,
        mode: BufferUsageMode,
    ) -> Result<Self, ResourceError> {
        let stride = if indices.len() > u16::MAX as usize {
            IndexStride::U32
        } else {
            requested
        };

        let bytes: Vec<u8> = match stride {
            IndexStride::U32 => bytemuck::cast_slice(indices).to_vec(),
            IndexStride::U16 => indices
                .iter()
                .flat_map(|&i| (i as u16).to_le_bytes())
                .collect(),
        };

        let descriptor = BufferDescriptor {
            label: Some(Cow::Owned(label.to_string())),
            size: bytes.len() as u64,
            mode,
            kind: BufferKind::Index,
        };
        let id = device.create_buffer_with_data(&descriptor, &bytes)?;
        Ok(Self {
            id: Some(id),
            stride,
            count: indices.len() as u32,
            mode,
        })
    }

    /// Creates an uninitialized index buffer, for dynamic use.
    pub fn create_uninitialized(
        device: &dyn GraphicsDevice,
        label: &str,
        count: u32,
        stride: IndexStride,
        mode: BufferUsageMode,
    ) -> Result<Self, ResourceError> {
        let descriptor = BufferDescriptor {
            label: Some(Cow::Owned(label.to_string())),
            size: stride.size_bytes() * count as u64,
            mode,
            kind: BufferKind::Index,
        };
        let id = device.create_buffer(&descriptor)?;
        Ok(Self {
            id: Some(id),
            stride,
            count,
            mode,
        })
    }

    pub fn id(&self) -> Option<BufferId> {
        self.id
    }

    pub fn stride(&self) -> IndexStride {
        self.stride
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn mode(&self) -> BufferUsageMode {
        self.mode
    }

    pub fn is_created(&self) -> bool {
        self.id.is_some()
    }

    /// Releases the buffer. Safe to call repeatedly.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        destroy_buffer(device, &mut self.id, "index");
    }
}

// --- Uniform buffer ---

/// A CPU-updatable constant buffer.
#[derive(Debug)]
pub struct UniformBuffer {
    id: Option<BufferId>,
    size: u64,
}

impl UniformBuffer {
    /// Creates a uniform buffer of `size` bytes.
    ///
    /// ## Returns
    /// * `Err(ResourceError::InvalidSize)` if `size` is not a multiple of 16.
    pub fn create(
        device: &dyn GraphicsDevice,
        label: &str,
        size: u64,
    ) -> Result<Self, ResourceError> {
        if size == 0 || size % UNIFORM_BUFFER_ALIGNMENT != 0 {
            return Err(ResourceError::InvalidSize {
                size,
                alignment: UNIFORM_BUFFER_ALIGNMENT,
            });
        }
        let id = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Owned(label.to_string())),
            size,
            mode: BufferUsageMode::Dynamic,
            kind: BufferKind::Uniform,
        })?;
        Ok(Self { id: Some(id), size })
    }

    /// Replaces the buffer's contents. `data` must fit within the buffer.
    pub fn update(&self, device: &dyn GraphicsDevice, data: &[u8]) -> Result<(), ResourceError> {
        match self.id {
            Some(id) => device.write_buffer(id, 0, data),
            None => Err(ResourceError::InvalidHandle),
        }
    }

    pub fn id(&self) -> Option<BufferId> {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_created(&self) -> bool {
        self.id.is_some()
    }

    /// Releases the buffer. Safe to call repeatedly.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        destroy_buffer(device, &mut self.id, "uniform");
    }
}

// --- Color target ---

/// A texture that can be rendered into and sampled.
#[derive(Debug)]
pub struct ColorTarget {
    texture: Option<TextureId>,
    view: Option<TextureViewId>,
    format: TextureFormat,
    width: u32,
    height: u32,
}

impl ColorTarget {
    /// Creates a renderable, sampleable color target.
    pub fn create(
        device: &dyn GraphicsDevice,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Self, ResourceError> {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Owned(label.to_string())),
            size: Extent2D { width, height },
            mip_level_count: 1,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
        })?;
        let view = device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: Some(Cow::Owned(format!("{label} View"))),
                aspect: TextureAspect::All,
            },
        )?;
        Ok(Self {
            texture: Some(texture),
            view: Some(view),
            format,
            width,
            height,
        })
    }

    /// Adopts an externally created view, typically the swap chain's current
    /// back buffer. The target does not own a texture; destroying it
    /// releases only the view.
    pub fn from_surface(
        view: TextureViewId,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            texture: None,
            view: Some(view),
            format,
            width,
            height,
        }
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn view(&self) -> Option<TextureViewId> {
        self.view
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_created(&self) -> bool {
        self.view.is_some()
    }

    /// Releases the view and, when owned, the texture. Safe to call repeatedly.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        destroy_view(device, &mut self.view, "color target");
        destroy_texture(device, &mut self.texture, "color target");
    }
}

// --- Depth target ---

/// A depth/stencil attachment with an extra view for shader reads of depth.
#[derive(Debug)]
pub struct DepthTarget {
    texture: Option<TextureId>,
    attachment_view: Option<TextureViewId>,
    sampled_view: Option<TextureViewId>,
    width: u32,
    height: u32,
}

impl DepthTarget {
    /// The fixed format of depth targets.
    pub const FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;

    pub fn create(
        device: &dyn GraphicsDevice,
        label: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, ResourceError> {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Owned(label.to_string())),
            size: Extent2D { width, height },
            mip_level_count: 1,
            format: Self::FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
        })?;
        let attachment_view = device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: Some(Cow::Owned(format!("{label} Attachment View"))),
                aspect: TextureAspect::All,
            },
        )?;
        let sampled_view = device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: Some(Cow::Owned(format!("{label} Sampled View"))),
                aspect: TextureAspect::DepthOnly,
            },
        )?;
        Ok(Self {
            texture: Some(texture),
            attachment_view: Some(attachment_view),
            sampled_view: Some(sampled_view),
            width,
            height,
        })
    }

    /// The view bound as a depth/stencil attachment.
    pub fn attachment_view(&self) -> Option<TextureViewId> {
        self.attachment_view
    }

    /// The depth-only view bound for shader reads.
    pub fn sampled_view(&self) -> Option<TextureViewId> {
        self.sampled_view
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_created(&self) -> bool {
        self.texture.is_some()
    }

    /// Releases both views, then the texture. Safe to call repeatedly.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        destroy_view(device, &mut self.sampled_view, "depth target");
        destroy_view(device, &mut self.attachment_view, "depth target");
        destroy_texture(device, &mut self.texture, "depth target");
    }
}

// --- Sampled texture ---

/// A sampled 2D texture created from raw pixel data.
#[derive(Debug)]
pub struct Texture2D {
    texture: Option<TextureId>,
    view: Option<TextureViewId>,
    format: TextureFormat,
    width: u32,
    height: u32,
}

impl Texture2D {
    /// Creates a texture from tightly packed pixels of the given format.
    ///
    /// ## Returns
    /// * `Err(ResourceError::InvalidSize)` if `pixels` does not match the
    ///   extent and format.
    pub fn from_pixels(
        device: &dyn GraphicsDevice,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixels: &[u8],
    ) -> Result<Self, ResourceError> {
        let bytes_per_row = width * format.bytes_per_pixel();
        let expected = bytes_per_row as u64 * height as u64;
        if pixels.len() as u64 != expected {
            return Err(ResourceError::InvalidSize {
                size: pixels.len() as u64,
                alignment: expected,
            });
        }

        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Owned(label.to_string())),
            size: Extent2D { width, height },
            mip_level_count: 1,
            format,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        })?;
        device.write_texture(texture, 0, pixels, bytes_per_row, Extent2D { width, height })?;
        let view = device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: Some(Cow::Owned(format!("{label} View"))),
                aspect: TextureAspect::All,
            },
        )?;
        Ok(Self {
            texture: Some(texture),
            view: Some(view),
            format,
            width,
            height,
        })
    }

    pub fn view(&self) -> Option<TextureViewId> {
        self.view
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_created(&self) -> bool {
        self.texture.is_some()
    }

    /// Releases the view, then the texture. Safe to call repeatedly.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        destroy_view(device, &mut self.view, "texture");
        destroy_texture(device, &mut self.texture, "texture");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::state::SamplerMode;
    use crate::renderer::api::texture::SamplerId;
    use crate::renderer::shader::{ShaderModuleDescriptor, ShaderModuleId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts create/destroy calls and remembers the last buffer sizes.
    #[derive(Default)]
    struct RecordingDevice {
        next_id: AtomicUsize,
        live_buffers: AtomicUsize,
        live_textures: AtomicUsize,
        live_views: AtomicUsize,
        buffer_sizes: Mutex<Vec<u64>>,
    }

    impl GraphicsDevice for RecordingDevice {
        fn create_shader_module(
            &self,
            _descriptor: &ShaderModuleDescriptor,
        ) -> Result<ShaderModuleId, ResourceError> {
            Ok(ShaderModuleId(self.next_id.fetch_add(1, Ordering::Relaxed)))
        }

        fn destroy_shader_module(&self, _id: ShaderModuleId) -> Result<(), ResourceError> {
            Ok(())
        }

        fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
            self.live_buffers.fetch_add(1, Ordering::Relaxed);
            self.buffer_sizes.lock().unwrap().push(descriptor.size);
            Ok(BufferId(self.next_id.fetch_add(1, Ordering::Relaxed)))
        }

        fn create_buffer_with_data(
            &self,
            descriptor: &BufferDescriptor,
            data: &[u8],
        ) -> Result<BufferId, ResourceError> {
            assert_eq!(descriptor.size, data.len() as u64);
            self.create_buffer(descriptor)
        }

        fn destroy_buffer(&self, _id: BufferId) -> Result<(), ResourceError> {
            self.live_buffers.fetch_sub(1, Ordering::Relaxed);
            Ok(())
        }

        fn write_buffer(
            &self,
            _id: BufferId,
            _offset: u64,
            _data: &[u8],
        ) -> Result<(), ResourceError> {
            Ok(())
        }

        fn create_texture(
            &self,
            _descriptor: &TextureDescriptor,
        ) -> Result<TextureId, ResourceError> {
            self.live_textures.fetch_add(1, Ordering::Relaxed);
            Ok(TextureId(self.next_id.fetch_add(1, Ordering::Relaxed)))
        }

        fn destroy_texture(&self, _id: TextureId) -> Result<(), ResourceError> {
            self.live_textures.fetch_sub(1, Ordering::Relaxed);
            Ok(())
        }

        fn write_texture(
            &self,
            _id: TextureId,
            _mip_level: u32,
            _data: &[u8],
            _bytes_per_row: u32,
            _size: Extent2D,
        ) -> Result<(), ResourceError> {
            Ok(())
        }

        fn create_texture_view(
            &self,
            _texture: TextureId,
            _descriptor: &TextureViewDescriptor,
        ) -> Result<TextureViewId, ResourceError> {
            self.live_views.fetch_add(1, Ordering::Relaxed);
            Ok(TextureViewId(self.next_id.fetch_add(1, Ordering::Relaxed)))
        }

        fn destroy_texture_view(&self, _id: TextureViewId) -> Result<(), ResourceError> {
            self.live_views.fetch_sub(1, Ordering::Relaxed);
            Ok(())
        }

        fn get_sampler(&self, _mode: SamplerMode) -> Result<SamplerId, ResourceError> {
            Ok(SamplerId(self.next_id.fetch_add(1, Ordering::Relaxed)))
        }

        fn surface_format(&self) -> Option<TextureFormat> {
            Some(TextureFormat::Bgra8UnormSrgb)
        }

        fn supports_timestamp_queries(&self) -> bool {
            false
        }

        fn vram_allocated_bytes(&self) -> u64 {
            0
        }
    }

    #[test]
    fn vertex_buffer_sizes_from_attributes() {
        let device = RecordingDevice::default();
        let attrs = VertexAttributes::POSITION | VertexAttributes::TEXCOORD0;
        let vb = VertexBuffer::create(&device, "Quad", attrs, 4, BufferUsageMode::Default, None)
            .unwrap();
        assert_eq!(vb.stride(), 20);
        assert_eq!(vb.size_bytes(), 80);
        assert_eq!(device.buffer_sizes.lock().unwrap()[0], 80);
        assert_eq!(vb.raw_element_count(), 20);
    }

    #[test]
    fn immutable_vertex_buffer_accepts_initial_data() {
        let device = RecordingDevice::default();
        let attrs = VertexAttributes::POSITION | VertexAttributes::COLOR;
        let data = vec![0u8; 3 * 28];
        let vb = VertexBuffer::create(
            &device,
            "Tri",
            attrs,
            3,
            BufferUsageMode::Immutable,
            Some(&data),
        )
        .unwrap();
        assert_eq!(vb.stride(), 28);
        assert_eq!(device.buffer_sizes.lock().unwrap()[0], 84);
    }

    #[test]
    fn immutable_vertex_buffer_requires_data() {
        let device = RecordingDevice::default();
        let attrs = VertexAttributes::POSITION;
        let err = VertexBuffer::create(&device, "Bad", attrs, 3, BufferUsageMode::Immutable, None)
            .unwrap_err();
        assert!(matches!(err, ResourceError::BackendError(_)));
    }

    #[test]
    fn vertex_buffer_destroy_is_idempotent() {
        let device = RecordingDevice::default();
        let mut vb = VertexBuffer::create(
            &device,
            "Quad",
            VertexAttributes::POSITION,
            3,
            BufferUsageMode::Default,
            None,
        )
        .unwrap();
        assert!(vb.is_created());
        vb.destroy(&device);
        assert!(!vb.is_created());
        vb.destroy(&device);
        assert_eq!(device.live_buffers.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn index_buffer_keeps_requested_u16_stride() {
        let device = RecordingDevice::default();
        let indices = [0u32, 1, 2];
        let ib = IndexBuffer::create(
            &device,
            "Tri",
            &indices,
            IndexStride::U16,
            BufferUsageMode::Immutable,
        )
        .unwrap();
        assert_eq!(ib.stride(), IndexStride::U16);
        assert_eq!(device.buffer_sizes.lock().unwrap()[0], 6);
    }

    #[test]
    fn index_buffer_widens_when_count_exceeds_u16() {
        let device = RecordingDevice::default();
        let indices: Vec<u32> = (0..=u16::MAX as u32 + 1).collect();
        let ib = IndexBuffer::create(
            &device,
            "Big",
            &indices,
            IndexStride::U16,
            BufferUsageMode::Immutable,
        )
        .unwrap();
        assert_eq!(ib.stride(), IndexStride::U32);
        assert_eq!(
            device.buffer_sizes.lock().unwrap()[0],
            indices.len() as u64 * 4
        );
    }

    #[test]
    fn uniform_buffer_enforces_alignment() {
        let device = RecordingDevice::default();
        let err = UniformBuffer::create(&device, "Bad", 20).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::InvalidSize {
                size: 20,
                alignment: 16
            }
        ));
        assert!(UniformBuffer::create(&device, "Good", 64).is_ok());
        assert!(UniformBuffer::create(&device, "Empty", 0).is_err());
    }

    #[test]
    fn depth_target_releases_views_before_texture() {
        let device = RecordingDevice::default();
        let mut target = DepthTarget::create(&device, "Depth", 640, 480).unwrap();
        assert_eq!(device.live_views.load(Ordering::Relaxed), 2);
        target.destroy(&device);
        target.destroy(&device);
        assert_eq!(device.live_views.load(Ordering::Relaxed), 0);
        assert_eq!(device.live_textures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn surface_color_target_owns_no_texture() {
        let device = RecordingDevice::default();
        let view = device
            .create_texture_view(TextureId(0), &TextureViewDescriptor::default())
            .unwrap();
        let mut target =
            ColorTarget::from_surface(view, TextureFormat::Bgra8UnormSrgb, 800, 600);
        assert!(target.is_created());
        assert!(target.texture().is_none());
        target.destroy(&device);
        assert_eq!(device.live_views.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn texture2d_validates_pixel_length() {
        let device = RecordingDevice::default();
        let err = Texture2D::from_pixels(
            &device,
            "Bad",
            2,
            2,
            TextureFormat::Rgba8Unorm,
            &[0u8; 15],
        )
        .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidSize { .. }));

        let tex = Texture2D::from_pixels(
            &device,
            "Good",
            2,
            2,
            TextureFormat::Rgba8Unorm,
            &[255u8; 16],
        )
        .unwrap();
        assert!(tex.is_created());
    }
}
