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

//! The device-side resource registries.
//!
//! [`WgpuDevice`] is a cheap clonable handle. Every resource handed out
//! through the abstract device interface is an opaque id into one of the
//! registries below; the frame context resolves ids back to the raw WGPU
//! objects when it records commands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use wgpu::util::DeviceExt;

use aurora_core::renderer::api::buffer::{BufferDescriptor, BufferId};
use aurora_core::renderer::api::state::SamplerMode;
use aurora_core::renderer::api::texture::{
    Extent2D, SamplerId, TextureDescriptor, TextureFormat, TextureId, TextureViewDescriptor,
    TextureViewId,
};
use aurora_core::renderer::shader::{ShaderModuleDescriptor, ShaderModuleId};
use aurora_core::renderer::{GraphicsDevice, ResourceError, ShaderError};

use super::context::WgpuSurfaceContext;
use super::conversions::{buffer_usages, from_wgpu_texture_format, IntoWgpu};

/// A registered buffer together with the byte count it contributes to the
/// VRAM estimate.
#[derive(Debug)]
struct TrackedBuffer {
    raw: Arc<wgpu::Buffer>,
    bytes: u64,
}

#[derive(Debug)]
struct TrackedTexture {
    raw: Arc<wgpu::Texture>,
    bytes: u64,
}

/// Shared state behind every [`WgpuDevice`] clone.
#[derive(Debug)]
struct DeviceState {
    context: Arc<Mutex<WgpuSurfaceContext>>,

    shader_modules: Mutex<HashMap<ShaderModuleId, Arc<wgpu::ShaderModule>>>,
    buffers: Mutex<HashMap<BufferId, TrackedBuffer>>,
    textures: Mutex<HashMap<TextureId, TrackedTexture>>,
    texture_views: Mutex<HashMap<TextureViewId, Arc<wgpu::TextureView>>>,
    samplers: Mutex<HashMap<SamplerId, Arc<wgpu::Sampler>>>,
    /// Template samplers, realized on first use and never destroyed.
    sampler_templates: Mutex<HashMap<SamplerMode, SamplerId>>,

    /// One counter for every id kind; ids only need to be unique, not dense.
    id_counter: AtomicUsize,

    vram_bytes: AtomicUsize,
    vram_peak_bytes: AtomicU64,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ResourceError> {
    mutex
        .lock()
        .map_err(|e| ResourceError::BackendError(format!("{what} mutex poisoned: {e}")))
}

/// A clonable, thread-safe handle to the WGPU device and its registries.
#[derive(Clone, Debug)]
pub struct WgpuDevice {
    state: Arc<DeviceState>,
}

impl WgpuDevice {
    pub fn new(context: Arc<Mutex<WgpuSurfaceContext>>) -> Self {
        Self {
            state: Arc::new(DeviceState {
                context,
                shader_modules: Mutex::new(HashMap::new()),
                buffers: Mutex::new(HashMap::new()),
                textures: Mutex::new(HashMap::new()),
                texture_views: Mutex::new(HashMap::new()),
                samplers: Mutex::new(HashMap::new()),
                sampler_templates: Mutex::new(HashMap::new()),
                id_counter: AtomicUsize::new(0),
                vram_bytes: AtomicUsize::new(0),
                vram_peak_bytes: AtomicU64::new(0),
            }),
        }
    }

    fn next_id(&self) -> usize {
        self.state.id_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn track_allocation(&self, bytes: u64) {
        self.state
            .vram_bytes
            .fetch_add(bytes as usize, Ordering::Relaxed);
        let current = self.state.vram_bytes.load(Ordering::Relaxed) as u64;
        self.state
            .vram_peak_bytes
            .fetch_max(current, Ordering::Relaxed);
    }

    fn track_release(&self, bytes: u64) {
        self.state
            .vram_bytes
            .fetch_sub(bytes as usize, Ordering::Relaxed);
    }

    /// Runs `operation` with the raw `wgpu::Device` while the surface
    /// context is locked.
    pub(crate) fn with_wgpu_device<F, R>(&self, operation: F) -> Result<R, ResourceError>
    where
        F: FnOnce(&wgpu::Device) -> Result<R, ResourceError>,
    {
        let guard = lock(&self.state.context, "surface context")?;
        operation(&guard.device)
    }

    // Mip chains add at most a third on top; close enough for telemetry.
    fn estimate_texture_bytes(descriptor: &TextureDescriptor) -> u64 {
        let pixels = descriptor.size.width as u64 * descriptor.size.height as u64;
        pixels * descriptor.format.bytes_per_pixel() as u64
    }

    pub(crate) fn get_wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        let buffers = self.state.buffers.lock().ok()?;
        buffers.get(&id).map(|b| Arc::clone(&b.raw))
    }

    pub(crate) fn get_wgpu_texture_view(&self, id: TextureViewId) -> Option<Arc<wgpu::TextureView>> {
        let views = self.state.texture_views.lock().ok()?;
        views.get(&id).map(Arc::clone)
    }

    pub(crate) fn get_wgpu_sampler(&self, id: SamplerId) -> Option<Arc<wgpu::Sampler>> {
        let samplers = self.state.samplers.lock().ok()?;
        samplers.get(&id).map(Arc::clone)
    }

    pub(crate) fn get_wgpu_shader_module(
        &self,
        id: ShaderModuleId,
    ) -> Option<Arc<wgpu::ShaderModule>> {
        let modules = self.state.shader_modules.lock().ok()?;
        modules.get(&id).map(Arc::clone)
    }

    /// Submits a finished command buffer to the queue.
    pub(crate) fn submit(&self, buffer: wgpu::CommandBuffer) {
        match self.state.context.lock() {
            Ok(guard) => {
                guard.queue.submit(std::iter::once(buffer));
            }
            Err(e) => log::error!("WgpuDevice: submit skipped, context poisoned: {e}"),
        }
    }

    /// Blocks until the queue is drained and every pending callback has run.
    /// Used during shutdown so mapped buffers are not dropped mid-flight.
    pub fn poll_device_blocking(&self) {
        if let Ok(guard) = self.state.context.lock() {
            if let Err(e) = guard.device.poll(wgpu::PollType::wait_indefinitely()) {
                log::warn!("WgpuDevice: blocking poll failed: {e:?}");
            }
        }
    }

    /// Pumps completed GPU work without blocking. `map_async` callbacks for
    /// the query pool fire from here.
    pub fn poll_device_non_blocking(&self) {
        if let Ok(guard) = self.state.context.lock() {
            if let Err(e) = guard.device.poll(wgpu::PollType::Poll) {
                log::warn!("WgpuDevice: poll failed: {e:?}");
            }
        }
    }

    /// Wraps a view of a raw texture (the swap chain image) in a regular
    /// view id so the rest of the renderer can treat it like any other
    /// render target.
    pub(crate) fn register_surface_view(
        &self,
        texture: &wgpu::Texture,
        label: Option<&str>,
    ) -> Result<TextureViewId, ResourceError> {
        let view = Arc::new(texture.create_view(&wgpu::TextureViewDescriptor {
            label,
            ..Default::default()
        }));
        let id = TextureViewId(self.next_id());
        lock(&self.state.texture_views, "texture view registry")?.insert(id, view);
        Ok(id)
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let label = descriptor.label.as_deref();
        let module = self.with_wgpu_device(|device| {
            Ok(Arc::new(device.create_shader_module(
                wgpu::ShaderModuleDescriptor {
                    label,
                    source: wgpu::ShaderSource::Wgsl(descriptor.source.clone()),
                },
            )))
        })?;

        let id = ShaderModuleId(self.next_id());
        lock(&self.state.shader_modules, "shader registry")?.insert(id, module);
        log::debug!(
            "WgpuDevice: shader module '{}' -> {id:?}",
            label.unwrap_or_default()
        );
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        match lock(&self.state.shader_modules, "shader registry")?.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ShaderError::NotFound { id }.into()),
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let raw = self.with_wgpu_device(|device| {
            Ok(device.create_buffer(&wgpu::BufferDescriptor {
                label: descriptor.label.as_deref(),
                size: descriptor.size,
                usage: buffer_usages(descriptor.kind, descriptor.mode),
                mapped_at_creation: false,
            }))
        })?;

        let id = BufferId(self.next_id());
        self.track_allocation(descriptor.size);
        lock(&self.state.buffers, "buffer registry")?.insert(
            id,
            TrackedBuffer {
                raw: Arc::new(raw),
                bytes: descriptor.size,
            },
        );
        log::debug!(
            "WgpuDevice: buffer '{}' ({} B) -> {id:?}",
            descriptor.label.as_deref().unwrap_or_default(),
            descriptor.size
        );
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let raw = self.with_wgpu_device(|device| {
            Ok(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: descriptor.label.as_deref(),
                contents: data,
                usage: buffer_usages(descriptor.kind, descriptor.mode),
            }))
        })?;

        let id = BufferId(self.next_id());
        let bytes = data.len() as u64;
        self.track_allocation(bytes);
        lock(&self.state.buffers, "buffer registry")?.insert(
            id,
            TrackedBuffer {
                raw: Arc::new(raw),
                bytes,
            },
        );
        log::debug!(
            "WgpuDevice: initialized buffer '{}' ({bytes} B) -> {id:?}",
            descriptor.label.as_deref().unwrap_or_default()
        );
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        match lock(&self.state.buffers, "buffer registry")?.remove(&id) {
            Some(entry) => {
                self.track_release(entry.bytes);
                Ok(())
            }
            None => Err(ResourceError::NotFound),
        }
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let buffers = lock(&self.state.buffers, "buffer registry")?;
        let entry = buffers.get(&id).ok_or(ResourceError::NotFound)?;

        if offset + data.len() as u64 > entry.raw.size() {
            return Err(ResourceError::OutOfBounds);
        }

        let context = lock(&self.state.context, "surface context")?;
        context.queue.write_buffer(&entry.raw, offset, data);
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let raw = self.with_wgpu_device(|device| {
            Ok(device.create_texture(&wgpu::TextureDescriptor {
                label: descriptor.label.as_deref(),
                size: descriptor.size.into_wgpu(),
                mip_level_count: descriptor.mip_level_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: descriptor.format.into_wgpu(),
                usage: descriptor.usage.into_wgpu(),
                view_formats: &[],
            }))
        })?;

        let id = TextureId(self.next_id());
        let bytes = Self::estimate_texture_bytes(descriptor);
        self.track_allocation(bytes);
        lock(&self.state.textures, "texture registry")?.insert(
            id,
            TrackedTexture {
                raw: Arc::new(raw),
                bytes,
            },
        );
        log::debug!(
            "WgpuDevice: texture '{}' ({bytes} B) -> {id:?}",
            descriptor.label.as_deref().unwrap_or_default()
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        match lock(&self.state.textures, "texture registry")?.remove(&id) {
            Some(entry) => {
                self.track_release(entry.bytes);
                Ok(())
            }
            None => Err(ResourceError::NotFound),
        }
    }

    fn write_texture(
        &self,
        id: TextureId,
        mip_level: u32,
        data: &[u8],
        bytes_per_row: u32,
        size: Extent2D,
    ) -> Result<(), ResourceError> {
        let textures = lock(&self.state.textures, "texture registry")?;
        let entry = textures.get(&id).ok_or(ResourceError::NotFound)?;
        let context = lock(&self.state.context, "surface context")?;

        context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.raw,
                mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: None,
            },
            size.into_wgpu(),
        );
        Ok(())
    }

    fn create_texture_view(
        &self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        let textures = lock(&self.state.textures, "texture registry")?;
        let entry = textures.get(&texture).ok_or(ResourceError::NotFound)?;

        let view = Arc::new(entry.raw.create_view(&wgpu::TextureViewDescriptor {
            label: descriptor.label.as_deref(),
            aspect: descriptor.aspect.into_wgpu(),
            ..Default::default()
        }));
        drop(textures);

        let id = TextureViewId(self.next_id());
        lock(&self.state.texture_views, "texture view registry")?.insert(id, view);
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        match lock(&self.state.texture_views, "texture view registry")?.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ResourceError::NotFound),
        }
    }

    fn get_sampler(&self, mode: SamplerMode) -> Result<SamplerId, ResourceError> {
        let mut templates = lock(&self.state.sampler_templates, "sampler templates")?;
        if let Some(&id) = templates.get(&mode) {
            return Ok(id);
        }

        let desc = mode.descriptor();
        let sampler = self.with_wgpu_device(|device| {
            Ok(Arc::new(device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(&format!("{mode:?} Sampler")),
                address_mode_u: desc.address_mode.into_wgpu(),
                address_mode_v: desc.address_mode.into_wgpu(),
                address_mode_w: desc.address_mode.into_wgpu(),
                mag_filter: desc.mag_filter.into_wgpu(),
                min_filter: desc.min_filter.into_wgpu(),
                mipmap_filter: desc.mip_filter.into_wgpu(),
                lod_min_clamp: 0.0,
                lod_max_clamp: 32.0,
                compare: desc.compare.map(|f| f.into_wgpu()),
                anisotropy_clamp: desc.anisotropy_clamp,
                border_color: None,
            })))
        })?;

        let id = SamplerId(self.next_id());
        lock(&self.state.samplers, "sampler registry")?.insert(id, sampler);
        templates.insert(mode, id);
        log::debug!("WgpuDevice: realized sampler template {mode:?} -> {id:?}");
        Ok(id)
    }

    fn surface_format(&self) -> Option<TextureFormat> {
        self.state
            .context
            .lock()
            .ok()
            .map(|guard| from_wgpu_texture_format(guard.surface_config.format))
    }

    fn supports_timestamp_queries(&self) -> bool {
        self.state
            .context
            .lock()
            .is_ok_and(|guard| guard.timestamps_supported())
    }

    fn vram_allocated_bytes(&self) -> u64 {
        self.state.vram_bytes.load(Ordering::Relaxed) as u64
    }
}
