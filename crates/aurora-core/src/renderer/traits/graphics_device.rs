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

//! The abstract interface for GPU resource creation and destruction.

use crate::renderer::api::buffer::{BufferDescriptor, BufferId};
use crate::renderer::api::state::SamplerMode;
use crate::renderer::api::texture::{
    Extent2D, SamplerId, TextureDescriptor, TextureFormat, TextureId, TextureViewDescriptor,
    TextureViewId,
};
use crate::renderer::error::ResourceError;
use crate::renderer::shader::{ShaderModuleDescriptor, ShaderModuleId};

/// A handle to the logical graphics device, responsible for the lifetime of
/// every GPU resource. Implementations are thread-safe handles; cloning and
/// sharing them is cheap.
pub trait GraphicsDevice: Send + Sync {
    // --- Shader Module Operations ---

    /// Compiles a shader module from WGSL source.
    ///
    /// ## Arguments
    /// * `descriptor` - The source and an optional debug label.
    ///
    /// ## Returns
    /// * `Result<ShaderModuleId, ResourceError>` - An opaque handle to the module.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Destroys a shader module. Pipelines already built from it are unaffected.
    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    // --- Buffer Operations ---

    /// Creates an uninitialized buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a buffer initialized with `data`. The descriptor's size must
    /// equal `data.len()`.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes `data` into a buffer at `offset`. The write is ordered before
    /// the GPU work submitted for the current frame.
    ///
    /// ## Returns
    /// * `Err(ResourceError::OutOfBounds)` if the write would exceed the
    ///   buffer's size.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    // --- Texture Operations ---

    /// Creates a texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a texture. Views over it must be destroyed first.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Uploads `data` into one mip level of a texture.
    ///
    /// ## Arguments
    /// * `mip_level` - The destination mip level.
    /// * `bytes_per_row` - The row pitch of `data` in bytes.
    /// * `size` - The extent of the destination mip level.
    fn write_texture(
        &self,
        id: TextureId,
        mip_level: u32,
        data: &[u8],
        bytes_per_row: u32,
        size: Extent2D,
    ) -> Result<(), ResourceError>;

    /// Creates a view over a texture.
    fn create_texture_view(
        &self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError>;

    // --- Sampler Operations ---

    /// Returns the sampler for a template, realizing it on first use.
    /// Template samplers live for the lifetime of the device.
    fn get_sampler(&self, mode: SamplerMode) -> Result<SamplerId, ResourceError>;

    // --- Capability Queries ---

    /// The pixel format of the presentation surface, if one is configured.
    fn surface_format(&self) -> Option<TextureFormat>;

    /// Whether the device can record GPU timestamps.
    fn supports_timestamp_queries(&self) -> bool;

    /// The bytes of VRAM currently attributed to live resources.
    fn vram_allocated_bytes(&self) -> u64;
}
