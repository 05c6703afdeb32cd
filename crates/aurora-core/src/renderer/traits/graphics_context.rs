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

//! The stateful command-recording interface.

use crate::renderer::api::buffer::BufferId;
use crate::renderer::api::resource::{
    ColorTarget, DepthTarget, IndexBuffer, Texture2D, UniformBuffer, VertexBuffer,
};
use crate::renderer::api::state::{BlendMode, DepthMode, PrimitiveTopology, RasterMode, SamplerMode};
use crate::renderer::api::texture::TextureViewId;
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::profiling::TimestampQueryBackend;
use crate::renderer::shader::{ComputeShader, ShaderSet};
use std::ops::Range;

/// A stateful recorder for one frame of GPU work.
///
/// Set-calls accumulate state; the backend materializes render passes,
/// pipelines, and bind groups lazily when a draw or dispatch is issued.
/// Binding slots refer to `@binding(n)` numbers within bind group 0 of the
/// currently bound shaders.
///
/// The trait extends [`TimestampQueryBackend`] so the profiler can record
/// its queries through the same recorder.
pub trait GraphicsContext: TimestampQueryBackend {
    // --- Output Merger ---

    /// Binds the render targets for subsequent draws. Passing a new set of
    /// targets ends the current render pass, if any.
    fn set_render_targets(&mut self, colors: &[&ColorTarget], depth: Option<&DepthTarget>);

    /// Clears the bound color targets at the start of the next render pass.
    fn clear_color(&mut self, color: [f64; 4]);

    /// Clears the bound depth target at the start of the next render pass.
    fn clear_depth(&mut self, depth: f32);

    /// Sets the viewport, in pixels.
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32);

    /// Sets the scissor rectangle, in pixels.
    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32);

    // --- Resource Binding ---

    /// Binds the vertex buffer for subsequent draws.
    fn set_vertex_buffer(&mut self, buffer: &VertexBuffer);

    /// Binds the index buffer for subsequent indexed draws.
    fn set_index_buffer(&mut self, buffer: &IndexBuffer);

    /// Binds a uniform buffer to a binding slot.
    fn set_uniform_buffer(&mut self, slot: u32, buffer: &UniformBuffer);

    /// Binds a texture to a binding slot.
    fn set_texture(&mut self, slot: u32, texture: &Texture2D);

    /// Binds an arbitrary texture view to a binding slot (e.g. the sampled
    /// view of a depth target).
    fn set_texture_view(&mut self, slot: u32, view: TextureViewId);

    /// Binds a template sampler to a binding slot.
    fn set_sampler(&mut self, slot: u32, mode: SamplerMode);

    /// Binds the raw storage view of a GPU-writable buffer to a binding slot.
    fn set_storage_buffer(&mut self, slot: u32, buffer: &VertexBuffer);

    // --- Pipeline State ---

    /// Binds the vertex/fragment shader set for subsequent draws.
    fn set_shaders(&mut self, shaders: &ShaderSet);

    /// Binds the compute shader for subsequent dispatches.
    fn set_compute_shader(&mut self, shader: &ComputeShader);

    fn set_blend_mode(&mut self, mode: BlendMode);

    fn set_depth_mode(&mut self, mode: DepthMode);

    fn set_raster_mode(&mut self, mode: RasterMode);

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);

    // --- Draw / Dispatch ---

    /// Draws a range of vertices from the bound vertex buffer.
    fn draw(&mut self, vertices: Range<u32>) -> Result<(), RenderError>;

    /// Draws a range of indices from the bound index buffer.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32) -> Result<(), RenderError>;

    /// Draws a range of indices once per instance in `instances`.
    fn draw_indexed_instanced(
        &mut self,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> Result<(), RenderError>;

    /// Dispatches the bound compute shader. Ends the current render pass.
    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), RenderError>;

    // --- Data Updates ---

    /// Replaces the contents of a dynamic or uniform buffer from the CPU.
    /// The write lands before the frame's GPU work executes.
    fn update_buffer(&mut self, id: BufferId, data: &[u8]) -> Result<(), ResourceError>;
}
