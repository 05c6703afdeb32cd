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

//! The egui overlay, rendered through the abstract [`GraphicsContext`].
//!
//! All of a frame's UI meshes share one dynamic vertex buffer and one
//! dynamic index buffer. The buffers grow with slack when the tessellated
//! UI outgrows them, so steady-state frames reallocate nothing.

use std::collections::HashMap;

use egui::epaint::Primitive;

use aurora_core::renderer::{
    BlendMode, BufferUsageMode, DepthMode, GraphicsContext, GraphicsDevice, IndexBuffer,
    IndexStride, PrimitiveTopology, RasterMode, RenderError, SamplerMode, ShaderSet, Texture2D,
    TextureFormat, UniformBuffer, VertexAttributes, VertexBuffer,
};

const OVERLAY_WGSL: &str = r#"
struct Globals {
    screen_size: vec2<f32>,
    _pad: vec2<f32>,
};

@group(0) @binding(0) var<uniform> globals: Globals;
@group(0) @binding(1) var atlas: texture_2d<f32>;
@group(0) @binding(2) var atlas_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) byte_color: vec4<f32>,
    @location(2) tex_coord0: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(
        2.0 * in.position.x / globals.screen_size.x - 1.0,
        1.0 - 2.0 * in.position.y / globals.screen_size.y,
        0.0,
        1.0,
    );
    out.color = in.byte_color;
    out.uv = in.tex_coord0;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let tex = textureSample(atlas, atlas_sampler, in.uv);
    var color = in.color * tex;
    // egui colors are premultiplied; the blend template expects straight alpha.
    if (color.a > 0.0) {
        color = vec4<f32>(color.rgb / color.a, color.a);
    }
    return color;
}
"#;

/// Growth slack for the overlay's shared geometry buffers.
#[derive(Debug, Clone, Copy)]
pub struct OverlayConfig {
    /// Extra vertices allocated beyond a frame's needs when growing.
    pub vertex_slack: u32,
    /// Extra indices allocated beyond a frame's needs when growing.
    pub index_slack: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            vertex_slack: 5_000,
            index_slack: 10_000,
        }
    }
}

/// A managed egui texture plus its CPU-side pixels, kept for partial updates.
struct AtlasTexture {
    texture: Texture2D,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

/// One mesh of a frame, after batching into the shared buffers.
struct OverlayDraw {
    texture_id: egui::TextureId,
    index_range: std::ops::Range<u32>,
    base_vertex: i32,
    scissor: Option<(u32, u32, u32, u32)>,
}

/// The vertex attribute set of an overlay vertex: `vec3` position (z = 0),
/// packed unorm color, one texcoord. 24 bytes per vertex.
const OVERLAY_ATTRIBUTES: VertexAttributes = VertexAttributes::POSITION
    .union(VertexAttributes::BYTE_COLOR)
    .union(VertexAttributes::TEXCOORD0);

fn pack_vertex(vertex: &egui::epaint::Vertex, out: &mut Vec<u8>) {
    out.extend_from_slice(&vertex.pos.x.to_le_bytes());
    out.extend_from_slice(&vertex.pos.y.to_le_bytes());
    out.extend_from_slice(&0.0f32.to_le_bytes());
    out.extend_from_slice(&vertex.color.to_array());
    out.extend_from_slice(&vertex.uv.x.to_le_bytes());
    out.extend_from_slice(&vertex.uv.y.to_le_bytes());
}

/// Converts a clip rect in logical points to a physical-pixel scissor,
/// clamped to the screen. Returns `None` when the rect is empty on screen.
fn scissor_for_clip_rect(
    clip_rect: &egui::Rect,
    pixels_per_point: f32,
    screen_width: u32,
    screen_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let min_x = ((clip_rect.min.x * pixels_per_point).round() as i64).max(0) as u32;
    let min_y = ((clip_rect.min.y * pixels_per_point).round() as i64).max(0) as u32;
    let max_x = ((clip_rect.max.x * pixels_per_point).round() as i64).max(0) as u32;
    let max_y = ((clip_rect.max.y * pixels_per_point).round() as i64).max(0) as u32;

    let min_x = min_x.min(screen_width);
    let min_y = min_y.min(screen_height);
    let width = max_x.saturating_sub(min_x).min(screen_width - min_x);
    let height = max_y.saturating_sub(min_y).min(screen_height - min_y);
    if width == 0 || height == 0 {
        return None;
    }
    Some((min_x, min_y, width, height))
}

/// Renders egui output on top of the frame's current render targets.
pub struct OverlayRenderer {
    config: OverlayConfig,
    shaders: ShaderSet,
    globals: UniformBuffer,
    vertices: Option<VertexBuffer>,
    indices: Option<IndexBuffer>,
    textures: HashMap<egui::TextureId, AtlasTexture>,
}

impl OverlayRenderer {
    pub fn new(device: &dyn GraphicsDevice, config: OverlayConfig) -> Result<Self, RenderError> {
        let shaders = ShaderSet::new(device, "Egui Overlay", OVERLAY_WGSL)
            .map_err(|e| RenderError::ResourceError(e.into()))?;
        let globals = UniformBuffer::create(device, "Egui Overlay Globals", 16)
            .map_err(RenderError::ResourceError)?;
        Ok(Self {
            config,
            shaders,
            globals,
            vertices: None,
            indices: None,
            textures: HashMap::new(),
        })
    }

    /// Applies the `set` half of a frame's texture delta. Call before
    /// [`render`](Self::render).
    pub fn update_textures(
        &mut self,
        device: &dyn GraphicsDevice,
        delta: &egui::TexturesDelta,
    ) -> Result<(), RenderError> {
        for (id, image_delta) in &delta.set {
            self.apply_image_delta(device, *id, image_delta)?;
        }
        Ok(())
    }

    /// Applies the `free` half of a frame's texture delta. Call after
    /// [`render`](Self::render), per the egui contract.
    pub fn free_textures(&mut self, device: &dyn GraphicsDevice, delta: &egui::TexturesDelta) {
        for id in &delta.free {
            if let Some(mut atlas) = self.textures.remove(id) {
                atlas.texture.destroy(device);
            }
        }
    }

    fn apply_image_delta(
        &mut self,
        device: &dyn GraphicsDevice,
        id: egui::TextureId,
        delta: &egui::epaint::ImageDelta,
    ) -> Result<(), RenderError> {
        let region_width = delta.image.width() as u32;
        let region_height = delta.image.height() as u32;
        let new_pixels: Vec<u8> = match &delta.image {
            egui::ImageData::Color(image) => {
                image.pixels.iter().flat_map(|c| c.to_array()).collect()
            }
        };

        if let Some(pos) = delta.pos {
            // Partial update: patch the CPU copy, then re-upload the whole
            // atlas. Uploads are rare (font atlas growth) and small.
            let Some(atlas) = self.textures.get_mut(&id) else {
                log::warn!("OverlayRenderer: partial update for unknown texture {id:?}, ignoring");
                return Ok(());
            };
            let start_x = pos[0] as u32;
            let start_y = pos[1] as u32;
            for y in 0..region_height {
                for x in 0..region_width {
                    let src = ((y * region_width + x) * 4) as usize;
                    let dst = (((start_y + y) * atlas.width + start_x + x) * 4) as usize;
                    if dst + 4 <= atlas.pixels.len() && src + 4 <= new_pixels.len() {
                        atlas.pixels[dst..dst + 4].copy_from_slice(&new_pixels[src..src + 4]);
                    }
                }
            }
            atlas.texture.destroy(device);
            atlas.texture = Texture2D::from_pixels(
                device,
                "Egui Atlas",
                atlas.width,
                atlas.height,
                TextureFormat::Rgba8UnormSrgb,
                &atlas.pixels,
            )
            .map_err(RenderError::ResourceError)?;
            return Ok(());
        }

        if let Some(mut old) = self.textures.remove(&id) {
            old.texture.destroy(device);
        }
        let texture = Texture2D::from_pixels(
            device,
            "Egui Atlas",
            region_width,
            region_height,
            TextureFormat::Rgba8UnormSrgb,
            &new_pixels,
        )
        .map_err(RenderError::ResourceError)?;
        self.textures.insert(
            id,
            AtlasTexture {
                texture,
                pixels: new_pixels,
                width: region_width,
                height: region_height,
            },
        );
        Ok(())
    }

    fn ensure_capacity(
        &mut self,
        device: &dyn GraphicsDevice,
        vertex_count: u32,
        index_count: u32,
    ) -> Result<(), RenderError> {
        let vertices_fit = self
            .vertices
            .as_ref()
            .is_some_and(|vb| vb.is_created() && vb.count() >= vertex_count);
        if !vertices_fit {
            if let Some(mut old) = self.vertices.take() {
                old.destroy(device);
            }
            let capacity = vertex_count + self.config.vertex_slack;
            log::debug!("OverlayRenderer: growing vertex buffer to {capacity} vertices");
            self.vertices = Some(
                VertexBuffer::create(
                    device,
                    "Egui Overlay Vertices",
                    OVERLAY_ATTRIBUTES,
                    capacity,
                    BufferUsageMode::Dynamic,
                    None,
                )
                .map_err(RenderError::ResourceError)?,
            );
        }

        let indices_fit = self
            .indices
            .as_ref()
            .is_some_and(|ib| ib.is_created() && ib.count() >= index_count);
        if !indices_fit {
            if let Some(mut old) = self.indices.take() {
                old.destroy(device);
            }
            let capacity = index_count + self.config.index_slack;
            log::debug!("OverlayRenderer: growing index buffer to {capacity} indices");
            self.indices = Some(
                IndexBuffer::create_uninitialized(
                    device,
                    "Egui Overlay Indices",
                    capacity,
                    IndexStride::U32,
                    BufferUsageMode::Dynamic,
                )
                .map_err(RenderError::ResourceError)?,
            );
        }
        Ok(())
    }

    /// Draws the tessellated UI into the currently bound render targets.
    ///
    /// `screen_size` is the physical size of those targets in pixels;
    /// vertex positions coming from egui are in logical points.
    pub fn render(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        device: &dyn GraphicsDevice,
        primitives: &[egui::ClippedPrimitive],
        screen_size: (u32, u32),
        pixels_per_point: f32,
    ) -> Result<(), RenderError> {
        let (screen_width, screen_height) = screen_size;
        if screen_width == 0 || screen_height == 0 {
            return Ok(());
        }

        // Batch every mesh into the shared buffers up front.
        let mut vertex_bytes: Vec<u8> = Vec::new();
        let mut index_data: Vec<u32> = Vec::new();
        let mut draws: Vec<OverlayDraw> = Vec::new();
        let mut base_vertex = 0u32;
        for clipped in primitives {
            let mesh = match &clipped.primitive {
                Primitive::Mesh(mesh) => mesh,
                Primitive::Callback(_) => {
                    log::warn!("OverlayRenderer: paint callbacks are not supported, skipping");
                    continue;
                }
            };
            if mesh.vertices.is_empty() || mesh.indices.is_empty() {
                continue;
            }
            if !self.textures.contains_key(&mesh.texture_id) {
                log::warn!("OverlayRenderer: missing texture {:?}", mesh.texture_id);
                continue;
            }
            let first_index = index_data.len() as u32;
            for vertex in &mesh.vertices {
                pack_vertex(vertex, &mut vertex_bytes);
            }
            index_data.extend_from_slice(&mesh.indices);
            draws.push(OverlayDraw {
                texture_id: mesh.texture_id,
                index_range: first_index..index_data.len() as u32,
                base_vertex: base_vertex as i32,
                scissor: scissor_for_clip_rect(
                    &clipped.clip_rect,
                    pixels_per_point,
                    screen_width,
                    screen_height,
                ),
            });
            base_vertex += mesh.vertices.len() as u32;
        }
        if draws.is_empty() {
            return Ok(());
        }

        self.ensure_capacity(device, base_vertex, index_data.len() as u32)?;
        let vertices = self.vertices.as_ref().ok_or_else(|| {
            RenderError::Internal("overlay vertex buffer missing after growth".to_string())
        })?;
        let indices = self.indices.as_ref().ok_or_else(|| {
            RenderError::Internal("overlay index buffer missing after growth".to_string())
        })?;
        if let Some(id) = vertices.id() {
            ctx.update_buffer(id, &vertex_bytes)
                .map_err(RenderError::ResourceError)?;
        }
        if let Some(id) = indices.id() {
            ctx.update_buffer(id, bytemuck::cast_slice(&index_data))
                .map_err(RenderError::ResourceError)?;
        }

        // egui works in logical points; the shader maps points to clip space.
        let points_size = [
            screen_width as f32 / pixels_per_point,
            screen_height as f32 / pixels_per_point,
            0.0,
            0.0,
        ];
        self.globals
            .update(device, bytemuck::cast_slice(&points_size))
            .map_err(RenderError::ResourceError)?;

        ctx.set_shaders(&self.shaders);
        ctx.set_blend_mode(BlendMode::Translucent);
        ctx.set_depth_mode(DepthMode::Disabled);
        ctx.set_raster_mode(RasterMode::NoCull);
        ctx.set_primitive_topology(PrimitiveTopology::TriangleList);
        ctx.set_viewport(0.0, 0.0, screen_width as f32, screen_height as f32);
        ctx.set_vertex_buffer(vertices);
        ctx.set_index_buffer(indices);
        ctx.set_uniform_buffer(0, &self.globals);
        ctx.set_sampler(2, SamplerMode::LinearClamp);

        for draw in &draws {
            let Some(atlas) = self.textures.get(&draw.texture_id) else {
                continue;
            };
            let Some(scissor) = draw.scissor else {
                continue;
            };
            ctx.set_texture(1, &atlas.texture);
            ctx.set_scissor(scissor.0, scissor.1, scissor.2, scissor.3);
            ctx.draw_indexed(draw.index_range.clone(), draw.base_vertex)?;
        }

        ctx.set_scissor(0, 0, screen_width, screen_height);
        Ok(())
    }

    /// Releases every GPU resource the overlay owns.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for (_, mut atlas) in self.textures.drain() {
            atlas.texture.destroy(device);
        }
        if let Some(mut vertices) = self.vertices.take() {
            vertices.destroy(device);
        }
        if let Some(mut indices) = self.indices.take() {
            indices.destroy(device);
        }
        self.globals.destroy(device);
        self.shaders.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_core::renderer::api::texture::TextureViewDescriptor;
    use aurora_core::renderer::shader::ShaderModuleDescriptor;
    use aurora_core::renderer::{
        BufferDescriptor, BufferId, Extent2D, ResourceError, SamplerId, ShaderModuleId,
        TextureDescriptor, TextureId, TextureViewId,
    };
    use egui::epaint::Vertex;
    use egui::{Color32, Pos2, Rect};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts live buffers and remembers every buffer allocation size.
    #[derive(Default)]
    struct CountingDevice {
        next_id: AtomicUsize,
        live_buffers: AtomicUsize,
        buffer_sizes: Mutex<Vec<u64>>,
    }

    impl GraphicsDevice for CountingDevice {
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
            _data: &[u8],
        ) -> Result<BufferId, ResourceError> {
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
            Ok(TextureId(self.next_id.fetch_add(1, Ordering::Relaxed)))
        }

        fn destroy_texture(&self, _id: TextureId) -> Result<(), ResourceError> {
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
            Ok(TextureViewId(self.next_id.fetch_add(1, Ordering::Relaxed)))
        }

        fn destroy_texture_view(&self, _id: TextureViewId) -> Result<(), ResourceError> {
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
    fn packed_vertex_is_24_bytes() {
        let vertex = Vertex {
            pos: Pos2::new(10.0, 20.0),
            uv: Pos2::new(0.5, 0.25),
            color: Color32::from_rgba_premultiplied(255, 128, 0, 255),
        };
        let mut out = Vec::new();
        pack_vertex(&vertex, &mut out);
        assert_eq!(out.len(), 24);
        assert_eq!(&out[0..4], &10.0f32.to_le_bytes());
        // z is always zero
        assert_eq!(&out[8..12], &0.0f32.to_le_bytes());
        assert_eq!(&out[12..16], &[255, 128, 0, 255]);
        assert_eq!(&out[16..20], &0.5f32.to_le_bytes());
    }

    #[test]
    fn scissor_scales_by_pixels_per_point() {
        let rect = Rect::from_min_max(Pos2::new(10.0, 10.0), Pos2::new(110.0, 60.0));
        let scissor = scissor_for_clip_rect(&rect, 2.0, 800, 600).unwrap();
        assert_eq!(scissor, (20, 20, 200, 100));
    }

    #[test]
    fn scissor_clamps_to_screen() {
        let rect = Rect::from_min_max(Pos2::new(-20.0, -20.0), Pos2::new(2000.0, 2000.0));
        let scissor = scissor_for_clip_rect(&rect, 1.0, 800, 600).unwrap();
        assert_eq!(scissor, (0, 0, 800, 600));
    }

    #[test]
    fn empty_clip_rect_yields_no_scissor() {
        let rect = Rect::from_min_max(Pos2::new(900.0, 50.0), Pos2::new(950.0, 60.0));
        assert!(scissor_for_clip_rect(&rect, 1.0, 800, 600).is_none());
    }

    #[test]
    fn geometry_buffers_grow_with_slack() {
        let device = CountingDevice::default();
        let config = OverlayConfig::default();
        let mut overlay = OverlayRenderer::new(&device, config).unwrap();
        // The globals uniform buffer is the only allocation so far.
        assert_eq!(device.buffer_sizes.lock().unwrap().as_slice(), &[16]);

        overlay.ensure_capacity(&device, 120, 480).unwrap();
        {
            let sizes = device.buffer_sizes.lock().unwrap();
            assert_eq!(sizes[1], (120 + config.vertex_slack) as u64 * 24);
            assert_eq!(sizes[2], (480 + config.index_slack) as u64 * 4);
        }
        assert_eq!(device.live_buffers.load(Ordering::Relaxed), 3);

        // A frame that fits within the slack reallocates nothing.
        overlay
            .ensure_capacity(&device, 120 + config.vertex_slack, 480 + config.index_slack)
            .unwrap();
        assert_eq!(device.buffer_sizes.lock().unwrap().len(), 3);

        // Outgrowing the vertex buffer replaces it; the index buffer stays.
        overlay
            .ensure_capacity(&device, 120 + config.vertex_slack + 1, 480)
            .unwrap();
        {
            let sizes = device.buffer_sizes.lock().unwrap();
            assert_eq!(sizes.len(), 4);
            assert_eq!(
                sizes[3],
                (121 + 2 * config.vertex_slack) as u64 * 24
            );
        }
        assert_eq!(device.live_buffers.load(Ordering::Relaxed), 3);

        overlay.destroy(&device);
        assert_eq!(device.live_buffers.load(Ordering::Relaxed), 0);
    }
}
