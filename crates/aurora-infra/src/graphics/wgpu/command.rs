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

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use aurora_core::renderer::api::state::{
    BlendMode, DepthMode, PrimitiveTopology, RasterMode, SamplerMode,
};
use aurora_core::renderer::profiling::{CalibrationData, TimestampQueryBackend};
use aurora_core::renderer::shader::{BindingKind, BindingSlot, ShaderModuleId};
use aurora_core::renderer::{
    BufferId, ColorTarget, ComputeShader, DepthTarget, GpuProfiler, GraphicsContext,
    GraphicsDevice, IndexBuffer, IndexStride, RenderError, ResourceError, ShaderSet, Texture2D,
    TextureFormat, TextureViewId, UniformBuffer, VertexAttributes, VertexBuffer,
    VertexInputLayout, VertexLayoutManager,
};

use super::conversions::IntoWgpu;
use super::device::WgpuDevice;
use super::query::WgpuQueryPool;

/// Everything a pipeline's compiled form depends on. Two draws sharing a key
/// share a `wgpu::RenderPipeline`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RenderPipelineKey {
    module: ShaderModuleId,
    /// The (mesh, shader) layout-cache key; see [`VertexLayoutManager::key`].
    layout: u64,
    blend: BlendMode,
    depth: DepthMode,
    raster: RasterMode,
    topology: PrimitiveTopology,
    color_formats: Vec<TextureFormat>,
    has_depth: bool,
}

/// The shader-set state a frame context keeps after `set_shaders`. A snapshot
/// rather than a borrow, so the caller may drop the set mid-frame.
#[derive(Debug, Clone)]
struct BoundShaders {
    label: String,
    module: ShaderModuleId,
    vertex_entry: String,
    fragment_entry: Option<String>,
    attributes: VertexAttributes,
    bindings: Vec<BindingSlot>,
}

#[derive(Debug, Clone)]
struct BoundCompute {
    label: String,
    module: ShaderModuleId,
    entry: String,
    bindings: Vec<BindingSlot>,
}

#[derive(Debug, Clone, Copy)]
struct BoundVertexBuffer {
    id: BufferId,
    attributes: VertexAttributes,
}

/// Caches compiled pipelines and per-module bind group layouts across frames.
///
/// Render pipelines are keyed by [`RenderPipelineKey`]; compute pipelines and
/// bind group layouts by their module. Entries are never evicted.
#[derive(Debug, Default)]
pub struct WgpuPipelineCache {
    render: HashMap<RenderPipelineKey, Arc<wgpu::RenderPipeline>>,
    compute: HashMap<ShaderModuleId, Arc<wgpu::ComputePipeline>>,
    bind_group_layouts: HashMap<ShaderModuleId, Arc<wgpu::BindGroupLayout>>,
}

impl WgpuPipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_pipeline_count(&self) -> usize {
        self.render.len()
    }

    /// The bind group layout for a module, derived from its reflected
    /// bindings. Only group 0 is honored; other groups are reported once
    /// here and ignored.
    fn bind_group_layout(
        &mut self,
        device: &WgpuDevice,
        module: ShaderModuleId,
        label: &str,
        bindings: &[BindingSlot],
        visibility: wgpu::ShaderStages,
    ) -> Result<Arc<wgpu::BindGroupLayout>, RenderError> {
        if let Some(layout) = self.bind_group_layouts.get(&module) {
            return Ok(Arc::clone(layout));
        }

        let mut entries = Vec::new();
        for slot in bindings {
            if slot.group != 0 {
                log::warn!(
                    "Shader '{label}': binding '{}' uses group {}, only group 0 is supported",
                    slot.name,
                    slot.group
                );
                continue;
            }
            let ty = match slot.kind {
                BindingKind::Uniform => wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                BindingKind::Storage { read_only } => wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                BindingKind::Texture => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                BindingKind::Sampler { comparison } => wgpu::BindingType::Sampler(if comparison {
                    wgpu::SamplerBindingType::Comparison
                } else {
                    wgpu::SamplerBindingType::Filtering
                }),
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot.binding,
                visibility,
                ty,
                count: None,
            });
        }

        let layout = device
            .with_wgpu_device(|wgpu_device| {
                Ok(Arc::new(wgpu_device.create_bind_group_layout(
                    &wgpu::BindGroupLayoutDescriptor {
                        label: Some(&format!("{label} Bind Group Layout")),
                        entries: &entries,
                    },
                )))
            })
            .map_err(RenderError::ResourceError)?;
        self.bind_group_layouts.insert(module, Arc::clone(&layout));
        Ok(layout)
    }

    fn get_or_create_render(
        &mut self,
        device: &WgpuDevice,
        key: RenderPipelineKey,
        shaders: &BoundShaders,
        layout: &VertexInputLayout,
    ) -> Result<Arc<wgpu::RenderPipeline>, RenderError> {
        if let Some(pipeline) = self.render.get(&key) {
            return Ok(Arc::clone(pipeline));
        }

        let bind_group_layout = self.bind_group_layout(
            device,
            shaders.module,
            &shaders.label,
            &shaders.bindings,
            wgpu::ShaderStages::VERTEX_FRAGMENT,
        )?;
        let module = device
            .get_wgpu_shader_module(shaders.module)
            .ok_or_else(|| {
                RenderError::Internal(format!("shader module of '{}' was destroyed", shaders.label))
            })?;

        let attributes: Vec<wgpu::VertexAttribute> = layout
            .elements
            .iter()
            .map(|element| wgpu::VertexAttribute {
                format: element.format.into_wgpu(),
                offset: element.offset as u64,
                shader_location: element.shader_location,
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = if attributes.is_empty() {
            Vec::new()
        } else {
            vec![wgpu::VertexBufferLayout {
                array_stride: layout.stride as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }]
        };

        let blend = key.blend.descriptor().map(|desc| desc.into_wgpu());
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|&format| {
                Some(wgpu::ColorTargetState {
                    format: format.into_wgpu(),
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_desc = key.depth.descriptor();
        let depth_stencil = key.has_depth.then(|| wgpu::DepthStencilState {
            format: DepthTarget::FORMAT.into_wgpu(),
            depth_write_enabled: Some(depth_desc.depth_write_enabled),
            depth_compare: if depth_desc.depth_test_enabled {
                Some(depth_desc.compare.into_wgpu())
            } else {
                Some(wgpu::CompareFunction::Always)
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let raster_desc = key.raster.descriptor();
        let pipeline = device
            .with_wgpu_device(|wgpu_device| {
                log::debug!(
                    "WgpuPipelineCache: compiling render pipeline for '{}' ({:?}/{:?}/{:?}/{:?})",
                    shaders.label,
                    key.blend,
                    key.depth,
                    key.raster,
                    key.topology
                );
                let pipeline_layout =
                    wgpu_device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some(&format!("{} Pipeline Layout", shaders.label)),
                        bind_group_layouts: &[Some(bind_group_layout.as_ref())],
                        immediate_size: 0,
                    });
                Ok(Arc::new(wgpu_device.create_render_pipeline(
                    &wgpu::RenderPipelineDescriptor {
                        label: Some(&format!("{} Pipeline", shaders.label)),
                        layout: Some(&pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: &module,
                            entry_point: Some(&shaders.vertex_entry),
                            compilation_options: Default::default(),
                            buffers: &vertex_buffers,
                        },
                        fragment: shaders.fragment_entry.as_deref().map(|entry| {
                            wgpu::FragmentState {
                                module: &module,
                                entry_point: Some(entry),
                                compilation_options: Default::default(),
                                targets: &targets,
                            }
                        }),
                        primitive: wgpu::PrimitiveState {
                            topology: key.topology.into_wgpu(),
                            strip_index_format: None,
                            front_face: wgpu::FrontFace::Ccw,
                            cull_mode: raster_desc.cull_mode.and_then(|face| face.into_wgpu()),
                            unclipped_depth: false,
                            polygon_mode: raster_desc.polygon_mode.into_wgpu(),
                            conservative: false,
                        },
                        depth_stencil,
                        multisample: wgpu::MultisampleState::default(),
                        multiview_mask: None,
                        cache: None,
                    },
                )))
            })
            .map_err(RenderError::ResourceError)?;

        self.render.insert(key, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    fn get_or_create_compute(
        &mut self,
        device: &WgpuDevice,
        compute: &BoundCompute,
    ) -> Result<Arc<wgpu::ComputePipeline>, RenderError> {
        if let Some(pipeline) = self.compute.get(&compute.module) {
            return Ok(Arc::clone(pipeline));
        }

        let bind_group_layout = self.bind_group_layout(
            device,
            compute.module,
            &compute.label,
            &compute.bindings,
            wgpu::ShaderStages::COMPUTE,
        )?;
        let module = device
            .get_wgpu_shader_module(compute.module)
            .ok_or_else(|| {
                RenderError::Internal(format!("shader module of '{}' was destroyed", compute.label))
            })?;

        let pipeline = device
            .with_wgpu_device(|wgpu_device| {
                log::debug!(
                    "WgpuPipelineCache: compiling compute pipeline for '{}'",
                    compute.label
                );
                let pipeline_layout =
                    wgpu_device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some(&format!("{} Pipeline Layout", compute.label)),
                        bind_group_layouts: &[Some(bind_group_layout.as_ref())],
                        immediate_size: 0,
                    });
                Ok(Arc::new(wgpu_device.create_compute_pipeline(
                    &wgpu::ComputePipelineDescriptor {
                        label: Some(&format!("{} Pipeline", compute.label)),
                        layout: Some(&pipeline_layout),
                        module: &module,
                        entry_point: Some(&compute.entry),
                        compilation_options: Default::default(),
                        cache: None,
                    },
                )))
            })
            .map_err(RenderError::ResourceError)?;

        self.compute.insert(compute.module, Arc::clone(&pipeline));
        Ok(pipeline)
    }
}

/// Keeps a bind group's resources alive while the group is built.
enum BoundResource {
    Buffer(Arc<wgpu::Buffer>),
    View(Arc<wgpu::TextureView>),
    Sampler(Arc<wgpu::Sampler>),
}

/// The wgpu implementation of [`GraphicsContext`] for one frame.
///
/// Set-calls only record state. A draw materializes the render pass (opening
/// it lazily with the pending clear ops), the pipeline (through the shared
/// [`WgpuPipelineCache`]), and a bind group matching the shader's reflected
/// group-0 bindings. Timestamp writes end the current pass, so profiler
/// scopes around passes cost a pass split at worst.
pub struct WgpuFrameContext<'a> {
    device: WgpuDevice,
    queries: &'a mut WgpuQueryPool,
    pipelines: &'a mut WgpuPipelineCache,
    layouts: &'a mut VertexLayoutManager,
    profiler: Option<&'a mut GpuProfiler>,

    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<wgpu::RenderPass<'static>>,

    color_views: Vec<Arc<wgpu::TextureView>>,
    color_formats: Vec<TextureFormat>,
    depth_view: Option<Arc<wgpu::TextureView>>,
    pending_clear_color: Option<[f64; 4]>,
    pending_clear_depth: Option<f32>,
    viewport: Option<(f32, f32, f32, f32)>,
    scissor: Option<(u32, u32, u32, u32)>,

    vertex: Option<BoundVertexBuffer>,
    index: Option<(BufferId, IndexStride)>,
    uniforms: HashMap<u32, BufferId>,
    texture_views: HashMap<u32, TextureViewId>,
    samplers: HashMap<u32, SamplerMode>,
    storage_buffers: HashMap<u32, BufferId>,

    shaders: Option<BoundShaders>,
    compute: Option<BoundCompute>,
    blend: BlendMode,
    depth_mode: DepthMode,
    raster: RasterMode,
    topology: PrimitiveTopology,
}

impl<'a> WgpuFrameContext<'a> {
    pub fn new(
        device: WgpuDevice,
        queries: &'a mut WgpuQueryPool,
        pipelines: &'a mut WgpuPipelineCache,
        layouts: &'a mut VertexLayoutManager,
        profiler: Option<&'a mut GpuProfiler>,
    ) -> Result<Self, RenderError> {
        let encoder = device
            .with_wgpu_device(|wgpu_device| {
                Ok(wgpu_device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Aurora Frame Encoder"),
                }))
            })
            .map_err(RenderError::ResourceError)?;

        Ok(Self {
            device,
            queries,
            pipelines,
            layouts,
            profiler,
            encoder: Some(encoder),
            pass: None,
            color_views: Vec::new(),
            color_formats: Vec::new(),
            depth_view: None,
            pending_clear_color: None,
            pending_clear_depth: None,
            viewport: None,
            scissor: None,
            vertex: None,
            index: None,
            uniforms: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashMap::new(),
            storage_buffers: HashMap::new(),
            shaders: None,
            compute: None,
            blend: BlendMode::Opaque,
            depth_mode: DepthMode::ReadWrite,
            raster: RasterMode::BackFaceCull,
            topology: PrimitiveTopology::TriangleList,
        })
    }

    /// Opens a profiler scope, if profiling is enabled this frame.
    pub fn profile_begin(&mut self, label: &str) {
        if let Some(profiler) = self.profiler.take() {
            profiler.begin_scope(label, self);
            self.profiler = Some(profiler);
        }
    }

    /// The scope tree of the most recently resolved frame, if available.
    pub fn last_frame_tree(&self) -> Option<&aurora_core::renderer::ScopeTreeNode> {
        self.profiler.as_deref().and_then(|p| p.last_frame_tree())
    }

    /// Closes the innermost open profiler scope.
    pub fn profile_end(&mut self) {
        if let Some(profiler) = self.profiler.take() {
            profiler.end_scope(self);
            self.profiler = Some(profiler);
        }
    }

    pub(crate) fn frame_begin_profiling(&mut self) {
        if let Some(profiler) = self.profiler.take() {
            profiler.begin_frame(self);
            self.profiler = Some(profiler);
        }
    }

    pub(crate) fn frame_end_profiling(&mut self) {
        if let Some(profiler) = self.profiler.take() {
            profiler.end_frame(self);
            self.profiler = Some(profiler);
        }
    }

    /// Ends recording. Returns `None` if nothing was recorded (the encoder
    /// was already consumed).
    pub fn finish(mut self) -> Option<wgpu::CommandBuffer> {
        self.end_pass();
        self.encoder.take().map(|encoder| encoder.finish())
    }

    fn end_pass(&mut self) {
        // Dropping the pass ends it on the encoder.
        self.pass = None;
    }

    fn ensure_pass(&mut self) -> Result<(), RenderError> {
        if self.pass.is_some() {
            return Ok(());
        }
        if self.color_views.is_empty() && self.depth_view.is_none() {
            return Err(RenderError::Internal(
                "draw issued with no render targets bound".to_string(),
            ));
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| RenderError::Internal("frame context already finished".to_string()))?;

        let clear_color = self.pending_clear_color.take();
        let clear_depth = self.pending_clear_depth.take();

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = self
            .color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view: view.as_ref(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match clear_color {
                            Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                                r: c[0],
                                g: c[1],
                                b: c[2],
                                a: c[3],
                            }),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();

        // The depth format carries stencil, so the pass needs stencil ops
        // even though nothing uses the stencil.
        let depth_stencil_attachment =
            self.depth_view
                .as_ref()
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view: view.as_ref(),
                    depth_ops: Some(wgpu::Operations {
                        load: match clear_depth {
                            Some(depth) => wgpu::LoadOp::Clear(depth),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: match clear_depth {
                            Some(_) => wgpu::LoadOp::Clear(0),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                });

        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Aurora Render Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();

        if let Some((x, y, width, height)) = self.viewport {
            pass.set_viewport(x, y, width, height, 0.0, 1.0);
        }
        if let Some((x, y, width, height)) = self.scissor {
            pass.set_scissor_rect(x, y, width, height);
        }
        self.pass = Some(pass);
        Ok(())
    }

    /// Resolves the bound resources a shader's group-0 bindings refer to.
    fn resolve_bindings(
        &self,
        label: &str,
        bindings: &[BindingSlot],
    ) -> Result<Vec<(u32, BoundResource)>, RenderError> {
        let mut resolved = Vec::with_capacity(bindings.len());
        for slot in bindings {
            if slot.group != 0 {
                continue;
            }
            let missing = |what: &str| {
                RenderError::Internal(format!(
                    "shader '{label}' expects {what} at binding {} ('{}'), but none is bound",
                    slot.binding, slot.name
                ))
            };
            let resource = match slot.kind {
                BindingKind::Uniform => {
                    let id = *self
                        .uniforms
                        .get(&slot.binding)
                        .ok_or_else(|| missing("a uniform buffer"))?;
                    BoundResource::Buffer(
                        self.device
                            .get_wgpu_buffer(id)
                            .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))?,
                    )
                }
                BindingKind::Storage { .. } => {
                    let id = *self
                        .storage_buffers
                        .get(&slot.binding)
                        .ok_or_else(|| missing("a storage buffer"))?;
                    BoundResource::Buffer(
                        self.device
                            .get_wgpu_buffer(id)
                            .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))?,
                    )
                }
                BindingKind::Texture => {
                    let view = *self
                        .texture_views
                        .get(&slot.binding)
                        .ok_or_else(|| missing("a texture"))?;
                    BoundResource::View(
                        self.device
                            .get_wgpu_texture_view(view)
                            .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))?,
                    )
                }
                BindingKind::Sampler { .. } => {
                    let mode = *self
                        .samplers
                        .get(&slot.binding)
                        .ok_or_else(|| missing("a sampler"))?;
                    let id = self
                        .device
                        .get_sampler(mode)
                        .map_err(RenderError::ResourceError)?;
                    BoundResource::Sampler(
                        self.device
                            .get_wgpu_sampler(id)
                            .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))?,
                    )
                }
            };
            resolved.push((slot.binding, resource));
        }
        Ok(resolved)
    }

    fn build_bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        resolved: &[(u32, BoundResource)],
    ) -> Result<wgpu::BindGroup, RenderError> {
        let entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    BoundResource::Buffer(buffer) => buffer.as_entire_binding(),
                    BoundResource::View(view) => wgpu::BindingResource::TextureView(view),
                    BoundResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();
        self.device
            .with_wgpu_device(|wgpu_device| {
                Ok(wgpu_device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("{label} Bind Group")),
                    layout,
                    entries: &entries,
                }))
            })
            .map_err(RenderError::ResourceError)
    }

    /// The steps shared by every draw call: pipeline, bind group, pass,
    /// vertex bindings. Returns with the pass ready for the draw itself.
    fn prepare_draw(&mut self, indexed: bool) -> Result<(), RenderError> {
        let shaders = self
            .shaders
            .as_ref()
            .ok_or_else(|| RenderError::Internal("draw issued with no shaders bound".to_string()))?
            .clone();

        let mesh_attributes = match &self.vertex {
            Some(vertex) => vertex.attributes,
            None if shaders.attributes.is_empty() => VertexAttributes::empty(),
            None => {
                return Err(RenderError::Internal(format!(
                    "shader '{}' consumes vertex attributes but no vertex buffer is bound",
                    shaders.label
                )));
            }
        };
        let layout = self
            .layouts
            .get_or_create(mesh_attributes, shaders.attributes)
            .map_err(|e| RenderError::ResourceError(e.into()))?
            .clone();

        let key = RenderPipelineKey {
            module: shaders.module,
            layout: VertexLayoutManager::key(mesh_attributes, shaders.attributes),
            blend: self.blend,
            depth: self.depth_mode,
            raster: self.raster,
            topology: self.topology,
            color_formats: self.color_formats.clone(),
            has_depth: self.depth_view.is_some(),
        };
        let pipeline = self
            .pipelines
            .get_or_create_render(&self.device, key, &shaders, &layout)?;

        let resolved = self.resolve_bindings(&shaders.label, &shaders.bindings)?;
        let bind_group_layout = self.pipelines.bind_group_layout(
            &self.device,
            shaders.module,
            &shaders.label,
            &shaders.bindings,
            wgpu::ShaderStages::VERTEX_FRAGMENT,
        )?;
        let bind_group = self.build_bind_group(&shaders.label, &bind_group_layout, &resolved)?;

        let vertex_binding = match &self.vertex {
            Some(vertex) if !layout.elements.is_empty() => Some(
                self.device
                    .get_wgpu_buffer(vertex.id)
                    .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))?,
            ),
            _ => None,
        };
        let index_binding = if indexed {
            let (id, stride) = self.index.ok_or_else(|| {
                RenderError::Internal("indexed draw issued with no index buffer bound".to_string())
            })?;
            let buffer = self
                .device
                .get_wgpu_buffer(id)
                .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))?;
            Some((buffer, stride))
        } else {
            None
        };

        self.ensure_pass()?;
        let pass = self.pass.as_mut().ok_or_else(|| {
            RenderError::Internal("render pass unexpectedly missing".to_string())
        })?;
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        if let Some(buffer) = &vertex_binding {
            pass.set_vertex_buffer(0, buffer.slice(..));
        }
        if let Some((buffer, stride)) = &index_binding {
            pass.set_index_buffer(buffer.slice(..), (*stride).into_wgpu());
        }
        Ok(())
    }
}

impl TimestampQueryBackend for WgpuFrameContext<'_> {
    fn record_timestamp(&mut self, slot: usize) {
        // write_timestamp is an encoder command; it cannot land inside an
        // open pass.
        self.end_pass();
        match self.encoder.as_mut() {
            Some(encoder) => self.queries.write_timestamp(encoder, slot),
            None => log::warn!("WgpuFrameContext: timestamp recorded after finish, dropping"),
        }
    }

    fn begin_calibration(&mut self, slot: usize) {
        self.queries.begin_calibration(slot);
    }

    fn end_calibration(&mut self, slot: usize) {
        self.end_pass();
        match self.encoder.as_mut() {
            Some(encoder) => self.queries.end_calibration(slot, encoder),
            None => log::warn!("WgpuFrameContext: calibration closed after finish, dropping"),
        }
    }

    fn read_calibration(&mut self, slot: usize) -> CalibrationData {
        self.queries.read_calibration(slot)
    }

    fn read_timestamp(&mut self, slot: usize) -> u64 {
        self.queries.read_timestamp(slot)
    }
}

impl GraphicsContext for WgpuFrameContext<'_> {
    fn set_render_targets(&mut self, colors: &[&ColorTarget], depth: Option<&DepthTarget>) {
        self.end_pass();
        self.color_views.clear();
        self.color_formats.clear();
        for target in colors {
            let Some(view_id) = target.view() else {
                log::warn!("WgpuFrameContext: skipping destroyed color target");
                continue;
            };
            match self.device.get_wgpu_texture_view(view_id) {
                Some(view) => {
                    self.color_views.push(view);
                    self.color_formats.push(target.format());
                }
                None => log::warn!("WgpuFrameContext: color target view {view_id:?} not found"),
            }
        }
        self.depth_view = depth
            .and_then(|target| target.attachment_view())
            .and_then(|view_id| {
                let view = self.device.get_wgpu_texture_view(view_id);
                if view.is_none() {
                    log::warn!("WgpuFrameContext: depth target view {view_id:?} not found");
                }
                view
            });
    }

    fn clear_color(&mut self, color: [f64; 4]) {
        self.pending_clear_color = Some(color);
    }

    fn clear_depth(&mut self, depth: f32) {
        self.pending_clear_depth = Some(depth);
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.viewport = Some((x, y, width, height));
        if let Some(pass) = self.pass.as_mut() {
            pass.set_viewport(x, y, width, height, 0.0, 1.0);
        }
    }

    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.scissor = Some((x, y, width, height));
        if let Some(pass) = self.pass.as_mut() {
            pass.set_scissor_rect(x, y, width, height);
        }
    }

    fn set_vertex_buffer(&mut self, buffer: &VertexBuffer) {
        match buffer.id() {
            Some(id) => {
                self.vertex = Some(BoundVertexBuffer {
                    id,
                    attributes: buffer.attributes(),
                })
            }
            None => log::warn!("WgpuFrameContext: ignoring destroyed vertex buffer"),
        }
    }

    fn set_index_buffer(&mut self, buffer: &IndexBuffer) {
        match buffer.id() {
            Some(id) => self.index = Some((id, buffer.stride())),
            None => log::warn!("WgpuFrameContext: ignoring destroyed index buffer"),
        }
    }

    fn set_uniform_buffer(&mut self, slot: u32, buffer: &UniformBuffer) {
        match buffer.id() {
            Some(id) => {
                self.uniforms.insert(slot, id);
            }
            None => log::warn!("WgpuFrameContext: ignoring destroyed uniform buffer"),
        }
    }

    fn set_texture(&mut self, slot: u32, texture: &Texture2D) {
        match texture.view() {
            Some(view) => {
                self.texture_views.insert(slot, view);
            }
            None => log::warn!("WgpuFrameContext: ignoring destroyed texture"),
        }
    }

    fn set_texture_view(&mut self, slot: u32, view: TextureViewId) {
        self.texture_views.insert(slot, view);
    }

    fn set_sampler(&mut self, slot: u32, mode: SamplerMode) {
        self.samplers.insert(slot, mode);
    }

    fn set_storage_buffer(&mut self, slot: u32, buffer: &VertexBuffer) {
        match buffer.id() {
            Some(id) => {
                self.storage_buffers.insert(slot, id);
            }
            None => log::warn!("WgpuFrameContext: ignoring destroyed storage buffer"),
        }
    }

    fn set_shaders(&mut self, shaders: &ShaderSet) {
        self.shaders = Some(BoundShaders {
            label: shaders.label.clone(),
            module: shaders.module,
            vertex_entry: shaders.vertex_entry.clone(),
            fragment_entry: shaders.fragment_entry.clone(),
            attributes: shaders.vertex_attributes(),
            bindings: shaders.reflection.bindings.clone(),
        });
    }

    fn set_compute_shader(&mut self, shader: &ComputeShader) {
        self.compute = Some(BoundCompute {
            label: shader.label.clone(),
            module: shader.module,
            entry: shader.entry.clone(),
            bindings: shader.reflection.bindings.clone(),
        });
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn set_depth_mode(&mut self, mode: DepthMode) {
        self.depth_mode = mode;
    }

    fn set_raster_mode(&mut self, mode: RasterMode) {
        self.raster = mode;
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.topology = topology;
    }

    fn draw(&mut self, vertices: Range<u32>) -> Result<(), RenderError> {
        self.prepare_draw(false)?;
        if let Some(pass) = self.pass.as_mut() {
            pass.draw(vertices, 0..1);
        }
        Ok(())
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32) -> Result<(), RenderError> {
        self.prepare_draw(true)?;
        if let Some(pass) = self.pass.as_mut() {
            pass.draw_indexed(indices, base_vertex, 0..1);
        }
        Ok(())
    }

    fn draw_indexed_instanced(
        &mut self,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> Result<(), RenderError> {
        self.prepare_draw(true)?;
        if let Some(pass) = self.pass.as_mut() {
            pass.draw_indexed(indices, base_vertex, instances);
        }
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), RenderError> {
        let compute = self
            .compute
            .as_ref()
            .ok_or_else(|| {
                RenderError::Internal("dispatch issued with no compute shader bound".to_string())
            })?
            .clone();

        let pipeline = self.pipelines.get_or_create_compute(&self.device, &compute)?;
        let resolved = self.resolve_bindings(&compute.label, &compute.bindings)?;
        let bind_group_layout = self.pipelines.bind_group_layout(
            &self.device,
            compute.module,
            &compute.label,
            &compute.bindings,
            wgpu::ShaderStages::COMPUTE,
        )?;
        let bind_group = self.build_bind_group(&compute.label, &bind_group_layout, &resolved)?;

        self.end_pass();
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| RenderError::Internal("frame context already finished".to_string()))?;
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&format!("{} Pass", compute.label)),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(x, y, z);
        Ok(())
    }

    fn update_buffer(&mut self, id: BufferId, data: &[u8]) -> Result<(), ResourceError> {
        self.device.write_buffer(id, 0, data)
    }
}
