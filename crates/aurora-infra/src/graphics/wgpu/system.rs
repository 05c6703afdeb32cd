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

//! The top-level bootstrap tying the wgpu backend together.

use std::sync::{Arc, Mutex};

use winit::dpi::PhysicalSize;
use winit::window::Window;

use aurora_core::renderer::{
    ColorTarget, DepthTarget, GpuProfiler, GraphicsDevice, ProfilerConfig, RenderError,
    TextureFormat, TextureViewId, VertexLayoutManager,
};

use super::command::{WgpuFrameContext, WgpuPipelineCache};
use super::context::WgpuSurfaceContext;
use super::device::WgpuDevice;
use super::query::WgpuQueryPool;

/// Owns the device, surface, caches, and profiler, and hands out one
/// [`WgpuFrameContext`] per frame.
///
/// The lifecycle per frame is `begin_frame` (which acquires the back buffer
/// and opens the profiler frame), recording through [`ActiveFrame::ctx`],
/// then [`ActiveFrame::present`]. Readbacks from earlier frames are polled
/// at the start of `begin_frame`, so profiler results appear without any
/// extra pumping by the caller.
pub struct GraphicsCore {
    context: Arc<Mutex<WgpuSurfaceContext>>,
    device: WgpuDevice,
    queries: WgpuQueryPool,
    pipelines: WgpuPipelineCache,
    layouts: VertexLayoutManager,
    profiler: Option<GpuProfiler>,
    depth_target: Option<DepthTarget>,
    /// The abstract view over the swap chain texture, replaced every frame.
    current_frame_view: Option<TextureViewId>,
    width: u32,
    height: u32,
}

/// One frame being recorded. Dropping it without calling [`present`]
/// discards the frame's commands.
///
/// [`present`]: ActiveFrame::present
pub struct ActiveFrame<'a> {
    pub ctx: WgpuFrameContext<'a>,
    /// The swap chain view wrapped as a regular color target.
    pub back_buffer: ColorTarget,
    /// The depth target sized to the swap chain, absent only before the
    /// first successful resize.
    pub depth: Option<&'a DepthTarget>,
    surface_texture: wgpu::SurfaceTexture,
    device: WgpuDevice,
}

impl ActiveFrame<'_> {
    /// Closes the profiler frame, submits the recorded commands, and
    /// presents the back buffer.
    pub fn present(mut self) {
        self.ctx.frame_end_profiling();
        if let Some(buffer) = self.ctx.finish() {
            self.device.submit(buffer);
        }
        self.surface_texture.present();
    }
}

impl GraphicsCore {
    /// Brings up the whole backend against `window`, synchronously.
    pub fn init(window: Arc<Window>, profiler_config: ProfilerConfig) -> Result<Self, RenderError> {
        log::info!("GraphicsCore: initializing...");
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::new_without_display_handle());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .map_err(|e| RenderError::InitializationFailed(format!("no suitable adapter: {e}")))?;

        let context =
            pollster::block_on(WgpuSurfaceContext::new(&instance, window, adapter, size))
                .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        let (width, height) = context.get_size();

        let timestamps = context.timestamps_supported();
        let (raw_device, raw_queue) = (context.device.clone(), context.queue.clone());
        let context = Arc::new(Mutex::new(context));
        let device = WgpuDevice::new(Arc::clone(&context));

        let queries = WgpuQueryPool::new(raw_device, raw_queue, &profiler_config);
        let profiler = if timestamps {
            Some(GpuProfiler::new(profiler_config))
        } else {
            log::info!("GraphicsCore: timestamp queries unavailable, GPU profiling disabled.");
            None
        };

        let mut core = Self {
            context,
            device,
            queries,
            pipelines: WgpuPipelineCache::new(),
            layouts: VertexLayoutManager::new(),
            profiler,
            depth_target: None,
            current_frame_view: None,
            width,
            height,
        };
        core.recreate_depth_target()?;
        log::info!("GraphicsCore: initialized at {width}x{height}.");
        Ok(core)
    }

    pub fn device(&self) -> &WgpuDevice {
        &self.device
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The scope tree of the most recently resolved frame, if profiling is
    /// enabled and a frame has completed its readback.
    pub fn last_frame_tree(&self) -> Option<&aurora_core::renderer::ScopeTreeNode> {
        self.profiler.as_ref().and_then(|p| p.last_frame_tree())
    }

    fn recreate_depth_target(&mut self) -> Result<(), RenderError> {
        if let Some(mut old) = self.depth_target.take() {
            old.destroy(&self.device);
        }
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }
        self.depth_target = Some(
            DepthTarget::create(&self.device, "Main Depth Target", self.width, self.height)
                .map_err(RenderError::ResourceError)?,
        );
        Ok(())
    }

    /// Reconfigures the surface and depth target. Zero sizes are ignored.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            log::warn!(
                "GraphicsCore: ignoring resize to zero size ({}, {})",
                new_size.width,
                new_size.height
            );
            return;
        }
        self.width = new_size.width;
        self.height = new_size.height;
        if let Ok(mut context) = self.context.lock() {
            context.resize(self.width, self.height);
        }
        if let Err(e) = self.recreate_depth_target() {
            log::warn!("GraphicsCore: failed to recreate depth target on resize: {e}");
        }
    }

    /// Acquires the next back buffer and opens a frame on it.
    pub fn begin_frame(&mut self) -> Result<ActiveFrame<'_>, RenderError> {
        // Pump map_async callbacks from earlier frames, and kick off the
        // maps for captures submitted last frame.
        self.device.poll_device_non_blocking();
        self.queries.schedule_maps();

        let surface_texture = loop {
            let mut context = self.context.lock().map_err(|e| {
                RenderError::Internal(format!("surface context mutex poisoned: {e}"))
            })?;
            match context.get_current_texture() {
                wgpu::CurrentSurfaceTexture::Success(texture)
                | wgpu::CurrentSurfaceTexture::Suboptimal(texture) => break texture,
                e @ wgpu::CurrentSurfaceTexture::Lost
                | e @ wgpu::CurrentSurfaceTexture::Outdated => {
                    if self.width > 0 && self.height > 0 {
                        log::warn!(
                            "GraphicsCore: surface lost or outdated ({e:?}), reconfiguring to {}x{}",
                            self.width,
                            self.height
                        );
                        context.resize(self.width, self.height);
                    } else {
                        return Err(RenderError::SurfaceAcquisitionFailed(format!(
                            "surface lost/outdated ({e:?}) with zero stored size"
                        )));
                    }
                }
                e => {
                    return Err(RenderError::SurfaceAcquisitionFailed(format!("{e:?}")));
                }
            }
        };

        if let Some(old) = self.current_frame_view.take() {
            if let Err(e) = self.device.destroy_texture_view(old) {
                log::warn!("GraphicsCore: failed to destroy previous back buffer view: {e}");
            }
        }
        let view = self
            .device
            .register_surface_view(&surface_texture.texture, Some("Back Buffer View"))
            .map_err(RenderError::ResourceError)?;
        self.current_frame_view = Some(view);

        let format = self
            .device
            .surface_format()
            .unwrap_or(TextureFormat::Bgra8UnormSrgb);
        let back_buffer = ColorTarget::from_surface(view, format, self.width, self.height);

        let mut ctx = WgpuFrameContext::new(
            self.device.clone(),
            &mut self.queries,
            &mut self.pipelines,
            &mut self.layouts,
            self.profiler.as_mut(),
        )?;
        ctx.frame_begin_profiling();

        Ok(ActiveFrame {
            ctx,
            back_buffer,
            depth: self.depth_target.as_ref(),
            surface_texture,
            device: self.device.clone(),
        })
    }

    /// Drains outstanding GPU work so resources can be dropped safely.
    pub fn shutdown(&mut self) {
        log::info!("GraphicsCore: shutting down...");
        self.queries.shutdown();
        if let Some(mut depth) = self.depth_target.take() {
            depth.destroy(&self.device);
        }
        if let Some(view) = self.current_frame_view.take() {
            if let Err(e) = self.device.destroy_texture_view(view) {
                log::warn!("GraphicsCore: failed to destroy back buffer view: {e}");
            }
        }
        self.device.poll_device_blocking();
    }
}
