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

use std::sync::Arc;

use anyhow::{anyhow, Result};
use wgpu::{Adapter, Features, Instance};
use winit::dpi::PhysicalSize;
use winit::window::Window;

/// The surface-bound half of the backend: the swap chain, the logical
/// device, and its queue. Everything here is tied to one window.
#[derive(Debug)]
pub struct WgpuSurfaceContext {
    pub surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface_config: wgpu::SurfaceConfiguration,
    pub adapter_name: String,
    pub active_device_features: wgpu::Features,
}

/// Prefers an sRGB swap chain format when the adapter offers one.
fn pick_surface_format(caps: &wgpu::SurfaceCapabilities) -> wgpu::TextureFormat {
    caps.formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .unwrap_or(caps.formats[0])
}

/// Mailbox when available (low latency without tearing), otherwise Fifo,
/// which every adapter must support.
fn pick_present_mode(caps: &wgpu::SurfaceCapabilities) -> wgpu::PresentMode {
    if caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
        wgpu::PresentMode::Mailbox
    } else {
        wgpu::PresentMode::Fifo
    }
}

impl WgpuSurfaceContext {
    /// The features requested when the adapter has them. The timestamp pair
    /// drives the GPU profiler: `TIMESTAMP_QUERY` for the query sets, and
    /// the encoder variant so timestamps can be written between passes,
    /// which is where profiler scope boundaries land. `POLYGON_MODE_LINE`
    /// backs the wireframe raster template.
    const WANTED_FEATURES: Features = Features::TIMESTAMP_QUERY
        .union(Features::TIMESTAMP_QUERY_INSIDE_ENCODERS)
        .union(Features::POLYGON_MODE_LINE);

    /// Builds the surface, logical device, and swap chain configuration
    /// for `window` on the given pre-selected adapter.
    pub async fn new(
        instance: &Instance,
        window: Arc<Window>,
        adapter: Adapter,
        window_size: PhysicalSize<u32>,
    ) -> Result<Self> {
        let surface = instance
            .create_surface(window)
            .map_err(|e| anyhow!("surface creation failed: {e}"))?;

        let info = adapter.get_info();
        log::info!(
            "WgpuSurfaceContext: adapter \"{}\" on {:?}",
            info.name,
            info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Aurora Logical Device"),
                required_features: adapter.features() & Self::WANTED_FEATURES,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!("device request failed: {e}"))?;

        device.on_uncaptured_error(Arc::new(|e| {
            if matches!(e, wgpu::Error::OutOfMemory { .. }) {
                log::error!("WGPU ran out of memory: {e}. Aborting.");
                std::process::abort();
            }
            log::error!("WGPU uncaptured error: {e:?}");
        }));

        let active_device_features = device.features();
        log::debug!("WgpuSurfaceContext: active features {active_device_features:?}");

        let caps = surface.get_capabilities(&adapter);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: pick_surface_format(&caps),
            width: window_size.width.max(1),
            height: window_size.height.max(1),
            present_mode: pick_present_mode(&caps),
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        log::info!(
            "WgpuSurfaceContext: swap chain {:?} {}x{} ({:?})",
            surface_config.format,
            surface_config.width,
            surface_config.height,
            surface_config.present_mode,
        );

        Ok(Self {
            surface,
            adapter,
            device,
            queue,
            surface_config,
            adapter_name: info.name,
            active_device_features,
        })
    }

    /// Reconfigures the swap chain for a new window size. Zero sizes are
    /// rejected; configuring a zero-sized surface is a validation error.
    pub fn resize(&mut self, new_width: u32, new_height: u32) {
        if new_width == 0 || new_height == 0 {
            log::warn!("WgpuSurfaceContext: ignoring zero-sized resize");
            return;
        }
        self.surface_config.width = new_width;
        self.surface_config.height = new_height;
        self.surface.configure(&self.device, &self.surface_config);
        log::debug!("WgpuSurfaceContext: swap chain resized to {new_width}x{new_height}");
    }

    /// Acquires the next swap chain texture.
    pub fn get_current_texture(&self) -> wgpu::CurrentSurfaceTexture {
        self.surface.get_current_texture()
    }

    /// Whether the device can record GPU timestamps through the profiler.
    pub fn timestamps_supported(&self) -> bool {
        self.active_device_features
            .contains(Features::TIMESTAMP_QUERY | Features::TIMESTAMP_QUERY_INSIDE_ENCODERS)
    }

    /// The swap chain dimensions in physical pixels.
    pub fn get_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }
}
