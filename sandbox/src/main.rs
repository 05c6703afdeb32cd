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

//! A small interactive sandbox: one spinning triangle, the egui overlay,
//! and the GPU profiler tree from a few frames back.

use std::sync::Arc;

use anyhow::Context as _;
use bytemuck::{Pod, Zeroable};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use aurora_core::renderer::{
    BufferUsageMode, GraphicsContext, ProfilerConfig, RenderError, ScopeTreeNode, ShaderSet,
    UniformBuffer, VertexAttributes, VertexBuffer,
};
use aurora_infra::graphics::wgpu::{GraphicsCore, OverlayConfig, OverlayRenderer, WgpuDevice};

const TRIANGLE_WGSL: &str = r#"
struct Globals {
    angle: f32,
    aspect: f32,
    _pad: vec2<f32>,
};

@group(0) @binding(0) var<uniform> globals: Globals;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let c = cos(globals.angle);
    let s = sin(globals.angle);
    let rotated = vec2<f32>(
        in.position.x * c - in.position.y * s,
        in.position.x * s + in.position.y * c,
    );
    var out: VertexOutput;
    out.clip_position = vec4<f32>(rotated.x / globals.aspect, rotated.y, in.position.z, 1.0);
    out.color = in.color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TriangleVertex {
    position: [f32; 3],
    color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TriangleGlobals {
    angle: f32,
    aspect: f32,
    _pad: [f32; 2],
}

/// The demo geometry and its shader.
struct TriangleScene {
    shaders: ShaderSet,
    vertices: VertexBuffer,
    globals: UniformBuffer,
}

impl TriangleScene {
    fn create(device: &WgpuDevice) -> Result<Self, RenderError> {
        let shaders = ShaderSet::new(device, "Triangle", TRIANGLE_WGSL)
            .map_err(|e| RenderError::ResourceError(e.into()))?;
        let data = [
            TriangleVertex {
                position: [0.0, 0.6, 0.0],
                color: [1.0, 0.2, 0.2, 1.0],
            },
            TriangleVertex {
                position: [-0.6, -0.5, 0.0],
                color: [0.2, 1.0, 0.2, 1.0],
            },
            TriangleVertex {
                position: [0.6, -0.5, 0.0],
                color: [0.2, 0.2, 1.0, 1.0],
            },
        ];
        let vertices = VertexBuffer::create(
            device,
            "Triangle Vertices",
            VertexAttributes::POSITION | VertexAttributes::COLOR,
            data.len() as u32,
            BufferUsageMode::Immutable,
            Some(bytemuck::cast_slice(&data)),
        )
        .map_err(RenderError::ResourceError)?;
        let globals = UniformBuffer::create(device, "Triangle Globals", 16)
            .map_err(RenderError::ResourceError)?;
        Ok(Self {
            shaders,
            vertices,
            globals,
        })
    }

    fn draw(
        &self,
        ctx: &mut dyn GraphicsContext,
        device: &WgpuDevice,
        angle: f32,
        aspect: f32,
    ) -> Result<(), RenderError> {
        let globals = TriangleGlobals {
            angle,
            aspect,
            _pad: [0.0; 2],
        };
        self.globals
            .update(device, bytemuck::bytes_of(&globals))
            .map_err(RenderError::ResourceError)?;
        ctx.set_shaders(&self.shaders);
        ctx.set_vertex_buffer(&self.vertices);
        ctx.set_uniform_buffer(0, &self.globals);
        ctx.draw(0..3)
    }

    fn destroy(&mut self, device: &WgpuDevice) {
        self.vertices.destroy(device);
        self.globals.destroy(device);
        self.shaders.destroy(device);
    }
}

struct SandboxApp {
    window: Option<Arc<Window>>,
    core: Option<GraphicsCore>,
    device: Option<WgpuDevice>,
    scene: Option<TriangleScene>,
    overlay: Option<OverlayRenderer>,
    egui_ctx: egui::Context,
    egui_state: Option<egui_winit::State>,
    start: std::time::Instant,
}

impl SandboxApp {
    fn new() -> Self {
        Self {
            window: None,
            core: None,
            device: None,
            scene: None,
            overlay: None,
            egui_ctx: egui::Context::default(),
            egui_state: None,
            start: std::time::Instant::now(),
        }
    }

    fn teardown(&mut self) {
        if let (Some(device), Some(mut scene)) = (self.device.clone(), self.scene.take()) {
            scene.destroy(&device);
        }
        if let (Some(device), Some(mut overlay)) = (self.device.clone(), self.overlay.take()) {
            overlay.destroy(&device);
        }
        if let Some(mut core) = self.core.take() {
            core.shutdown();
        }
        self.device = None;
        self.egui_state = None;
        self.window = None;
    }

    fn redraw(&mut self) {
        let (Some(window), Some(core), Some(device), Some(scene), Some(overlay), Some(egui_state)) = (
            self.window.as_ref(),
            self.core.as_mut(),
            self.device.as_ref(),
            self.scene.as_ref(),
            self.overlay.as_mut(),
            self.egui_state.as_mut(),
        ) else {
            return;
        };

        // Build the UI before opening the frame; the frame context borrows
        // the core mutably, so the profiler tree is cloned out first.
        let tree = core.last_frame_tree().cloned();
        let raw_input = egui_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::Window::new("GPU Profiler")
                .default_width(260.0)
                .show(ctx, |ui| match &tree {
                    Some(root) => show_scope(ui, root, 0),
                    None => {
                        ui.label("No resolved frame yet.");
                    }
                });
        });
        egui_state.handle_platform_output(window, full_output.platform_output);
        let primitives = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        if let Err(e) = overlay.update_textures(device, &full_output.textures_delta) {
            log::error!("overlay texture update failed: {e}");
        }

        let angle = self.start.elapsed().as_secs_f32();
        let mut frame = match core.begin_frame() {
            Ok(frame) => frame,
            Err(RenderError::SurfaceAcquisitionFailed(reason)) => {
                log::warn!("skipping frame: {reason}");
                return;
            }
            Err(e) => {
                log::error!("begin_frame failed: {e}");
                return;
            }
        };

        let width = frame.back_buffer.width();
        let height = frame.back_buffer.height();
        let aspect = width as f32 / height.max(1) as f32;

        frame.ctx.profile_begin("Scene");
        frame
            .ctx
            .set_render_targets(&[&frame.back_buffer], frame.depth);
        frame.ctx.clear_color([0.05, 0.05, 0.08, 1.0]);
        frame.ctx.clear_depth(1.0);
        frame
            .ctx
            .set_viewport(0.0, 0.0, width as f32, height as f32);
        if let Err(e) = scene.draw(&mut frame.ctx, device, angle, aspect) {
            log::error!("triangle draw failed: {e}");
        }
        frame.ctx.profile_end();

        frame.ctx.profile_begin("Overlay");
        if let Err(e) = overlay.render(
            &mut frame.ctx,
            device,
            &primitives,
            (width, height),
            full_output.pixels_per_point,
        ) {
            log::error!("overlay draw failed: {e}");
        }
        frame.ctx.profile_end();

        frame.present();
        overlay.free_textures(device, &full_output.textures_delta);
    }
}

fn show_scope(ui: &mut egui::Ui, node: &ScopeTreeNode, depth: usize) {
    ui.label(format!(
        "{}{}: {:.3} ms",
        "  ".repeat(depth),
        node.label,
        node.elapsed_ms
    ));
    for child in &node.children {
        show_scope(ui, child, depth + 1);
    }
}

impl ApplicationHandler for SandboxApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!("Creating window and graphics core...");
        let attributes = Window::default_attributes()
            .with_title("Aurora Sandbox")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("window creation failed: {e}");
                event_loop.exit();
                return;
            }
        };

        let core = match GraphicsCore::init(window.clone(), ProfilerConfig::default()) {
            Ok(core) => core,
            Err(e) => {
                log::error!("graphics initialization failed: {e}");
                event_loop.exit();
                return;
            }
        };
        let device = core.device().clone();

        let scene = match TriangleScene::create(&device) {
            Ok(scene) => scene,
            Err(e) => {
                log::error!("scene setup failed: {e}");
                event_loop.exit();
                return;
            }
        };
        let overlay = match OverlayRenderer::new(&device, OverlayConfig::default()) {
            Ok(overlay) => overlay,
            Err(e) => {
                log::error!("overlay setup failed: {e}");
                event_loop.exit();
                return;
            }
        };

        let egui_state = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            window.as_ref(),
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        self.window = Some(window);
        self.core = Some(core);
        self.device = Some(device);
        self.scene = Some(scene);
        self.overlay = Some(overlay);
        self.egui_state = Some(egui_state);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != id {
            return;
        }

        if let Some(egui_state) = self.egui_state.as_mut() {
            let response = egui_state.on_window_event(window, &event);
            if response.repaint {
                window.request_redraw();
            }
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Shutdown requested, exiting event loop...");
                self.teardown();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(core) = self.core.as_mut() {
                    core.resize(PhysicalSize::new(new_size.width, new_size.height));
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = EventLoop::new().context("failed to create the event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = SandboxApp::new();
    event_loop
        .run_app(&mut app)
        .context("the event loop exited with an error")?;
    Ok(())
}
