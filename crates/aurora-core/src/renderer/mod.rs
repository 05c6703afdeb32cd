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

//! Provides the public, backend-agnostic rendering contracts for the Aurora engine.
//!
//! This module defines the abstract traits (like [`GraphicsDevice`] and
//! [`GraphicsContext`]), the data structures (like [`BufferDescriptor`]),
//! and the error types that form the stable public API for rendering.
//! The 'how' is handled by a concrete backend in the `aurora-infra` crate,
//! which implements these traits over wgpu.

pub mod api;
pub mod error;
pub mod profiling;
pub mod shader;
pub mod traits;

// Re-export the most commonly used types at the `renderer` level for convenience.
pub use api::buffer::{BufferDescriptor, BufferId, BufferKind, BufferUsageMode, IndexStride};
pub use api::layout::{VertexInputElement, VertexInputLayout, VertexLayoutManager};
pub use api::resource::{
    ColorTarget, DepthTarget, IndexBuffer, Texture2D, UniformBuffer, VertexBuffer,
};
pub use api::state::{BlendMode, DepthMode, PrimitiveTopology, RasterMode, SamplerMode};
pub use api::texture::{
    Extent2D, SamplerId, TextureDescriptor, TextureFormat, TextureId, TextureUsage, TextureViewId,
};
pub use api::vertex::{vertex_stride, VertexAttributeKind, VertexAttributes, VertexFormat};
pub use error::{PipelineError, RenderError, ResourceError, ShaderError};
pub use profiling::{
    CalibrationData, GpuProfiler, ProfilerConfig, ScopeTreeNode, TimestampQueryBackend,
};
pub use shader::{BindingKind, BindingSlot, ComputeShader, ShaderModuleId, ShaderSet};
pub use traits::{GraphicsContext, GraphicsDevice};
