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

//! The WGPU rendering backend.
//!
//! [`GraphicsCore`] owns the surface, logical device, pipeline caches and the
//! profiler; per frame it hands out a [`WgpuFrameContext`] that implements the
//! command-recording interface of `aurora-core`.

mod command;
mod context;
mod conversions;
mod device;
mod overlay;
mod query;
mod system;

pub use command::WgpuFrameContext;
pub use context::WgpuSurfaceContext;
pub use device::WgpuDevice;
pub use overlay::{OverlayConfig, OverlayRenderer};
pub use query::WgpuQueryPool;
pub use system::GraphicsCore;
