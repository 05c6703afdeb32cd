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

//! Defines data structures related to GPU buffer resources.

use std::borrow::Cow;

/// Describes how a buffer's contents move between CPU and GPU over its lifetime.
///
/// The backend uses this to pick usage flags and memory placement; the driver
/// uses those to place the buffer in the most appropriate memory type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsageMode {
    /// Written once at creation with initial data, never updated.
    Immutable,
    /// GPU-resident; updatable through copy operations, but not meant for
    /// per-frame CPU writes.
    Default,
    /// Updated from the CPU frequently, typically every frame.
    Dynamic,
    /// Writable from shaders. The buffer also carries a raw storage view
    /// addressing its contents as 4-byte elements.
    GpuWrite,
}

/// What a buffer is bound as in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

/// The element width of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexStride {
    U16,
    U32,
}

impl IndexStride {
    /// The size of one index in bytes.
    pub const fn size_bytes(self) -> u64 {
        match self {
            IndexStride::U16 => 2,
            IndexStride::U32 => 4,
        }
    }
}

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label for the buffer.
    pub label: Option<Cow<'a, str>>,
    /// The total size of the buffer in bytes.
    pub size: u64,
    /// How the buffer's contents are updated over its lifetime.
    pub mode: BufferUsageMode,
    /// What the buffer is bound as.
    pub kind: BufferKind,
}

/// An opaque handle to a GPU buffer resource.
///
/// This ID is returned by [`GraphicsDevice::create_buffer`] and is used to
/// reference the buffer in all subsequent operations.
///
/// [`GraphicsDevice::create_buffer`]: crate::renderer::traits::GraphicsDevice::create_buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_stride_sizes() {
        assert_eq!(IndexStride::U16.size_bytes(), 2);
        assert_eq!(IndexStride::U32.size_bytes(), 4);
    }
}
