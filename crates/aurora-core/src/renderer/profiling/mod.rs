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

//! GPU timestamp profiling.
//!
//! The profiler core is a pure state machine: it allocates timestamp slots
//! from a ring, tracks scope nesting through a stack, queues finished frames,
//! and reconstructs a scope tree once a frame's results are old enough to be
//! read without stalling the GPU. Query recording and readback go through
//! the [`TimestampQueryBackend`] trait, so the whole state machine is
//! testable against a fake backend.

mod profiler;
mod ring;

pub use profiler::{
    CalibrationData, GpuProfiler, ProfilerConfig, ScopeTreeNode, TimestampQueryBackend,
    WHOLE_FRAME_LABEL,
};
pub use ring::Ring;
