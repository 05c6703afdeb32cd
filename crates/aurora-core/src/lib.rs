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

//! # Aurora Core
//!
//! Backend-agnostic rendering contracts for the Aurora engine.
//!
//! This crate defines the "common language" of the renderer: resource
//! descriptors and opaque handles, vertex layouts and their cache, the
//! pipeline-state templates, WGSL shader reflection, and the GPU profiler
//! state machine. Everything here is pure and testable without a GPU; the
//! `aurora-infra` crate provides the wgpu implementation of the traits
//! declared in [`renderer::traits`].

pub mod renderer;
