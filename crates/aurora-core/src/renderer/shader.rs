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

//! Shader modules, WGSL reflection, and shader sets.
//!
//! Reflection runs on the WGSL source through naga and extracts two things:
//! the vertex attributes the vertex stage consumes (matched by input name),
//! and the named resource bindings of the module. The backend uses the
//! former to build vertex input layouts and the latter to build bind group
//! layouts without any per-pipeline annotation.

use crate::renderer::api::vertex::{VertexAttributeKind, VertexAttributes};
use crate::renderer::error::ShaderError;
use crate::renderer::traits::GraphicsDevice;
use std::borrow::Cow;

/// An opaque handle to a compiled shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderModuleId(pub usize);

/// A descriptor used to create a [`ShaderModuleId`].
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    /// An optional debug label for the module.
    pub label: Option<Cow<'a, str>>,
    /// The WGSL source text.
    pub source: Cow<'a, str>,
}

/// What a reflected resource binding is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Uniform,
    Storage { read_only: bool },
    Texture,
    Sampler { comparison: bool },
}

/// One reflected resource binding of a shader module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSlot {
    /// The WGSL variable name.
    pub name: String,
    /// The bind group index.
    pub group: u32,
    /// The binding number within the group.
    pub binding: u32,
    /// What the binding is bound as.
    pub kind: BindingKind,
}

/// The reflection data extracted from a WGSL module.
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    /// The vertex attributes the vertex entry point consumes.
    pub vertex_attributes: VertexAttributes,
    /// The resource bindings of the module, in declaration order.
    pub bindings: Vec<BindingSlot>,
}

impl ShaderReflection {
    /// Looks up a binding by its WGSL variable name.
    pub fn binding(&self, name: &str) -> Option<&BindingSlot> {
        self.bindings.iter().find(|slot| slot.name == name)
    }
}

/// Maps a vertex-stage input name to the attribute it consumes.
///
/// Unrecognized names are reported as `None`; reflection warns about them
/// and leaves them out of the consumed set.
fn attribute_for_input_name(name: &str) -> Option<VertexAttributeKind> {
    match name {
        "position" => Some(VertexAttributeKind::Position),
        "normal" => Some(VertexAttributeKind::Normal),
        "color" => Some(VertexAttributeKind::Color),
        "byte_color" => Some(VertexAttributeKind::ByteColor),
        "tex_coord0" | "uv0" | "uv" => Some(VertexAttributeKind::TexCoord0),
        "tex_coord1" | "uv1" => Some(VertexAttributeKind::TexCoord1),
        "tex_coord2" | "uv2" => Some(VertexAttributeKind::TexCoord2),
        "tex_coord3" | "uv3" => Some(VertexAttributeKind::TexCoord3),
        "tangent" => Some(VertexAttributeKind::Tangent),
        "bitangent" => Some(VertexAttributeKind::Bitangent),
        _ => None,
    }
}

/// Parses `source` and extracts the reflection data.
pub fn reflect_wgsl(label: &str, source: &str) -> Result<ShaderReflection, ShaderError> {
    let module =
        naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::CompilationError {
            label: label.to_string(),
            details: e.to_string(),
        })?;

    let mut vertex_attributes = VertexAttributes::empty();
    let mut vertex_inputs: Vec<VertexInput> = Vec::new();
    for entry in &module.entry_points {
        if entry.stage != naga::ShaderStage::Vertex {
            continue;
        }
        for argument in &entry.function.arguments {
            match &module.types[argument.ty].inner {
                naga::TypeInner::Struct { members, .. } => {
                    for member in members {
                        collect_vertex_input(
                            label,
                            member.name.as_deref(),
                            member.binding.as_ref(),
                            &mut vertex_attributes,
                            &mut vertex_inputs,
                        );
                    }
                }
                _ => collect_vertex_input(
                    label,
                    argument.name.as_deref(),
                    argument.binding.as_ref(),
                    &mut vertex_attributes,
                    &mut vertex_inputs,
                ),
            }
        }
    }

    // Layouts assign locations by canonical rank within the consumed set;
    // a shader numbering its inputs differently would bind silently wrong.
    for input in &vertex_inputs {
        let expected = vertex_attributes
            .kinds()
            .take_while(|kind| *kind != input.kind)
            .count() as u32;
        if input.location != expected {
            return Err(ShaderError::LocationMismatch {
                input: input.name.clone(),
                declared: input.location,
                expected,
            });
        }
    }

    let mut bindings = Vec::new();
    for (_, variable) in module.global_variables.iter() {
        let Some(resource) = &variable.binding else {
            continue;
        };
        let name = variable.name.clone().unwrap_or_default();
        let kind = match &module.types[variable.ty].inner {
            naga::TypeInner::Image { .. } => BindingKind::Texture,
            naga::TypeInner::Sampler { comparison } => BindingKind::Sampler {
                comparison: *comparison,
            },
            _ => match variable.space {
                naga::AddressSpace::Uniform => BindingKind::Uniform,
                naga::AddressSpace::Storage { access } => BindingKind::Storage {
                    read_only: !access.contains(naga::StorageAccess::STORE),
                },
                other => {
                    log::warn!(
                        "Shader '{label}': binding '{name}' has unexpected address space {other:?}, ignoring"
                    );
                    continue;
                }
            },
        };
        bindings.push(BindingSlot {
            name,
            group: resource.group,
            binding: resource.binding,
            kind,
        });
    }

    Ok(ShaderReflection {
        vertex_attributes,
        bindings,
    })
}

/// One recognized vertex-stage input and the `@location` it declared.
struct VertexInput {
    name: String,
    kind: VertexAttributeKind,
    location: u32,
}

fn collect_vertex_input(
    label: &str,
    name: Option<&str>,
    binding: Option<&naga::Binding>,
    attributes: &mut VertexAttributes,
    inputs: &mut Vec<VertexInput>,
) {
    // Builtins (vertex_index, instance_index, ...) are not vertex-buffer inputs.
    let Some(naga::Binding::Location { location, .. }) = binding else {
        return;
    };
    let Some(name) = name else {
        return;
    };
    match attribute_for_input_name(name) {
        Some(kind) => {
            *attributes |= kind.flag();
            inputs.push(VertexInput {
                name: name.to_string(),
                kind,
                location: *location,
            });
        }
        None => log::warn!("Shader '{label}': unrecognized vertex input '{name}', ignoring"),
    }
}

/// Finds the name of the first entry point with the given stage.
fn entry_point_name(
    label: &str,
    source: &str,
    stage: naga::ShaderStage,
) -> Result<Option<String>, ShaderError> {
    let module =
        naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::CompilationError {
            label: label.to_string(),
            details: e.to_string(),
        })?;
    Ok(module
        .entry_points
        .iter()
        .find(|entry| entry.stage == stage)
        .map(|entry| entry.name.clone()))
}

/// A vertex + optional fragment stage pair compiled from one WGSL source,
/// with its reflection data precomputed.
#[derive(Debug)]
pub struct ShaderSet {
    /// A debug label, used in logs and pipeline labels.
    pub label: String,
    /// The compiled module holding both entry points.
    pub module: ShaderModuleId,
    /// The vertex entry point name.
    pub vertex_entry: String,
    /// The fragment entry point name, if the source has a fragment stage.
    pub fragment_entry: Option<String>,
    /// The reflection data of the module.
    pub reflection: ShaderReflection,
}

impl ShaderSet {
    /// Compiles `source` on `device` and reflects it.
    ///
    /// ## Returns
    /// * `Err(ShaderError::MissingEntryPoint)` if the source has no vertex
    ///   entry point.
    pub fn new(
        device: &dyn GraphicsDevice,
        label: &str,
        source: &str,
    ) -> Result<Self, ShaderError> {
        let reflection = reflect_wgsl(label, source)?;
        let vertex_entry = entry_point_name(label, source, naga::ShaderStage::Vertex)?
            .ok_or(ShaderError::MissingEntryPoint { stage: "vertex" })?;
        let fragment_entry = entry_point_name(label, source, naga::ShaderStage::Fragment)?;

        let module = device
            .create_shader_module(&ShaderModuleDescriptor {
                label: Some(Cow::Owned(label.to_string())),
                source: Cow::Owned(source.to_string()),
            })
            .map_err(|e| ShaderError::CompilationError {
                label: label.to_string(),
                details: e.to_string(),
            })?;

        log::debug!(
            "ShaderSet '{label}': vertex entry '{vertex_entry}', fragment entry {fragment_entry:?}, attributes {:?}",
            reflection.vertex_attributes
        );

        Ok(Self {
            label: label.to_string(),
            module,
            vertex_entry,
            fragment_entry,
            reflection,
        })
    }

    /// The vertex attributes the vertex stage consumes.
    pub fn vertex_attributes(&self) -> VertexAttributes {
        self.reflection.vertex_attributes
    }

    /// Releases the compiled module. The set must not be bound afterwards.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_shader_module(self.module) {
            log::warn!("ShaderSet '{}': destroy failed: {e}", self.label);
        }
    }
}

/// A compute stage compiled from one WGSL source.
#[derive(Debug)]
pub struct ComputeShader {
    /// A debug label, used in logs and pipeline labels.
    pub label: String,
    /// The compiled module.
    pub module: ShaderModuleId,
    /// The compute entry point name.
    pub entry: String,
    /// The reflection data of the module.
    pub reflection: ShaderReflection,
}

impl ComputeShader {
    /// Compiles `source` on `device` and reflects it.
    pub fn new(
        device: &dyn GraphicsDevice,
        label: &str,
        source: &str,
    ) -> Result<Self, ShaderError> {
        let reflection = reflect_wgsl(label, source)?;
        let entry = entry_point_name(label, source, naga::ShaderStage::Compute)?
            .ok_or(ShaderError::MissingEntryPoint { stage: "compute" })?;

        let module = device
            .create_shader_module(&ShaderModuleDescriptor {
                label: Some(Cow::Owned(label.to_string())),
                source: Cow::Owned(source.to_string()),
            })
            .map_err(|e| ShaderError::CompilationError {
                label: label.to_string(),
                details: e.to_string(),
            })?;

        Ok(Self {
            label: label.to_string(),
            module,
            entry,
            reflection,
        })
    }

    /// Releases the compiled module.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_shader_module(self.module) {
            log::warn!("ComputeShader '{}': destroy failed: {e}", self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIT_WGSL: &str = r#"
        struct VertexInput {
            @location(0) position: vec3<f32>,
            @location(1) normal: vec3<f32>,
            @location(2) tex_coord0: vec2<f32>,
        };

        struct VertexOutput {
            @builtin(position) clip_position: vec4<f32>,
            @location(0) world_normal: vec3<f32>,
            @location(1) uv: vec2<f32>,
        };

        struct FrameUniforms {
            view_proj: mat4x4<f32>,
        };

        @group(0) @binding(0) var<uniform> frame: FrameUniforms;
        @group(0) @binding(1) var albedo: texture_2d<f32>;
        @group(0) @binding(2) var albedo_sampler: sampler;

        @vertex
        fn vs_main(in: VertexInput) -> VertexOutput {
            var out: VertexOutput;
            out.clip_position = frame.view_proj * vec4<f32>(in.position, 1.0);
            out.world_normal = in.normal;
            out.uv = in.tex_coord0;
            return out;
        }

        @fragment
        fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
            return textureSample(albedo, albedo_sampler, in.uv);
        }
    "#;

    #[test]
    fn reflects_vertex_attributes_from_input_struct() {
        let reflection = reflect_wgsl("lit", LIT_WGSL).unwrap();
        assert_eq!(
            reflection.vertex_attributes,
            VertexAttributes::POSITION | VertexAttributes::NORMAL | VertexAttributes::TEXCOORD0
        );
    }

    #[test]
    fn reflects_named_bindings() {
        let reflection = reflect_wgsl("lit", LIT_WGSL).unwrap();
        let frame = reflection.binding("frame").unwrap();
        assert_eq!((frame.group, frame.binding), (0, 0));
        assert_eq!(frame.kind, BindingKind::Uniform);

        let albedo = reflection.binding("albedo").unwrap();
        assert_eq!(albedo.kind, BindingKind::Texture);

        let sampler = reflection.binding("albedo_sampler").unwrap();
        assert_eq!(sampler.kind, BindingKind::Sampler { comparison: false });

        assert!(reflection.binding("missing").is_none());
    }

    #[test]
    fn reflects_storage_access() {
        let source = r#"
            @group(0) @binding(0) var<storage, read> input: array<u32>;
            @group(0) @binding(1) var<storage, read_write> output: array<u32>;

            @compute @workgroup_size(64)
            fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
                output[id.x] = input[id.x];
            }
        "#;
        let reflection = reflect_wgsl("copy", source).unwrap();
        assert_eq!(
            reflection.binding("input").unwrap().kind,
            BindingKind::Storage { read_only: true }
        );
        assert_eq!(
            reflection.binding("output").unwrap().kind,
            BindingKind::Storage { read_only: false }
        );
    }

    #[test]
    fn out_of_order_locations_are_rejected() {
        let source = r#"
            struct VertexInput {
                @location(1) position: vec3<f32>,
                @location(0) color: vec4<f32>,
            };

            @vertex
            fn vs_main(in: VertexInput) -> @builtin(position) vec4<f32> {
                return vec4<f32>(in.position, 1.0) * in.color;
            }
        "#;
        let err = reflect_wgsl("swapped", source).unwrap_err();
        match err {
            ShaderError::LocationMismatch {
                input,
                declared,
                expected,
            } => {
                assert_eq!(input, "position");
                assert_eq!((declared, expected), (1, 0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_error_reports_label() {
        let err = reflect_wgsl("broken", "not wgsl at all").unwrap_err();
        match err {
            ShaderError::CompilationError { label, .. } => assert_eq!(label, "broken"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn entry_point_discovery() {
        let vertex = entry_point_name("lit", LIT_WGSL, naga::ShaderStage::Vertex).unwrap();
        assert_eq!(vertex.as_deref(), Some("vs_main"));
        let compute = entry_point_name("lit", LIT_WGSL, naga::ShaderStage::Compute).unwrap();
        assert!(compute.is_none());
    }
}
