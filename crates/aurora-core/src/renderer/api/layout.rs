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

//! Vertex input layouts and the layout cache.
//!
//! A layout describes how the attributes a shader consumes map into an
//! interleaved vertex buffer. Layouts are keyed by the (mesh, shader)
//! attribute-set pair and cached for the lifetime of the manager.

use super::vertex::{vertex_stride, VertexAttributeKind, VertexAttributes, VertexFormat};
use crate::renderer::error::ShaderError;
use std::collections::HashMap;

/// One attribute of a vertex input layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexInputElement {
    /// The attribute this element feeds.
    pub kind: VertexAttributeKind,
    /// The data format of the element.
    pub format: VertexFormat,
    /// The byte offset of the element from the start of the vertex.
    pub offset: u32,
    /// The shader input location this element is bound to.
    pub shader_location: u32,
}

/// The full input layout for one interleaved vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInputLayout {
    /// The elements the shader consumes, in canonical attribute order.
    pub elements: Vec<VertexInputElement>,
    /// The byte stride of the vertex buffer.
    pub stride: u32,
}

impl VertexInputLayout {
    /// Builds the layout for a mesh carrying `mesh_attrs`, consumed by a
    /// shader reading `shader_attrs`.
    ///
    /// Offsets walk the mesh attributes in canonical order; mesh attributes
    /// the shader ignores still advance the offset but produce no element.
    /// Shader locations are assigned by canonical rank within the shader's
    /// consumed set, matching the location convention of reflected shaders.
    ///
    /// ## Returns
    /// * `Err(ShaderError::MissingAttribute)` if the shader consumes an
    ///   attribute the mesh does not provide.
    pub fn build(
        mesh_attrs: VertexAttributes,
        shader_attrs: VertexAttributes,
    ) -> Result<Self, ShaderError> {
        if let Some(missing) = shader_attrs.difference(mesh_attrs).kinds().next() {
            return Err(ShaderError::MissingAttribute { attribute: missing });
        }

        let mut elements = Vec::new();
        let mut offset = 0u32;
        let mut location = 0u32;
        for kind in mesh_attrs.kinds() {
            if shader_attrs.contains(kind.flag()) {
                elements.push(VertexInputElement {
                    kind,
                    format: kind.format(),
                    offset,
                    shader_location: location,
                });
                location += 1;
            }
            offset += kind.size_bytes();
        }

        debug_assert_eq!(offset, vertex_stride(mesh_attrs));
        Ok(VertexInputLayout {
            elements,
            stride: offset,
        })
    }
}

/// Caches built layouts by the (mesh, shader) attribute-set pair.
///
/// Entries are never evicted; the population is bounded by the number of
/// distinct attribute-set pairs the application actually uses.
#[derive(Debug, Default)]
pub struct VertexLayoutManager {
    layouts: HashMap<u64, VertexInputLayout>,
}

/// The composite cache key. A cached entry is reused only when both halves
/// match: the mesh attribute set in the low bits, the shader's consumed set
/// in the high bits.
fn layout_key(mesh_attrs: VertexAttributes, shader_attrs: VertexAttributes) -> u64 {
    mesh_attrs.bits() as u64 | ((shader_attrs.bits() as u64) << 32)
}

impl VertexLayoutManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached layout for the pair, building it on first use.
    pub fn get_or_create(
        &mut self,
        mesh_attrs: VertexAttributes,
        shader_attrs: VertexAttributes,
    ) -> Result<&VertexInputLayout, ShaderError> {
        let key = layout_key(mesh_attrs, shader_attrs);
        if !self.layouts.contains_key(&key) {
            let layout = VertexInputLayout::build(mesh_attrs, shader_attrs)?;
            log::debug!(
                "VertexLayoutManager: built layout for mesh {mesh_attrs:?} / shader {shader_attrs:?} ({} elements, stride {})",
                layout.elements.len(),
                layout.stride
            );
            self.layouts.insert(key, layout);
        }
        Ok(&self.layouts[&key])
    }

    /// The stable cache key for a (mesh, shader) pair, usable by callers
    /// that key their own caches (e.g. pipeline caches) off layouts.
    pub fn key(mesh_attrs: VertexAttributes, shader_attrs: VertexAttributes) -> u64 {
        layout_key(mesh_attrs, shader_attrs)
    }

    /// The number of cached layouts.
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_assigns_cumulative_offsets() {
        let mesh = VertexAttributes::POSITION
            | VertexAttributes::NORMAL
            | VertexAttributes::TEXCOORD0;
        let layout = VertexInputLayout::build(mesh, mesh).unwrap();
        assert_eq!(layout.stride, 32);
        assert_eq!(layout.elements.len(), 3);
        assert_eq!(layout.elements[0].offset, 0);
        assert_eq!(layout.elements[1].offset, 12);
        assert_eq!(layout.elements[2].offset, 24);
        assert_eq!(layout.elements[2].kind, VertexAttributeKind::TexCoord0);
    }

    #[test]
    fn unconsumed_mesh_attributes_advance_offsets() {
        let mesh = VertexAttributes::POSITION
            | VertexAttributes::NORMAL
            | VertexAttributes::TEXCOORD0;
        // The shader ignores the normal; the texcoord offset must still
        // account for it, and locations must stay dense.
        let shader = VertexAttributes::POSITION | VertexAttributes::TEXCOORD0;
        let layout = VertexInputLayout::build(mesh, shader).unwrap();
        assert_eq!(layout.stride, 32);
        assert_eq!(layout.elements.len(), 2);
        assert_eq!(layout.elements[1].offset, 24);
        assert_eq!(layout.elements[0].shader_location, 0);
        assert_eq!(layout.elements[1].shader_location, 1);
    }

    #[test]
    fn build_rejects_missing_attribute() {
        let mesh = VertexAttributes::POSITION;
        let shader = VertexAttributes::POSITION | VertexAttributes::NORMAL;
        let err = VertexInputLayout::build(mesh, shader).unwrap_err();
        match err {
            ShaderError::MissingAttribute { attribute } => {
                assert_eq!(attribute, VertexAttributeKind::Normal)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cache_reuses_entry_for_same_pair() {
        let mut manager = VertexLayoutManager::new();
        let mesh = VertexAttributes::POSITION | VertexAttributes::COLOR;
        manager.get_or_create(mesh, mesh).unwrap();
        manager.get_or_create(mesh, mesh).unwrap();
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn cache_distinguishes_pairs_sharing_one_half() {
        // Two shaders over the same mesh must not alias in the cache, and
        // neither must two meshes under the same shader. Only a match on
        // both halves of the key may hit.
        let mut manager = VertexLayoutManager::new();
        let mesh = VertexAttributes::POSITION
            | VertexAttributes::NORMAL
            | VertexAttributes::TEXCOORD0;
        let shader_a = VertexAttributes::POSITION | VertexAttributes::TEXCOORD0;
        let shader_b = VertexAttributes::POSITION | VertexAttributes::NORMAL;

        let a = manager.get_or_create(mesh, shader_a).unwrap().clone();
        let b = manager.get_or_create(mesh, shader_b).unwrap().clone();
        assert_ne!(a, b);
        assert_eq!(manager.len(), 2);

        let mesh_small = VertexAttributes::POSITION | VertexAttributes::TEXCOORD0;
        let c = manager
            .get_or_create(mesh_small, shader_a)
            .unwrap()
            .clone();
        assert_ne!(a, c, "same shader over a different mesh must rebuild");
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn key_halves_do_not_collide() {
        let a = VertexAttributes::POSITION;
        let b = VertexAttributes::NORMAL;
        assert_ne!(VertexLayoutManager::key(a, b), VertexLayoutManager::key(b, a));
    }
}
