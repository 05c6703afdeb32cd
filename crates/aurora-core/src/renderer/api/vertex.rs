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

//! Vertex attribute kinds, attribute sets, and stride computation.
//!
//! Attributes have a fixed canonical order. Interleaved vertex data is always
//! laid out in that order, so the stride of a vertex and the offsets of its
//! attributes follow directly from the attribute set.

use bitflags::bitflags;

/// A single vertex attribute, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeKind {
    /// Object-space position, three `f32`.
    Position,
    /// Surface normal, three `f32`.
    Normal,
    /// Linear color, four `f32`.
    Color,
    /// Packed color, four `u8` (normalized in the shader).
    ByteColor,
    /// First texture coordinate set, two `f32`.
    TexCoord0,
    /// Second texture coordinate set, two `f32`.
    TexCoord1,
    /// Third texture coordinate set, two `f32`.
    TexCoord2,
    /// Fourth texture coordinate set, two `f32`.
    TexCoord3,
    /// Tangent vector, three `f32`.
    Tangent,
    /// Bitangent vector, three `f32`.
    Bitangent,
}

/// All attribute kinds in canonical order. Layout building and stride
/// computation both walk this array, which keeps them in agreement.
pub const CANONICAL_ATTRIBUTE_ORDER: [VertexAttributeKind; 10] = [
    VertexAttributeKind::Position,
    VertexAttributeKind::Normal,
    VertexAttributeKind::Color,
    VertexAttributeKind::ByteColor,
    VertexAttributeKind::TexCoord0,
    VertexAttributeKind::TexCoord1,
    VertexAttributeKind::TexCoord2,
    VertexAttributeKind::TexCoord3,
    VertexAttributeKind::Tangent,
    VertexAttributeKind::Bitangent,
];

impl VertexAttributeKind {
    /// The size of this attribute in an interleaved vertex, in bytes.
    pub const fn size_bytes(self) -> u32 {
        match self {
            VertexAttributeKind::Position => 12,
            VertexAttributeKind::Normal => 12,
            VertexAttributeKind::Color => 16,
            VertexAttributeKind::ByteColor => 4,
            VertexAttributeKind::TexCoord0 => 8,
            VertexAttributeKind::TexCoord1 => 8,
            VertexAttributeKind::TexCoord2 => 8,
            VertexAttributeKind::TexCoord3 => 8,
            VertexAttributeKind::Tangent => 12,
            VertexAttributeKind::Bitangent => 12,
        }
    }

    /// The data format of this attribute.
    pub const fn format(self) -> VertexFormat {
        match self {
            VertexAttributeKind::Position => VertexFormat::Float32x3,
            VertexAttributeKind::Normal => VertexFormat::Float32x3,
            VertexAttributeKind::Color => VertexFormat::Float32x4,
            VertexAttributeKind::ByteColor => VertexFormat::Unorm8x4,
            VertexAttributeKind::TexCoord0 => VertexFormat::Float32x2,
            VertexAttributeKind::TexCoord1 => VertexFormat::Float32x2,
            VertexAttributeKind::TexCoord2 => VertexFormat::Float32x2,
            VertexAttributeKind::TexCoord3 => VertexFormat::Float32x2,
            VertexAttributeKind::Tangent => VertexFormat::Float32x3,
            VertexAttributeKind::Bitangent => VertexFormat::Float32x3,
        }
    }

    /// The flag bit for this attribute inside a [`VertexAttributes`] set.
    pub const fn flag(self) -> VertexAttributes {
        match self {
            VertexAttributeKind::Position => VertexAttributes::POSITION,
            VertexAttributeKind::Normal => VertexAttributes::NORMAL,
            VertexAttributeKind::Color => VertexAttributes::COLOR,
            VertexAttributeKind::ByteColor => VertexAttributes::BYTE_COLOR,
            VertexAttributeKind::TexCoord0 => VertexAttributes::TEXCOORD0,
            VertexAttributeKind::TexCoord1 => VertexAttributes::TEXCOORD1,
            VertexAttributeKind::TexCoord2 => VertexAttributes::TEXCOORD2,
            VertexAttributeKind::TexCoord3 => VertexAttributes::TEXCOORD3,
            VertexAttributeKind::Tangent => VertexAttributes::TANGENT,
            VertexAttributeKind::Bitangent => VertexAttributes::BITANGENT,
        }
    }
}

bitflags! {
    /// A set of vertex attributes, one bit per [`VertexAttributeKind`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VertexAttributes: u32 {
        const POSITION   = 1 << 0;
        const NORMAL     = 1 << 1;
        const COLOR      = 1 << 2;
        const BYTE_COLOR = 1 << 3;
        const TEXCOORD0  = 1 << 4;
        const TEXCOORD1  = 1 << 5;
        const TEXCOORD2  = 1 << 6;
        const TEXCOORD3  = 1 << 7;
        const TANGENT    = 1 << 8;
        const BITANGENT  = 1 << 9;
    }
}

impl VertexAttributes {
    /// Iterates over the kinds present in this set, in canonical order.
    pub fn kinds(self) -> impl Iterator<Item = VertexAttributeKind> {
        CANONICAL_ATTRIBUTE_ORDER
            .into_iter()
            .filter(move |kind| self.contains(kind.flag()))
    }
}

/// Computes the byte stride of an interleaved vertex carrying the given
/// attribute set. The result always equals the end offset produced by
/// layout building, since both walk [`CANONICAL_ATTRIBUTE_ORDER`].
pub fn vertex_stride(attributes: VertexAttributes) -> u32 {
    attributes.kinds().map(|kind| kind.size_bytes()).sum()
}

/// The data format of a single vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_sizes_match_formats() {
        for kind in CANONICAL_ATTRIBUTE_ORDER {
            let expected = match kind.format() {
                VertexFormat::Float32x2 => 8,
                VertexFormat::Float32x3 => 12,
                VertexFormat::Float32x4 => 16,
                VertexFormat::Unorm8x4 => 4,
            };
            assert_eq!(kind.size_bytes(), expected, "{kind:?}");
        }
    }

    #[test]
    fn stride_of_empty_set_is_zero() {
        assert_eq!(vertex_stride(VertexAttributes::empty()), 0);
    }

    #[test]
    fn stride_sums_present_attributes() {
        let attrs = VertexAttributes::POSITION
            | VertexAttributes::NORMAL
            | VertexAttributes::TEXCOORD0;
        assert_eq!(vertex_stride(attrs), 12 + 12 + 8);

        let all = VertexAttributes::all();
        assert_eq!(vertex_stride(all), 12 + 12 + 16 + 4 + 8 * 4 + 12 + 12);
    }

    #[test]
    fn kinds_iterate_in_canonical_order() {
        let attrs = VertexAttributes::BITANGENT
            | VertexAttributes::POSITION
            | VertexAttributes::BYTE_COLOR;
        let kinds: Vec<_> = attrs.kinds().collect();
        assert_eq!(
            kinds,
            vec![
                VertexAttributeKind::Position,
                VertexAttributeKind::ByteColor,
                VertexAttributeKind::Bitangent,
            ]
        );
    }
}
