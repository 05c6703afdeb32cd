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

//! Pipeline-state templates: sampler, blend, depth, and rasterizer modes.
//!
//! Each mode is a small value enum with a pure `descriptor()` builder. The
//! backend realizes the descriptors into API objects lazily and caches them;
//! no state object is global.

/// The filtering applied when sampling a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// How texture coordinates outside `[0, 1]` are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// A comparison function, used for depth tests and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// A multiplier applied to a blend input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    DstAlpha,
}

/// How the scaled source and destination values are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Which faces of a triangle are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    Front,
    Back,
}

/// How polygons are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
}

/// The topology of the primitives fed to the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

// --- Sampler templates ---

/// The standard sampler configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerMode {
    PointWrap,
    PointClamp,
    LinearWrap,
    LinearClamp,
    LinearComparisonClamp,
    AnisotropicClamp,
    AnisotropicWrap,
}

/// Backend-agnostic description of a sampler object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerStateDescriptor {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mip_filter: FilterMode,
    pub address_mode: AddressMode,
    /// `Some` makes this a comparison sampler.
    pub compare: Option<CompareFunction>,
    /// Maximum anisotropy; `1` disables anisotropic filtering.
    pub anisotropy_clamp: u16,
}

impl SamplerMode {
    /// Builds the descriptor for this template.
    pub fn descriptor(self) -> SamplerStateDescriptor {
        let (filter, address) = match self {
            SamplerMode::PointWrap => (FilterMode::Nearest, AddressMode::Repeat),
            SamplerMode::PointClamp => (FilterMode::Nearest, AddressMode::ClampToEdge),
            SamplerMode::LinearWrap => (FilterMode::Linear, AddressMode::Repeat),
            SamplerMode::LinearClamp | SamplerMode::LinearComparisonClamp => {
                (FilterMode::Linear, AddressMode::ClampToEdge)
            }
            SamplerMode::AnisotropicClamp => (FilterMode::Linear, AddressMode::ClampToEdge),
            SamplerMode::AnisotropicWrap => (FilterMode::Linear, AddressMode::Repeat),
        };
        SamplerStateDescriptor {
            min_filter: filter,
            mag_filter: filter,
            mip_filter: filter,
            address_mode: address,
            compare: match self {
                SamplerMode::LinearComparisonClamp => Some(CompareFunction::LessEqual),
                _ => None,
            },
            anisotropy_clamp: match self {
                SamplerMode::AnisotropicClamp | SamplerMode::AnisotropicWrap => 16,
                _ => 1,
            },
        }
    }
}

// --- Blend templates ---

/// One blend equation: `op(src * src_factor, dst * dst_factor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponentDescriptor {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

/// Backend-agnostic description of the blend stage, or `None` for no blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendStateDescriptor {
    pub color: BlendComponentDescriptor,
    pub alpha: BlendComponentDescriptor,
}

/// The standard blend configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Source replaces destination.
    Opaque,
    /// Standard alpha blending.
    Translucent,
    /// Source is added on top of destination, scaled by source alpha.
    Additive,
    /// Destination is multiplied by source.
    Modulate,
    /// Source is subtracted from destination, scaled by source alpha.
    Subtract,
}

impl BlendMode {
    /// Builds the blend descriptor for this template. `None` means blending
    /// is disabled entirely (distinct from an identity blend equation).
    pub fn descriptor(self) -> Option<BlendStateDescriptor> {
        let component = |src, dst, op| BlendComponentDescriptor {
            src_factor: src,
            dst_factor: dst,
            operation: op,
        };
        match self {
            BlendMode::Opaque => None,
            BlendMode::Translucent => Some(BlendStateDescriptor {
                color: component(
                    BlendFactor::SrcAlpha,
                    BlendFactor::OneMinusSrcAlpha,
                    BlendOperation::Add,
                ),
                alpha: component(
                    BlendFactor::One,
                    BlendFactor::OneMinusSrcAlpha,
                    BlendOperation::Add,
                ),
            }),
            BlendMode::Additive => Some(BlendStateDescriptor {
                color: component(BlendFactor::SrcAlpha, BlendFactor::One, BlendOperation::Add),
                alpha: component(BlendFactor::SrcAlpha, BlendFactor::One, BlendOperation::Add),
            }),
            BlendMode::Modulate => Some(BlendStateDescriptor {
                color: component(BlendFactor::Dst, BlendFactor::Zero, BlendOperation::Add),
                alpha: component(BlendFactor::DstAlpha, BlendFactor::Zero, BlendOperation::Add),
            }),
            BlendMode::Subtract => Some(BlendStateDescriptor {
                color: component(
                    BlendFactor::SrcAlpha,
                    BlendFactor::One,
                    BlendOperation::ReverseSubtract,
                ),
                alpha: component(
                    BlendFactor::SrcAlpha,
                    BlendFactor::One,
                    BlendOperation::ReverseSubtract,
                ),
            }),
        }
    }
}

// --- Depth templates ---

/// Backend-agnostic description of the depth stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStateDescriptor {
    pub depth_test_enabled: bool,
    pub depth_write_enabled: bool,
    pub compare: CompareFunction,
}

/// The standard depth configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthMode {
    /// No depth test, no depth writes.
    Disabled,
    /// Test and write depth.
    ReadWrite,
    /// Test depth, never write it.
    ReadOnly,
    /// Test depth with a reversed comparison, never write it.
    ReadOnlyReversed,
}

impl DepthMode {
    /// Builds the depth descriptor for this template.
    pub fn descriptor(self) -> DepthStateDescriptor {
        match self {
            DepthMode::Disabled => DepthStateDescriptor {
                depth_test_enabled: false,
                depth_write_enabled: false,
                compare: CompareFunction::Always,
            },
            DepthMode::ReadWrite => DepthStateDescriptor {
                depth_test_enabled: true,
                depth_write_enabled: true,
                compare: CompareFunction::LessEqual,
            },
            DepthMode::ReadOnly => DepthStateDescriptor {
                depth_test_enabled: true,
                depth_write_enabled: false,
                compare: CompareFunction::LessEqual,
            },
            DepthMode::ReadOnlyReversed => DepthStateDescriptor {
                depth_test_enabled: true,
                depth_write_enabled: false,
                compare: CompareFunction::GreaterEqual,
            },
        }
    }
}

// --- Rasterizer templates ---

/// Backend-agnostic description of the rasterizer stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterStateDescriptor {
    pub cull_mode: Option<Face>,
    pub polygon_mode: PolygonMode,
}

/// The standard rasterizer configurations. Front faces are counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterMode {
    NoCull,
    BackFaceCull,
    FrontFaceCull,
    Wireframe,
}

impl RasterMode {
    /// Builds the rasterizer descriptor for this template.
    pub fn descriptor(self) -> RasterStateDescriptor {
        match self {
            RasterMode::NoCull => RasterStateDescriptor {
                cull_mode: None,
                polygon_mode: PolygonMode::Fill,
            },
            RasterMode::BackFaceCull => RasterStateDescriptor {
                cull_mode: Some(Face::Back),
                polygon_mode: PolygonMode::Fill,
            },
            RasterMode::FrontFaceCull => RasterStateDescriptor {
                cull_mode: Some(Face::Front),
                polygon_mode: PolygonMode::Fill,
            },
            RasterMode::Wireframe => RasterStateDescriptor {
                cull_mode: None,
                polygon_mode: PolygonMode::Line,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_disables_blending() {
        assert!(BlendMode::Opaque.descriptor().is_none());
    }

    #[test]
    fn translucent_blend_equation() {
        let desc = BlendMode::Translucent.descriptor().unwrap();
        assert_eq!(desc.color.src_factor, BlendFactor::SrcAlpha);
        assert_eq!(desc.color.dst_factor, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(desc.color.operation, BlendOperation::Add);
        assert_eq!(desc.alpha.src_factor, BlendFactor::One);
        assert_eq!(desc.alpha.dst_factor, BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn additive_blend_equation() {
        let desc = BlendMode::Additive.descriptor().unwrap();
        assert_eq!(desc.color.src_factor, BlendFactor::SrcAlpha);
        assert_eq!(desc.color.dst_factor, BlendFactor::One);
        assert_eq!(desc.color.operation, BlendOperation::Add);
    }

    #[test]
    fn modulate_multiplies_destination() {
        let desc = BlendMode::Modulate.descriptor().unwrap();
        assert_eq!(desc.color.src_factor, BlendFactor::Dst);
        assert_eq!(desc.color.dst_factor, BlendFactor::Zero);
        assert_eq!(desc.alpha.src_factor, BlendFactor::DstAlpha);
    }

    #[test]
    fn subtract_reverses_operands() {
        let desc = BlendMode::Subtract.descriptor().unwrap();
        assert_eq!(desc.color.operation, BlendOperation::ReverseSubtract);
        assert_eq!(desc.color.dst_factor, BlendFactor::One);
    }

    #[test]
    fn comparison_sampler_only_for_comparison_mode() {
        for mode in [
            SamplerMode::PointWrap,
            SamplerMode::PointClamp,
            SamplerMode::LinearWrap,
            SamplerMode::LinearClamp,
            SamplerMode::AnisotropicClamp,
            SamplerMode::AnisotropicWrap,
        ] {
            assert!(mode.descriptor().compare.is_none(), "{mode:?}");
        }
        assert_eq!(
            SamplerMode::LinearComparisonClamp.descriptor().compare,
            Some(CompareFunction::LessEqual)
        );
    }

    #[test]
    fn anisotropic_modes_raise_clamp() {
        assert_eq!(SamplerMode::AnisotropicWrap.descriptor().anisotropy_clamp, 16);
        assert_eq!(SamplerMode::LinearWrap.descriptor().anisotropy_clamp, 1);
    }

    #[test]
    fn depth_modes() {
        let rw = DepthMode::ReadWrite.descriptor();
        assert!(rw.depth_test_enabled && rw.depth_write_enabled);
        assert_eq!(rw.compare, CompareFunction::LessEqual);

        let ro = DepthMode::ReadOnly.descriptor();
        assert!(ro.depth_test_enabled && !ro.depth_write_enabled);

        let rev = DepthMode::ReadOnlyReversed.descriptor();
        assert_eq!(rev.compare, CompareFunction::GreaterEqual);

        let off = DepthMode::Disabled.descriptor();
        assert!(!off.depth_test_enabled && !off.depth_write_enabled);
    }

    #[test]
    fn raster_modes() {
        assert_eq!(RasterMode::NoCull.descriptor().cull_mode, None);
        assert_eq!(
            RasterMode::BackFaceCull.descriptor().cull_mode,
            Some(Face::Back)
        );
        assert_eq!(
            RasterMode::FrontFaceCull.descriptor().cull_mode,
            Some(Face::Front)
        );
        let wf = RasterMode::Wireframe.descriptor();
        assert_eq!(wf.polygon_mode, PolygonMode::Line);
        assert_eq!(wf.cull_mode, None);
    }
}
