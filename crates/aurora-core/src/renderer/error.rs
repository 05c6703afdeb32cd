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

//! Error types of the rendering subsystem, layered the way the subsystem
//! is: shader and pipeline errors fold into [`ResourceError`], which folds
//! into the frame-level [`RenderError`].

use crate::renderer::api::vertex::VertexAttributeKind;
use crate::renderer::shader::ShaderModuleId;
use std::fmt;

/// A failure while compiling, reflecting, or looking up a shader.
#[derive(Debug)]
pub enum ShaderError {
    /// The WGSL source did not parse or validate.
    CompilationError { label: String, details: String },
    /// No module is registered under this id.
    NotFound { id: ShaderModuleId },
    /// The module has no entry point for the requested stage.
    MissingEntryPoint {
        /// `"vertex"`, `"fragment"`, or `"compute"`.
        stage: &'static str,
    },
    /// The shader reads a vertex attribute the bound mesh does not carry.
    MissingAttribute { attribute: VertexAttributeKind },
    /// A vertex input's declared `@location` does not match the location
    /// the attribute-order convention assigns it.
    LocationMismatch {
        input: String,
        declared: u32,
        expected: u32,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::CompilationError { label, details } => {
                write!(f, "shader '{label}' failed to compile: {details}")
            }
            ShaderError::NotFound { id } => write!(f, "no shader module registered for {id:?}"),
            ShaderError::MissingEntryPoint { stage } => {
                write!(f, "shader module has no {stage} entry point")
            }
            ShaderError::MissingAttribute { attribute } => {
                write!(f, "shader reads {attribute:?} but the mesh does not provide it")
            }
            ShaderError::LocationMismatch {
                input,
                declared,
                expected,
            } => {
                write!(
                    f,
                    "vertex input '{input}' is declared at @location({declared}) but attribute order assigns location {expected}"
                )
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// A failure while building a pipeline state object.
#[derive(Debug)]
pub enum PipelineError {
    /// The backend rejected the combined pipeline state.
    CompilationFailed {
        label: Option<String>,
        details: String,
    },
    /// A stage referenced a shader module that no longer exists.
    InvalidShaderModuleForPipeline {
        id: ShaderModuleId,
        pipeline_label: Option<String>,
    },
    /// The pipeline needs a device feature that is not active.
    FeatureNotSupported(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::CompilationFailed { label, details } => write!(
                f,
                "pipeline '{}' failed to build: {details}",
                label.as_deref().unwrap_or("unnamed")
            ),
            PipelineError::InvalidShaderModuleForPipeline { id, pipeline_label } => write!(
                f,
                "pipeline '{}' references stale shader module {id:?}",
                pipeline_label.as_deref().unwrap_or("unnamed")
            ),
            PipelineError::FeatureNotSupported(what) => {
                write!(f, "missing device feature: {what}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// A failure while creating, updating, or destroying a GPU resource.
#[derive(Debug)]
pub enum ResourceError {
    Shader(ShaderError),
    Pipeline(PipelineError),
    /// No resource is registered under the given id.
    NotFound,
    /// The handle was never created, or was already destroyed.
    InvalidHandle,
    /// A size that must be a multiple of `alignment` was not.
    InvalidSize { size: u64, alignment: u64 },
    /// An error surfaced by the backend with no closer mapping.
    BackendError(String),
    /// A write or read past the end of the resource.
    OutOfBounds,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "shader error: {err}"),
            ResourceError::Pipeline(err) => write!(f, "pipeline error: {err}"),
            ResourceError::NotFound => write!(f, "resource not found"),
            ResourceError::InvalidHandle => write!(f, "invalid resource handle"),
            ResourceError::InvalidSize { size, alignment } => {
                write!(f, "size {size} is not a multiple of {alignment}")
            }
            ResourceError::BackendError(msg) => write!(f, "backend error: {msg}"),
            ResourceError::OutOfBounds => write!(f, "access out of resource bounds"),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// A frame-level failure reported by the rendering system.
#[derive(Debug)]
pub enum RenderError {
    /// The backend could not be brought up.
    InitializationFailed(String),
    /// The next swap chain image could not be acquired.
    SurfaceAcquisitionFailed(String),
    ResourceError(ResourceError),
    /// The device is gone; the backend must be reinitialized.
    DeviceLost,
    /// A bug or a state the renderer cannot express more precisely.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InitializationFailed(msg) => {
                write!(f, "graphics initialization failed: {msg}")
            }
            RenderError::SurfaceAcquisitionFailed(msg) => {
                write!(f, "could not acquire the next frame: {msg}")
            }
            RenderError::ResourceError(err) => write!(f, "resource error: {err}"),
            RenderError::DeviceLost => write!(f, "the graphics device was lost"),
            RenderError::Internal(msg) => write!(f, "internal renderer error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn shader_errors_format_with_context() {
        let err = ShaderError::CompilationError {
            label: "Sky".to_string(),
            details: "unknown identifier".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "shader 'Sky' failed to compile: unknown identifier"
        );

        let err = ShaderError::MissingAttribute {
            attribute: VertexAttributeKind::Normal,
        };
        assert_eq!(
            format!("{err}"),
            "shader reads Normal but the mesh does not provide it"
        );

        let err = ShaderError::LocationMismatch {
            input: "normal".to_string(),
            declared: 2,
            expected: 1,
        };
        assert_eq!(
            format!("{err}"),
            "vertex input 'normal' is declared at @location(2) but attribute order assigns location 1"
        );
    }

    #[test]
    fn shader_error_is_reachable_through_source_chain() {
        let render_err: RenderError = ResourceError::from(ShaderError::NotFound {
            id: ShaderModuleId(42),
        })
        .into();
        let resource = render_err.source().expect("resource source");
        assert!(resource.source().is_some(), "shader source missing");
        assert_eq!(
            format!("{render_err}"),
            "resource error: shader error: no shader module registered for ShaderModuleId(42)"
        );
    }

    #[test]
    fn invalid_size_names_the_alignment() {
        let err = ResourceError::InvalidSize {
            size: 20,
            alignment: 16,
        };
        assert_eq!(format!("{err}"), "size 20 is not a multiple of 16");
    }
}
