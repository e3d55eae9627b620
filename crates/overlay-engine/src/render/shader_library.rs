use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::gpu::{GpuError, ShaderStage};

pub const OVERLAY_VERTEX_SHADER: &str = "overlay/overlay.vert";
pub const OVERLAY_FRAGMENT_SHADER: &str = "overlay/overlay.frag";

/// Entry point a vertex stage source must define.
pub const VERTEX_ENTRY: &str = "vs_main";
/// Entry point a fragment stage source must define.
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Resolves shader paths to WGSL sources.
///
/// Lookup order: embedded sources (built-ins and [`register`](Self::register)),
/// then each search root joined with the path, then the path itself.
///
/// Bindings expected by the backend: uniforms in one struct at group 0
/// binding 0, each field starting on a 64-byte boundary in declaration order;
/// the texture at group 1 binding 0 and its sampler at group 1 binding 1.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    embedded: HashMap<String, Cow<'static, str>>,
    roots: Vec<PathBuf>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderLibrary {
    /// Library holding the built-in overlay shaders.
    pub fn new() -> Self {
        let mut lib = Self {
            embedded: HashMap::new(),
            roots: Vec::new(),
        };
        lib.register(OVERLAY_VERTEX_SHADER, include_str!("shaders/overlay.vert.wgsl"));
        lib.register(OVERLAY_FRAGMENT_SHADER, include_str!("shaders/overlay.frag.wgsl"));
        lib
    }

    pub fn register(&mut self, path: impl Into<String>, source: impl Into<Cow<'static, str>>) {
        self.embedded.insert(path.into(), source.into());
    }

    pub fn add_root(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn resolve(&self, path: &str) -> Result<Cow<'_, str>, GpuError> {
        if let Some(src) = self.embedded.get(path) {
            return Ok(Cow::Borrowed(src.as_ref()));
        }

        let candidates = self
            .roots
            .iter()
            .map(|root| root.join(path))
            .chain(std::iter::once(PathBuf::from(path)));

        for candidate in candidates {
            if candidate.is_file() {
                return match std::fs::read_to_string(&candidate) {
                    Ok(src) => {
                        log::debug!("shader `{path}` loaded from {}", candidate.display());
                        Ok(Cow::Owned(src))
                    }
                    Err(source) => Err(GpuError::ShaderRead {
                        path: candidate.display().to_string(),
                        source,
                    }),
                };
            }
        }

        Err(GpuError::ShaderNotFound { path: path.to_string() })
    }

    /// Resolves and validates `path` for `stage`, returning the WGSL source.
    pub fn load(&self, stage: ShaderStage, path: &str) -> Result<String, GpuError> {
        let source = self.resolve(path)?;
        validate_wgsl(stage, path, &source)?;
        Ok(source.into_owned())
    }
}

pub(crate) fn entry_point(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => VERTEX_ENTRY,
        ShaderStage::Fragment => FRAGMENT_ENTRY,
    }
}

/// Parses and validates `source` with naga and checks the stage entry point.
pub fn validate_wgsl(stage: ShaderStage, path: &str, source: &str) -> Result<(), GpuError> {
    let compile_error = |message: String| GpuError::Compile {
        stage,
        path: path.to_string(),
        message,
    };

    let module = naga::front::wgsl::parse_str(source).map_err(|e| compile_error(e.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    );
    validator
        .validate(&module)
        .map_err(|e| compile_error(format!("{e}")))?;

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry = entry_point(stage);
    if !module
        .entry_points
        .iter()
        .any(|ep| ep.stage == naga_stage && ep.name == entry)
    {
        return Err(compile_error(format!("missing entry point `{entry}`")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_overlay_shaders_validate() {
        let lib = ShaderLibrary::new();
        lib.load(ShaderStage::Vertex, OVERLAY_VERTEX_SHADER).unwrap();
        lib.load(ShaderStage::Fragment, OVERLAY_FRAGMENT_SHADER).unwrap();
    }

    #[test]
    fn unknown_path_is_not_found() {
        let lib = ShaderLibrary::new();
        let err = lib.load(ShaderStage::Vertex, "no/such/shader.vert").unwrap_err();
        assert!(matches!(err, GpuError::ShaderNotFound { .. }));
    }

    #[test]
    fn invalid_wgsl_reports_compile_error() {
        let mut lib = ShaderLibrary::new();
        lib.register("broken.frag", "@fragment fn fs_main( -> {");
        let err = lib.load(ShaderStage::Fragment, "broken.frag").unwrap_err();
        assert!(matches!(err, GpuError::Compile { stage: ShaderStage::Fragment, .. }));
    }

    #[test]
    fn wrong_stage_is_rejected() {
        let lib = ShaderLibrary::new();
        let err = lib.load(ShaderStage::Vertex, OVERLAY_FRAGMENT_SHADER).unwrap_err();
        match err {
            GpuError::Compile { message, .. } => assert!(message.contains(VERTEX_ENTRY)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn search_roots_are_consulted() {
        let root = std::env::temp_dir().join(format!("overlay-shaders-{}", std::process::id()));
        std::fs::create_dir_all(root.join("custom")).unwrap();
        std::fs::write(
            root.join("custom/tint.frag"),
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
        )
        .unwrap();

        let mut lib = ShaderLibrary::new();
        lib.add_root(&root);
        let src = lib.load(ShaderStage::Fragment, "custom/tint.frag").unwrap();
        assert!(src.contains("fs_main"));

        std::fs::remove_dir_all(&root).ok();
    }
}
