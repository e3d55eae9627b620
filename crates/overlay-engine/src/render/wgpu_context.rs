use std::collections::HashMap;
use std::num::NonZeroU64;

use wgpu::util::DeviceExt;

use crate::context::ContextId;
use crate::gpu::{
    BlendFactor, BlendState, DrawCall, GpuContext, GpuError, ProgramId, ShaderStage, TextureId,
    Topology, UniformId, UniformValue, VertexArrayId, VertexAttribute, rgba_len,
};
use crate::pass::DrawContext;

use super::RenderTarget;
use super::shader_library::{ShaderLibrary, entry_point};

/// Bytes reserved per uniform in a program's uniform block.
pub const UNIFORM_SLOT_SIZE: usize = 64;

struct Built {
    /// Unique across all builds of this context; part of the pipeline key.
    serial: u64,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
}

#[derive(Default)]
struct Program {
    values: Vec<Option<UniformValue>>,
    vertex: Option<String>,
    fragment: Option<String>,
    built: Option<Built>,
}

#[derive(Default)]
struct VertexArray {
    buffers: Vec<Option<wgpu::Buffer>>,
    attributes: Vec<VertexAttribute>,
    layout_revision: u64,
}

struct Texture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct PipelineKey {
    build: u64,
    blend: Option<BlendState>,
    topology: Topology,
    vertex_array: VertexArrayId,
    layout_revision: u64,
    format: wgpu::TextureFormat,
}

struct PendingDraw {
    key: PipelineKey,
    program: ProgramId,
    vertex_array: VertexArrayId,
    texture: Option<TextureId>,
    uniform_offset: u32,
    uniform_size: u64,
    items: u32,
}

/// [`GpuContext`] backed by one wgpu device.
///
/// Draws issued between [`begin_draw_2d`](GpuContext::begin_draw_2d) and
/// [`end_draw`](GpuContext::end_draw) are recorded with a snapshot of their
/// uniforms and blend state, then encoded into one render pass by
/// [`flush`](Self::flush). The pass loads the target, so it composes over
/// whatever was rendered before.
pub struct WgpuContext {
    id: ContextId,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    shaders: ShaderLibrary,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    fallback: Texture,
    uniform_alignment: usize,

    next_handle: u32,
    build_serial: u64,
    programs: HashMap<ProgramId, Program>,
    uniforms: HashMap<UniformId, (ProgramId, usize)>,
    vertex_arrays: HashMap<VertexArrayId, VertexArray>,
    textures: HashMap<TextureId, Texture>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    blend: Option<BlendState>,
    in_draw_2d: bool,
    pending: Vec<PendingDraw>,
    uniform_bytes: Vec<u8>,
}

impl WgpuContext {
    pub fn new(
        id: ContextId,
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        shaders: ShaderLibrary,
    ) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay uniform bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("overlay sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let fallback = upload_texture(&device, &queue, &texture_layout, &sampler, 1, 1, &[255; 4]);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment.max(1) as usize;

        log::debug!("wgpu overlay context {id} created ({surface_format:?})");

        Self {
            id,
            device,
            queue,
            surface_format,
            shaders,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            sampler,
            fallback,
            uniform_alignment,
            next_handle: 1,
            build_serial: 0,
            programs: HashMap::new(),
            uniforms: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            blend: None,
            in_draw_2d: false,
            pending: Vec::new(),
            uniform_bytes: Vec::new(),
        }
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Switches the color target format; cached pipelines are dropped.
    pub fn set_surface_format(&mut self, format: wgpu::TextureFormat) {
        if format != self.surface_format {
            self.surface_format = format;
            self.pipelines.clear();
        }
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.shaders
    }

    pub fn pending_draws(&self) -> usize {
        self.pending.len()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Drops recorded draws without encoding them.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.uniform_bytes.clear();
    }

    /// Encodes all recorded draws into `target` and clears the queue.
    pub fn flush(&mut self, target: &mut RenderTarget<'_>) {
        if self.pending.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut self.pending);
        let uniform_bytes = std::mem::take(&mut self.uniform_bytes);

        for draw in &pending {
            self.ensure_pipeline(draw);
        }

        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("overlay uniforms"),
            contents: &uniform_bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        // One bind group per distinct block size; offsets are dynamic.
        let mut uniform_groups: HashMap<u64, wgpu::BindGroup> = HashMap::new();
        for draw in &pending {
            uniform_groups.entry(draw.uniform_size).or_insert_with(|| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("overlay uniform bind group"),
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &uniform_buffer,
                            offset: 0,
                            size: NonZeroU64::new(draw.uniform_size),
                        }),
                    }],
                })
            });
        }

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("overlay pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let mut encoded = 0usize;
        for draw in &pending {
            let Some(pipeline) = self.pipelines.get(&draw.key) else { continue };
            let Some(array) = self.vertex_arrays.get(&draw.vertex_array) else { continue };
            let Some(uniforms) = uniform_groups.get(&draw.uniform_size) else { continue };
            let texture_group = draw
                .texture
                .and_then(|t| self.textures.get(&t))
                .map_or(&self.fallback.bind_group, |t| &t.bind_group);

            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, uniforms, &[draw.uniform_offset]);
            rpass.set_bind_group(1, texture_group, &[]);
            for (slot, buffer) in array.buffers.iter().enumerate() {
                if let Some(buffer) = buffer {
                    rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
            }
            rpass.draw(0..draw.items, 0..1);
            encoded += 1;
        }

        log::trace!(
            "context {} flushed {encoded}/{} overlay draws",
            self.id,
            pending.len()
        );
    }

    fn next<T>(&mut self, wrap: fn(u32) -> T) -> T {
        let raw = self.next_handle;
        self.next_handle += 1;
        wrap(raw)
    }

    fn ensure_pipeline(&mut self, draw: &PendingDraw) {
        if self.pipelines.contains_key(&draw.key) {
            return;
        }
        let Some(built) = self.programs.get(&draw.program).and_then(|p| p.built.as_ref()) else {
            return;
        };
        let Some(array) = self.vertex_arrays.get(&draw.vertex_array) else {
            return;
        };

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = (0..array.buffers.len())
            .map(|slot| {
                array
                    .attributes
                    .iter()
                    .filter(|a| a.buffer as usize == slot)
                    .filter_map(to_wgpu_attribute)
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = attributes
            .iter()
            .enumerate()
            .map(|(slot, attrs)| wgpu::VertexBufferLayout {
                array_stride: buffer_stride(&array.attributes, slot as u32),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &built.vertex,
                entry_point: Some(entry_point(ShaderStage::Vertex)),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &built.fragment,
                entry_point: Some(entry_point(ShaderStage::Fragment)),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: draw.key.format,
                    blend: draw.key.blend.map(to_wgpu_blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: to_wgpu_topology(draw.key.topology),
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!("context {} created overlay pipeline {:?}", self.id, draw.key);
        self.pipelines.insert(draw.key, pipeline);
    }
}

impl GpuContext for WgpuContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn create_program(&mut self) -> ProgramId {
        let id = self.next(ProgramId::from_raw);
        self.programs.insert(id, Program::default());
        id
    }

    fn add_uniform(&mut self, program: ProgramId, name: &str) -> UniformId {
        let id = self.next(UniformId::from_raw);
        match self.programs.get_mut(&program) {
            Some(p) => {
                self.uniforms.insert(id, (program, p.values.len()));
                p.values.push(None);
            }
            None => log::warn!("uniform `{name}` added to unknown program {}", program.raw()),
        }
        id
    }

    fn set_shader(&mut self, program: ProgramId, stage: ShaderStage, path: &str) {
        let Some(p) = self.programs.get_mut(&program) else { return };
        match stage {
            ShaderStage::Vertex => p.vertex = Some(path.to_string()),
            ShaderStage::Fragment => p.fragment = Some(path.to_string()),
        }
    }

    fn build_program(&mut self, program: ProgramId) -> Result<(), GpuError> {
        let p = self.programs.get(&program).ok_or(GpuError::UnknownHandle {
            kind: "program",
            raw: program.raw(),
        })?;
        let vertex_path = p.vertex.clone().ok_or(GpuError::MissingStage(ShaderStage::Vertex))?;
        let fragment_path = p.fragment.clone().ok_or(GpuError::MissingStage(ShaderStage::Fragment))?;

        let vertex_src = self.shaders.load(ShaderStage::Vertex, &vertex_path)?;
        let fragment_src = self.shaders.load(ShaderStage::Fragment, &fragment_path)?;

        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(vertex_path.as_str()),
            source: wgpu::ShaderSource::Wgsl(vertex_src.into()),
        });
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(fragment_path.as_str()),
            source: wgpu::ShaderSource::Wgsl(fragment_src.into()),
        });

        self.build_serial += 1;
        let serial = self.build_serial;
        if let Some(p) = self.programs.get_mut(&program) {
            p.built = Some(Built { serial, vertex, fragment });
        }
        log::debug!("context {} built program {} ({vertex_path}, {fragment_path})", self.id, program.raw());
        Ok(())
    }

    fn set_uniform(&mut self, uniform: UniformId, value: UniformValue) {
        let Some(&(program, index)) = self.uniforms.get(&uniform) else { return };
        if let Some(slot) = self.programs.get_mut(&program).and_then(|p| p.values.get_mut(index)) {
            *slot = Some(value);
        }
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = self.next(VertexArrayId::from_raw);
        self.vertex_arrays.insert(id, VertexArray::default());
        id
    }

    fn add_vertex_buffer(&mut self, array: VertexArrayId, slot: u32, data: &[u8]) {
        let Some(va) = self.vertex_arrays.get_mut(&array) else { return };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("overlay vertex buffer"),
            contents: data,
            usage: wgpu::BufferUsages::VERTEX,
        });

        let slot = slot as usize;
        if va.buffers.len() <= slot {
            va.buffers.resize_with(slot + 1, || None);
        }
        va.buffers[slot] = Some(buffer);
        va.layout_revision += 1;
    }

    fn add_attribute(&mut self, array: VertexArrayId, attribute: VertexAttribute) {
        let Some(va) = self.vertex_arrays.get_mut(&array) else { return };
        va.attributes.push(attribute);
        va.layout_revision += 1;
    }

    fn set_blend(&mut self, blend: Option<BlendState>) {
        self.blend = blend;
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, GpuError> {
        check_texture_data(width, height, rgba)?;
        let texture = upload_texture(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &self.sampler,
            width,
            height,
            rgba,
        );
        let id = self.next(TextureId::from_raw);
        self.textures.insert(id, texture);
        log::debug!("context {} created texture {} ({width}x{height})", self.id, id.raw());
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, rgba: &[u8]) -> Result<(), GpuError> {
        let tex = self.textures.get(&texture).ok_or(GpuError::UnknownHandle {
            kind: "texture",
            raw: texture.raw(),
        })?;
        check_texture_data(tex.width, tex.height, rgba)?;
        write_rgba(&self.queue, &tex.texture, tex.width, tex.height, rgba);
        Ok(())
    }

    fn begin_draw_2d(&mut self, _dc: &DrawContext) {
        self.in_draw_2d = true;
    }

    fn end_draw(&mut self) {
        self.in_draw_2d = false;
    }

    fn run(&mut self, call: &DrawCall) {
        if !self.in_draw_2d {
            log::trace!("context {} draw outside a 2D scope", self.id);
        }
        let Some(program) = self.programs.get(&call.program()) else {
            log::debug!("draw with unknown program {}", call.program().raw());
            return;
        };
        let Some(built) = program.built.as_ref() else {
            log::debug!("draw with unbuilt program {}", call.program().raw());
            return;
        };
        let Some(vertex_array) = call.vertex_array() else {
            log::debug!("draw without vertex array skipped");
            return;
        };
        let Some(array) = self.vertex_arrays.get(&vertex_array) else { return };

        let key = PipelineKey {
            build: built.serial,
            blend: self.blend,
            topology: call.topology,
            vertex_array,
            layout_revision: array.layout_revision,
            format: self.surface_format,
        };

        let block = pack_uniforms(&program.values);
        let uniform_offset = self.uniform_bytes.len();
        let uniform_size = block.len() as u64;
        self.uniform_bytes.extend_from_slice(&block);
        self.uniform_bytes
            .resize(align_up(self.uniform_bytes.len(), self.uniform_alignment), 0);

        self.pending.push(PendingDraw {
            key,
            program: call.program(),
            vertex_array,
            texture: call.textures().first().map(|(_, t)| *t),
            uniform_offset: uniform_offset as u32,
            uniform_size,
            items: call.items,
        });
    }
}

fn check_texture_data(width: u32, height: u32, rgba: &[u8]) -> Result<(), GpuError> {
    let expected = rgba_len(width, height);
    if width == 0 || height == 0 || rgba.len() != expected {
        return Err(GpuError::TextureSize {
            expected,
            actual: rgba.len(),
        });
    }
    Ok(())
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> Texture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("overlay texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write_rgba(queue, &texture, width, height, rgba);

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("overlay texture bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    Texture {
        texture,
        bind_group,
        width,
        height,
    }
}

fn write_rgba(queue: &wgpu::Queue, texture: &wgpu::Texture, width: u32, height: u32, rgba: &[u8]) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// Packs uniform values into 64-byte slots in declaration order.
/// Unset uniforms are zero. Matrices are column-major.
fn pack_uniforms(values: &[Option<UniformValue>]) -> Vec<u8> {
    let mut out = vec![0u8; values.len().max(1) * UNIFORM_SLOT_SIZE];
    for (i, value) in values.iter().enumerate() {
        let slot = &mut out[i * UNIFORM_SLOT_SIZE..(i + 1) * UNIFORM_SLOT_SIZE];
        match value {
            Some(UniformValue::Float(v)) => slot[..4].copy_from_slice(&v.to_ne_bytes()),
            Some(UniformValue::Mat4(m)) => {
                slot.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()));
            }
            None => {}
        }
    }
    out
}

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

fn to_wgpu_attribute(attr: &VertexAttribute) -> Option<wgpu::VertexAttribute> {
    let format = match attr.components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        4 => wgpu::VertexFormat::Float32x4,
        n => {
            log::warn!("vertex attribute `{}` has {n} components; ignored", attr.name);
            return None;
        }
    };
    Some(wgpu::VertexAttribute {
        format,
        offset: attr.offset as u64,
        shader_location: attr.location,
    })
}

/// Stride of buffer `slot`: the explicit stride if any attribute sets one,
/// otherwise the packed width of its attributes.
fn buffer_stride(attributes: &[VertexAttribute], slot: u32) -> u64 {
    let in_slot = || attributes.iter().filter(move |a| a.buffer == slot);
    in_slot()
        .map(|a| a.stride)
        .find(|&s| s != 0)
        .unwrap_or_else(|| in_slot().map(|a| a.components * 4).sum()) as u64
}

fn to_wgpu_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

pub(crate) fn to_wgpu_blend(blend: BlendState) -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: to_wgpu_factor(blend.src),
        dst_factor: to_wgpu_factor(blend.dst),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

fn to_wgpu_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}
