// Species-occurrence globe with a cursor bubble trail.
// Renders the two engine outputs every frame: screen-space trail sprites and
// the geo layers (heatmap discs, connection arcs, pulsing beacons) on a 3D
// globe. All simulation state lives in the engine module; this file is the
// winit/wgpu host plus the per-frame glue.

mod engine;

use glam::{Mat4, Vec2};
use winit::{
    event::{ElementState, Event as WinitEvent, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use engine::beacon::{self, PulseConfig};
use engine::camera::OrbitCamera;
use engine::clock::SystemClock;
use engine::debug_overlay::{DebugOverlay, DebugStats};
use engine::input::InputState;
use engine::mesh::{self, GpuVertex, RenderMesh};
use engine::{AnalysisResult, CorrelationEngine, DrawSurface, LayerConfig, TrailConfig, TrailEngine};

// ============================================================================
// VERTEX AND INSTANCE DEFINITIONS
// ============================================================================

/// Quad corner in [-1, 1]^2, shared by the marker and bubble pipelines.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    corner: [f32; 2],
}

impl QuadVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

/// Two CCW triangles covering the quad.
const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex { corner: [-1.0, -1.0] },
    QuadVertex { corner: [1.0, -1.0] },
    QuadVertex { corner: [1.0, 1.0] },
    QuadVertex { corner: [-1.0, -1.0] },
    QuadVertex { corner: [1.0, 1.0] },
    QuadVertex { corner: [-1.0, 1.0] },
];

/// One camera-facing disc on the globe (beacon or heat sample).
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MarkerInstance {
    center: [f32; 3],
    size: f32,
    color: [f32; 4],
}

impl MarkerInstance {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MarkerInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: 16,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// One screen-space bubble sprite op (radial fill or ring outline).
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct BubbleInstance {
    center: [f32; 2],
    radius: f32,
    width: f32,
    color: [f32; 4],
    kind: u32,
    _pad: [u32; 3],
}

impl BubbleInstance {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<BubbleInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: 8,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: 16,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: 32,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Uint32,
                },
            ],
        }
    }
}

/// Pre-tessellated arc segment vertex.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ArcVertex {
    position: [f32; 3],
    color: [f32; 4],
}

impl ArcVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ArcVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

// ============================================================================
// UNIFORM DATA
// ============================================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SceneUniforms {
    view_proj: [[f32; 4]; 4],
    camera_right: [f32; 4],
    camera_up: [f32; 4],
    camera_eye: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ScreenUniforms {
    size: [f32; 4],
}

// ============================================================================
// RENDER CONSTANTS
// ============================================================================

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const MAX_BUBBLE_INSTANCES: usize = 8192;
const MAX_MARKER_INSTANCES: usize = 1024;
const MAX_ARC_VERTICES: usize = 4096;

/// Segments per tessellated arc.
const ARC_SEGMENTS: usize = 24;
/// Arc apex height above the surface for a half-globe span.
const ARC_MAX_ALTITUDE: f32 = 0.35;
/// Beacon disc radius in world units at pulse scale 1.
const BEACON_BASE_SIZE: f32 = 0.035;
/// Heat disc radius in world units.
const HEAT_SIZE: f32 = 0.05;
/// Layers float slightly off the surface so they never z-fight the globe.
const SURFACE_LIFT: f32 = 1.005;

/// Beacon tints cycled per species, loosely after the reference palette
/// (orca blue, tuna orange, everything else green).
const SPECIES_COLORS: [[f32; 3]; 3] = [
    [0.25, 0.55, 1.00],
    [1.00, 0.60, 0.15],
    [0.30, 0.90, 0.45],
];

/// Built-in session so the globe renders without an analysis file.
const DEMO_ANALYSIS: &str = r#"{
    "file_info": {"filename": "sample.fasta"},
    "biodiversity_summary": {
        "total_reads_processed": 12450,
        "unique_species_identified": 3,
        "abundance_distribution": [
            {"species": "Orcinus orca", "count": 7020, "relative_abundance": 0.564},
            {"species": "Thunnus albacares", "count": 3980, "relative_abundance": 0.320},
            {"species": "Amphiprion ocellaris", "count": 1450, "relative_abundance": 0.116}
        ]
    },
    "geo_profiles": [
        {"scientific_name": "Orcinus orca",
         "classification": "Animalia / Chordata / Mammalia",
         "location": "Southern Ocean",
         "confidence": 0.9,
         "coordinates": [[-75.0, 0.0], [-70.5, 12.0], [-68.0, -25.0], [-62.0, 45.0],
                         [48.5, -125.0], [58.0, -152.0], [69.0, 18.0], [-41.0, 174.0],
                         [36.5, -122.0], [60.2, -1.3], [-54.0, -36.5], [71.0, 25.8]]},
        {"scientific_name": "Thunnus albacares",
         "classification": "Animalia / Chordata / Actinopterygii",
         "location": "Atlantic Ocean",
         "confidence": 0.7,
         "coordinates": [[30.0, -40.0], [12.0, -30.0], [-5.0, 5.0], [18.0, -60.0]]},
        {"scientific_name": "Amphiprion ocellaris",
         "classification": "Animalia / Chordata / Actinopterygii",
         "location": "Coral Triangle",
         "confidence": 0.6,
         "coordinates": [10.0, 100.0]}
    ]
}"#;

// ============================================================================
// BUBBLE BATCH (DrawSurface impl)
// ============================================================================

/// Collects the trail engine's draw calls into sprite instances for the
/// bubble pipeline. Rebuilt every frame.
struct BubbleBatch {
    instances: Vec<BubbleInstance>,
}

impl BubbleBatch {
    fn new() -> Self {
        Self { instances: Vec::new() }
    }
}

impl DrawSurface for BubbleBatch {
    fn fill_radial(&mut self, center: Vec2, radius: f32, color: [f32; 4]) {
        self.instances.push(BubbleInstance {
            center: center.to_array(),
            radius,
            width: 0.0,
            color,
            kind: 0,
            _pad: [0; 3],
        });
    }

    fn stroke_circle(&mut self, center: Vec2, radius: f32, width: f32, color: [f32; 4]) {
        self.instances.push(BubbleInstance {
            center: center.to_array(),
            radius,
            width,
            color,
            kind: 1,
            _pad: [0; 3],
        });
    }
}

// ============================================================================
// APPLICATION STATE
// ============================================================================

struct State {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: winit::dpi::PhysicalSize<u32>,
    depth_view: wgpu::TextureView,

    globe_pipeline: wgpu::RenderPipeline,
    marker_pipeline: wgpu::RenderPipeline,
    arc_pipeline: wgpu::RenderPipeline,
    bubble_pipeline: wgpu::RenderPipeline,

    globe_vertex_buffer: wgpu::Buffer,
    globe_index_buffer: wgpu::Buffer,
    globe_index_count: u32,
    quad_vertex_buffer: wgpu::Buffer,
    marker_instance_buffer: wgpu::Buffer,
    arc_vertex_buffer: wgpu::Buffer,
    bubble_instance_buffer: wgpu::Buffer,

    scene_uniform_buffer: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,
    screen_uniform_buffer: wgpu::Buffer,
    screen_bind_group: wgpu::BindGroup,

    // Engines and host-side state
    trail: TrailEngine,
    correlation: CorrelationEngine,
    pulse: PulseConfig,
    clock: SystemClock,
    camera: OrbitCamera,
    input: InputState,
    overlay: DebugOverlay,

    last_update: std::time::Instant,
    frame_times_ms: Vec<f32>,
    stats: DebugStats,
}

impl State {
    async fn new(window: std::sync::Arc<Window>, correlation: CorrelationEngine) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone()).unwrap();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .unwrap();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .unwrap();

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, &config);

        // ---- Uniforms and bind groups -------------------------------------
        use wgpu::util::DeviceExt;

        let scene_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Uniforms"),
            contents: bytemuck::cast_slice(&[SceneUniforms {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
                camera_right: [1.0, 0.0, 0.0, 0.0],
                camera_up: [0.0, 1.0, 0.0, 0.0],
                camera_eye: [0.0, 0.0, 3.0, 0.0],
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let screen_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Screen Uniforms"),
            contents: bytemuck::cast_slice(&[ScreenUniforms {
                size: [size.width as f32, size.height as f32, 0.0, 0.0],
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("uniform_bind_group_layout"),
        });

        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: scene_uniform_buffer.as_entire_binding(),
            }],
            label: Some("scene_bind_group"),
        });

        let screen_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: screen_uniform_buffer.as_entire_binding(),
            }],
            label: Some("screen_bind_group"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });

        // ---- Pipelines -----------------------------------------------------
        let globe_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Globe Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_globe.wgsl").into()),
        });
        let marker_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Marker Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_marker.wgsl").into()),
        });
        let arc_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Arc Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_arc.wgsl").into()),
        });
        let bubble_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bubble Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_bubble.wgsl").into()),
        });

        let globe_pipeline = build_pipeline(
            &device,
            &pipeline_layout,
            &globe_shader,
            &[GpuVertex::desc()],
            config.format,
            wgpu::PrimitiveTopology::TriangleList,
            Some(wgpu::Face::Back),
            wgpu::BlendState::REPLACE,
            Some(depth_state(true)),
            "Globe Pipeline",
        );

        let marker_pipeline = build_pipeline(
            &device,
            &pipeline_layout,
            &marker_shader,
            &[QuadVertex::desc(), MarkerInstance::desc()],
            config.format,
            wgpu::PrimitiveTopology::TriangleList,
            None,
            wgpu::BlendState::ALPHA_BLENDING,
            Some(depth_state(false)),
            "Marker Pipeline",
        );

        let arc_pipeline = build_pipeline(
            &device,
            &pipeline_layout,
            &arc_shader,
            &[ArcVertex::desc()],
            config.format,
            wgpu::PrimitiveTopology::LineList,
            None,
            wgpu::BlendState::ALPHA_BLENDING,
            Some(depth_state(false)),
            "Arc Pipeline",
        );

        let bubble_pipeline = build_pipeline(
            &device,
            &pipeline_layout,
            &bubble_shader,
            &[QuadVertex::desc(), BubbleInstance::desc()],
            config.format,
            wgpu::PrimitiveTopology::TriangleList,
            None,
            wgpu::BlendState::ALPHA_BLENDING,
            None,
            "Bubble Pipeline",
        );

        // ---- Static and per-frame buffers ---------------------------------
        let globe_mesh: RenderMesh = mesh::build_globe(48, 96);
        let globe_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globe Vertex Buffer"),
            contents: globe_mesh.vertex_bytes(),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let globe_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globe Index Buffer"),
            contents: globe_mesh.index_bytes(),
            usage: wgpu::BufferUsages::INDEX,
        });

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let marker_instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Marker Instance Buffer"),
            size: (MAX_MARKER_INSTANCES * std::mem::size_of::<MarkerInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let arc_vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Arc Vertex Buffer"),
            size: (MAX_ARC_VERTICES * std::mem::size_of::<ArcVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bubble_instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bubble Instance Buffer"),
            size: (MAX_BUBBLE_INSTANCES * std::mem::size_of::<BubbleInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let trail = TrailEngine::new(TrailConfig::default())
            .expect("default trail configuration is valid");
        let overlay = DebugOverlay::new(&window, &device, config.format);

        let species_count = correlation.profiles().len();
        let selected_species = correlation
            .selected_profile()
            .map(|p| p.scientific_name.clone())
            .unwrap_or_default();

        Self {
            surface,
            device,
            queue,
            config,
            size,
            depth_view,
            globe_pipeline,
            marker_pipeline,
            arc_pipeline,
            bubble_pipeline,
            globe_vertex_buffer,
            globe_index_buffer,
            globe_index_count: globe_mesh.index_count() as u32,
            quad_vertex_buffer,
            marker_instance_buffer,
            arc_vertex_buffer,
            bubble_instance_buffer,
            scene_uniform_buffer,
            scene_bind_group,
            screen_uniform_buffer,
            screen_bind_group,
            trail,
            correlation,
            pulse: PulseConfig::default(),
            clock: SystemClock::new(),
            camera: OrbitCamera::new(),
            input: InputState::new((size.width, size.height)),
            overlay,
            last_update: std::time::Instant::now(),
            frame_times_ms: Vec::new(),
            stats: DebugStats {
                fps: 0,
                frame_time_avg_ms: 0.0,
                frame_time_min_ms: 0.0,
                frame_time_max_ms: 0.0,
                particle_count: 0,
                species_count,
                selected_species,
                heat_sample_count: 0,
                arc_count: 0,
                resolution: (size.width, size.height),
                camera_distance: 0.0,
            },
        }
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = create_depth_view(&self.device, &self.config);
        }
    }

    /// Advance to the next species in the session, wrapping around.
    fn cycle_species(&mut self) {
        let names: Vec<String> = self
            .correlation
            .profiles()
            .iter()
            .map(|p| p.scientific_name.clone())
            .collect();
        if names.is_empty() {
            return;
        }
        let current = self
            .correlation
            .selected_profile()
            .and_then(|p| names.iter().position(|n| *n == p.scientific_name))
            .unwrap_or(0);
        let next = &names[(current + 1) % names.len()];
        if let Err(err) = self.correlation.select_species(next) {
            log::warn!("species cycle failed: {err}");
        } else {
            log::info!("showing species: {next}");
            self.stats.selected_species = next.clone();
        }
    }

    fn update(&mut self) {
        let now = std::time::Instant::now();
        let dt = (now - self.last_update).as_secs_f32();
        self.last_update = now;

        if self.input.was_key_pressed(KeyCode::F3) {
            self.overlay.toggle();
        }
        if self.input.was_key_pressed(KeyCode::Tab) {
            self.cycle_species();
        }

        self.camera.update(&self.input, dt);
        self.trail.tick(dt);
        self.input.end_frame();

        // Frame stats for the overlay, folded once per second.
        self.frame_times_ms.push(dt * 1000.0);
        if self.frame_times_ms.iter().sum::<f32>() >= 1000.0 {
            let n = self.frame_times_ms.len() as f32;
            let sum: f32 = self.frame_times_ms.iter().sum();
            self.stats.fps = self.frame_times_ms.len() as u32;
            self.stats.frame_time_avg_ms = sum / n;
            self.stats.frame_time_min_ms =
                self.frame_times_ms.iter().copied().fold(f32::INFINITY, f32::min);
            self.stats.frame_time_max_ms =
                self.frame_times_ms.iter().copied().fold(0.0, f32::max);
            self.frame_times_ms.clear();
        }
        self.stats.particle_count = self.trail.particle_count();
        self.stats.resolution = (self.size.width, self.size.height);
        self.stats.camera_distance = self.camera.distance();
    }

    /// Build this frame's marker instances: heat discs under pulsing beacons.
    fn build_markers(&mut self) -> Vec<MarkerInstance> {
        let mut markers = Vec::new();

        let heat = self.correlation.heatmap();
        self.stats.heat_sample_count = heat.len();
        for sample in &heat {
            let center = mesh::lat_lng_to_unit(sample.lat, sample.lng) * SURFACE_LIFT;
            markers.push(MarkerInstance {
                center: center.to_array(),
                size: HEAT_SIZE,
                color: [1.0, 0.45, 0.10, (sample.weight * 0.35) as f32],
            });
        }

        if let Some(profile) = self.correlation.selected_profile() {
            let species_idx = self
                .correlation
                .profiles()
                .iter()
                .position(|p| p.scientific_name == profile.scientific_name)
                .unwrap_or(0);
            let [r, g, b] = SPECIES_COLORS[species_idx % SPECIES_COLORS.len()];
            for point in &profile.points {
                let scale =
                    beacon::pulse_scale(&self.pulse, &self.clock, profile.confidence, point.lat);
                let center = mesh::lat_lng_to_unit(point.lat, point.lng) * SURFACE_LIFT;
                markers.push(MarkerInstance {
                    center: center.to_array(),
                    size: BEACON_BASE_SIZE * scale as f32,
                    color: [r, g, b, 0.9],
                });
            }
        }

        markers.truncate(MAX_MARKER_INSTANCES);
        markers
    }

    /// Tessellate this frame's connection arcs into line-list vertices.
    fn build_arc_vertices(&mut self) -> Vec<ArcVertex> {
        let arcs = self.correlation.connection_arcs();
        self.stats.arc_count = arcs.len();

        let mut vertices = Vec::new();
        for arc in &arcs {
            let start = mesh::lat_lng_to_unit(arc.start.lat, arc.start.lng) * SURFACE_LIFT;
            let end = mesh::lat_lng_to_unit(arc.end.lat, arc.end.lng) * SURFACE_LIFT;
            // Degenerate arcs are skipped, never allowed to poison the pass.
            if !start.is_finite() || !end.is_finite() {
                continue;
            }
            let line = mesh::arc_polyline(start, end, ARC_SEGMENTS, ARC_MAX_ALTITUDE);

            // Stroke weight folds into brightness; line width is fixed.
            let tint = 0.4 + arc.stroke_width as f32;
            let color = [0.35 * tint, 0.85 * tint, 1.0 * tint, arc.alpha as f32];
            for pair in line.windows(2) {
                vertices.push(ArcVertex { position: pair[0].to_array(), color });
                vertices.push(ArcVertex { position: pair[1].to_array(), color });
            }
        }
        vertices.truncate(MAX_ARC_VERTICES);
        vertices
    }

    fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // Collect all per-frame data BEFORE opening any render pass.
        let markers = self.build_markers();
        let arc_vertices = self.build_arc_vertices();

        let mut bubbles = BubbleBatch::new();
        self.trail.render(&mut bubbles);
        bubbles.instances.truncate(MAX_BUBBLE_INSTANCES);

        if !markers.is_empty() {
            self.queue
                .write_buffer(&self.marker_instance_buffer, 0, bytemuck::cast_slice(&markers));
        }
        if !arc_vertices.is_empty() {
            self.queue
                .write_buffer(&self.arc_vertex_buffer, 0, bytemuck::cast_slice(&arc_vertices));
        }
        if !bubbles.instances.is_empty() {
            self.queue.write_buffer(
                &self.bubble_instance_buffer,
                0,
                bytemuck::cast_slice(&bubbles.instances),
            );
        }

        let aspect = self.size.width as f32 / self.size.height as f32;
        let (right, up) = self.camera.billboard_axes();
        let eye = self.camera.eye();
        let scene = SceneUniforms {
            view_proj: self.camera.view_projection(aspect).to_cols_array_2d(),
            camera_right: [right.x, right.y, right.z, 0.0],
            camera_up: [up.x, up.y, up.z, 0.0],
            camera_eye: [eye.x, eye.y, eye.z, 0.0],
        };
        self.queue
            .write_buffer(&self.scene_uniform_buffer, 0, bytemuck::cast_slice(&[scene]));

        let screen = ScreenUniforms {
            size: [self.size.width as f32, self.size.height as f32, 0.0, 0.0],
        };
        self.queue
            .write_buffer(&self.screen_uniform_buffer, 0, bytemuck::cast_slice(&[screen]));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        // ---- Pass 1: globe + geo layers (depth-tested) ---------------------
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Globe Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.01,
                            g: 0.02,
                            b: 0.05,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&self.globe_pipeline);
            render_pass.set_bind_group(0, &self.scene_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.globe_vertex_buffer.slice(..));
            render_pass
                .set_index_buffer(self.globe_index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..self.globe_index_count, 0, 0..1);

            if !arc_vertices.is_empty() {
                render_pass.set_pipeline(&self.arc_pipeline);
                render_pass.set_bind_group(0, &self.scene_bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.arc_vertex_buffer.slice(..));
                render_pass.draw(0..arc_vertices.len() as u32, 0..1);
            }

            if !markers.is_empty() {
                render_pass.set_pipeline(&self.marker_pipeline);
                render_pass.set_bind_group(0, &self.scene_bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, self.marker_instance_buffer.slice(..));
                render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..markers.len() as u32);
            }
        }

        // ---- Pass 2: screen-space bubble trail -----------------------------
        if !bubbles.instances.is_empty() {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Bubble Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&self.bubble_pipeline);
            render_pass.set_bind_group(0, &self.screen_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
            render_pass.set_vertex_buffer(1, self.bubble_instance_buffer.slice(..));
            render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..bubbles.instances.len() as u32);
        }

        // ---- Overlay ---------------------------------------------------------
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };
        let stats = if self.overlay.visible { Some(&self.stats) } else { None };
        self.overlay.render(
            &self.device,
            &self.queue,
            &mut encoder,
            window,
            &view,
            &screen_descriptor,
            stats,
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

// ============================================================================
// PIPELINE / TEXTURE HELPERS
// ============================================================================

fn depth_state(write: bool) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    buffers: &[wgpu::VertexBufferLayout],
    format: wgpu::TextureFormat,
    topology: wgpu::PrimitiveTopology,
    cull_mode: Option<wgpu::Face>,
    blend: wgpu::BlendState,
    depth_stencil: Option<wgpu::DepthStencilState>,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

fn create_depth_view(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

// ============================================================================
// SESSION LOADING
// ============================================================================

/// Load the analysis session: a JSON path from argv, or the built-in demo.
/// A bad file is reported once and exits; there is no retry.
fn load_session() -> CorrelationEngine {
    let mut engine = CorrelationEngine::new(LayerConfig::default());

    let payload = match std::env::args().nth(1) {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(contents) => {
                log::info!("loading analysis result from {path}");
                contents
            }
            Err(err) => {
                log::error!("cannot read {path}: {err}");
                std::process::exit(1);
            }
        },
        None => {
            log::info!("no analysis file given, using the built-in demo session");
            DEMO_ANALYSIS.to_string()
        }
    };

    let result = match AnalysisResult::from_json(&payload) {
        Ok(result) => result,
        Err(err) => {
            log::error!("analysis payload rejected: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = engine.rebuild_from_analysis(&result) {
        log::error!("analysis payload rejected: {err}");
        std::process::exit(1);
    }

    engine
}

// ============================================================================
// MAIN
// ============================================================================

fn main() {
    env_logger::init();

    let correlation = load_session();

    let event_loop = EventLoop::new().unwrap();

    let window_attributes = Window::default_attributes()
        .with_title("Species Globe - occurrence layers + bubble trail")
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

    let window = std::sync::Arc::new(event_loop.create_window(window_attributes).unwrap());

    let mut state = pollster::block_on(State::new(window.clone(), correlation));

    event_loop
        .run(move |event, control_flow| {
            match event {
                WinitEvent::WindowEvent { ref event, window_id } if window_id == window.id() => {
                    // egui gets first look; it may claim pointer/keyboard.
                    let response = state.overlay.handle_window_event(&window, event);
                    if !response.consumed {
                        state.input.process_event(event);
                        if let WindowEvent::CursorMoved { position, .. } = event {
                            state
                                .trail
                                .on_pointer_move(position.x as f32, position.y as f32);
                        }
                    }

                    match event {
                        WindowEvent::CloseRequested
                        | WindowEvent::KeyboardInput {
                            event:
                                KeyEvent {
                                    state: ElementState::Pressed,
                                    physical_key: PhysicalKey::Code(KeyCode::Escape),
                                    ..
                                },
                            ..
                        } => {
                            state.trail.deactivate();
                            control_flow.exit();
                        }
                        WindowEvent::Resized(physical_size) => {
                            state.resize(*physical_size);
                        }
                        WindowEvent::RedrawRequested => {
                            state.update();
                            match state.render(&window) {
                                Ok(_) => {}
                                Err(wgpu::SurfaceError::Lost) => state.resize(state.size),
                                Err(wgpu::SurfaceError::OutOfMemory) => control_flow.exit(),
                                Err(e) => log::warn!("surface error: {e:?}"),
                            }
                        }
                        _ => {}
                    }
                }
                WinitEvent::AboutToWait => {
                    window.request_redraw();
                }
                _ => {}
            }
        })
        .unwrap();
}
