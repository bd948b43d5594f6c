// Globe mesh and shared spherical geometry.
//
// The globe is a UV sphere of unit radius centered at the origin. Beacons,
// heat samples, and arc endpoints all go through lat_lng_to_unit so every
// layer agrees on where a coordinate sits on that sphere.

use glam::Vec3;

// ============================================================================
// GPU VERTEX
// ============================================================================

/// GPU-ready vertex with position and normal:
///   @location(0) position: vec3<f32>
///   @location(1) normal:   vec3<f32>
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl GpuVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GpuVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// GPU-ready triangulated mesh.
/// Upload vertex_bytes() to a VERTEX buffer, index_bytes() to an INDEX buffer.
pub struct RenderMesh {
    pub vertices: Vec<GpuVertex>,
    pub indices: Vec<u32>,
}

impl RenderMesh {
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

// ============================================================================
// SPHERICAL GEOMETRY
// ============================================================================

/// Map geographic coordinates (degrees) onto the unit sphere.
///
/// lat 90 → +Y pole, lat -90 → -Y pole; lng 0 sits on +Z with longitude
/// growing eastward toward +X.
pub fn lat_lng_to_unit(lat: f64, lng: f64) -> Vec3 {
    let lat = (lat as f32).to_radians();
    let lng = (lng as f32).to_radians();
    Vec3::new(
        lat.cos() * lng.sin(),
        lat.sin(),
        lat.cos() * lng.cos(),
    )
}

/// Sample an arc between two surface points as a polyline.
///
/// Points are slerped along the great circle and lifted outward by a bump
/// proportional to the angular span, peaking mid-arc, so short hops hug
/// the surface while long hauls loop high. Degenerate pairs (identical or antipodal
/// endpoints, where slerp is ill-defined) fall back to a straight blend.
pub fn arc_polyline(start: Vec3, end: Vec3, segments: usize, max_altitude: f32) -> Vec<Vec3> {
    let segments = segments.max(1);
    let cos_span = start.dot(end).clamp(-1.0, 1.0);
    let span = cos_span.acos();
    let altitude = max_altitude * (span / std::f32::consts::PI);

    let mut out = Vec::with_capacity(segments + 1);
    for i in 0..=segments {
        let t = i as f32 / segments as f32;
        let point = if span < 1e-4 || (std::f32::consts::PI - span) < 1e-4 {
            (start.lerp(end, t)).normalize_or_zero()
        } else {
            // Spherical interpolation between the endpoints.
            let a = ((1.0 - t) * span).sin() / span.sin();
            let b = (t * span).sin() / span.sin();
            (start * a + end * b).normalize()
        };
        // sin(πt) peaks at the midpoint and is zero at both ends.
        let lift = 1.0 + altitude * (std::f32::consts::PI * t).sin();
        out.push(point * lift);
    }
    out
}

// ============================================================================
// GLOBE MESH
// ============================================================================

/// Build a unit UV sphere with `rings` latitude bands and `sectors`
/// longitude bands. Normals equal positions on a unit sphere, so lighting
/// needs no separate accumulation pass.
pub fn build_globe(rings: u32, sectors: u32) -> RenderMesh {
    debug_assert!(rings >= 3 && sectors >= 3, "sphere needs at least 3x3 bands");

    let mut vertices = Vec::with_capacity(((rings + 1) * (sectors + 1)) as usize);
    for ring in 0..=rings {
        // v from +90 (north pole) to -90.
        let lat = 90.0 - 180.0 * ring as f64 / rings as f64;
        for sector in 0..=sectors {
            let lng = -180.0 + 360.0 * sector as f64 / sectors as f64;
            let p = lat_lng_to_unit(lat, lng);
            vertices.push(GpuVertex {
                position: p.to_array(),
                normal: p.to_array(),
            });
        }
    }

    let stride = sectors + 1;
    let mut indices = Vec::with_capacity((rings * sectors * 6) as usize);
    for ring in 0..rings {
        for sector in 0..sectors {
            let a = ring * stride + sector;
            let b = a + stride;
            // Two CCW triangles per quad, viewed from outside.
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }

    RenderMesh { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn lat_lng_landmarks() {
        assert!(close(lat_lng_to_unit(90.0, 0.0), Vec3::Y));
        assert!(close(lat_lng_to_unit(-90.0, 0.0), -Vec3::Y));
        assert!(close(lat_lng_to_unit(0.0, 0.0), Vec3::Z));
        assert!(close(lat_lng_to_unit(0.0, 90.0), Vec3::X));
        assert!(close(lat_lng_to_unit(0.0, 180.0), -Vec3::Z));
    }

    #[test]
    fn lat_lng_is_always_unit_length() {
        for lat in [-89.0, -45.5, 0.0, 17.25, 88.0] {
            for lng in [-179.0, -90.0, 0.0, 45.0, 179.5] {
                let p = lat_lng_to_unit(lat, lng);
                assert!((p.length() - 1.0).abs() < 1e-5, "({lat}, {lng})");
            }
        }
    }

    #[test]
    fn arc_polyline_touches_endpoints_and_lifts_midpoint() {
        let start = lat_lng_to_unit(0.0, 0.0);
        let end = lat_lng_to_unit(0.0, 90.0);
        let line = arc_polyline(start, end, 16, 0.4);

        assert_eq!(line.len(), 17);
        assert!(close(line[0], start));
        assert!(close(line[16], end));
        // Interior points sit above the surface.
        assert!(line[8].length() > 1.01);
        // And below the configured ceiling.
        assert!(line[8].length() <= 1.0 + 0.4 + 1e-4);
    }

    #[test]
    fn degenerate_arc_does_not_produce_nan() {
        let p = lat_lng_to_unit(10.0, 20.0);
        for v in arc_polyline(p, p, 8, 0.4) {
            assert!(v.is_finite());
        }
        let antipode = -p;
        for v in arc_polyline(p, antipode, 8, 0.4) {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn globe_mesh_counts() {
        let mesh = build_globe(16, 32);
        assert_eq!(mesh.vertices.len(), 17 * 33);
        assert_eq!(mesh.index_count(), 16 * 32 * 6);
        // Every vertex is on the unit sphere.
        for v in &mesh.vertices {
            let p = Vec3::from_array(v.position);
            assert!((p.length() - 1.0).abs() < 1e-4);
        }
    }
}
