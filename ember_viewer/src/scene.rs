//! Procedural demo content: meshes, a checker texture and a gradient sky

use ember_engine::prelude::{MeshData, Vertex};

/// Face normals with the two in-plane axes used to place corners
const CUBE_FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
    ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
    ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
    ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
    ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
];

/// Unit cube centered at the origin, 24 vertices with per-face normals
pub fn cube() -> MeshData {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u, v) in CUBE_FACES {
        let base = vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = [
                0.5 * (normal[0] + su * u[0] + sv * v[0]),
                0.5 * (normal[1] + su * u[1] + sv * v[1]),
                0.5 * (normal[2] + su * u[2] + sv * v[2]),
            ];
            vertices.push(Vertex::new(position, normal, [(su + 1.0) * 0.5, (1.0 - sv) * 0.5]));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    MeshData { vertices, indices }
}

/// Square in the XZ plane facing +Y, `tiles` UV repeats across it
pub fn plane(half_size: f32, tiles: f32) -> MeshData {
    let corners = [(-1.0, 1.0), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];
    let vertices = corners
        .iter()
        .map(|&(x, z)| {
            Vertex::new(
                [x * half_size, 0.0, z * half_size],
                [0.0, 1.0, 0.0],
                [(x + 1.0) * 0.5 * tiles, (z + 1.0) * 0.5 * tiles],
            )
        })
        .collect();

    MeshData {
        vertices,
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

/// RGBA8 checkerboard with `cell`-pixel squares
pub fn checker(size: u32, cell: u32, light: [u8; 4], dark: [u8; 4]) -> Vec<u8> {
    let cell = cell.max(1);
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x / cell + y / cell) % 2 == 0 {
                light
            } else {
                dark
            }
        })
        .collect()
}

/// Six square faces fading from `horizon` at the equator to `zenith` overhead
///
/// Face order is +X, -X, +Y, -Y, +Z, -Z.
pub fn sky_faces(size: u32, zenith: [u8; 3], horizon: [u8; 3]) -> [Vec<u8>; 6] {
    let lerp = |t: f32| -> [u8; 4] {
        let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
        [
            mix(horizon[0], zenith[0]),
            mix(horizon[1], zenith[1]),
            mix(horizon[2], zenith[2]),
            255,
        ]
    };

    let side = || -> Vec<u8> {
        (0..size * size)
            .flat_map(|i| {
                let row = i / size;
                // Rows run top to bottom; the top edge meets +Y.
                let t = 1.0 - row as f32 / (size.max(2) - 1) as f32;
                lerp(t)
            })
            .collect()
    };
    let flat = |t: f32| -> Vec<u8> { (0..size * size).flat_map(|_| lerp(t)).collect() };

    [side(), side(), flat(1.0), flat(0.0), side(), side()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_normals_point_outward() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);

        for vertex in &mesh.vertices {
            let dot: f32 = (0..3).map(|i| vertex.position[i] * vertex.normal[i]).sum();
            assert_relative_eq!(dot, 0.5);
        }
    }

    #[test]
    fn test_cube_winding_matches_normals() {
        let mesh = cube();
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.vertices[tri[i] as usize].position);
            let e1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            let e2 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
            let cross = [
                e1[1] * e2[2] - e1[2] * e2[1],
                e1[2] * e2[0] - e1[0] * e2[2],
                e1[0] * e2[1] - e1[1] * e2[0],
            ];
            let normal = mesh.vertices[tri[0] as usize].normal;
            let dot: f32 = (0..3).map(|i| cross[i] * normal[i]).sum();
            assert!(dot > 0.0, "triangle {tri:?} winds against its normal");
        }
    }

    #[test]
    fn test_checker_pattern() {
        let white = [255, 255, 255, 255];
        let black = [0, 0, 0, 255];
        let pixels = checker(4, 2, white, black);
        assert_eq!(pixels.len(), 4 * 4 * 4);
        assert_eq!(&pixels[0..4], &white);
        assert_eq!(&pixels[8..12], &black);
        // Third row starts a dark cell.
        assert_eq!(&pixels[32..36], &black);
    }

    #[test]
    fn test_sky_faces_blend_toward_zenith() {
        let faces = sky_faces(8, [0, 0, 200], [200, 200, 200]);
        assert!(faces.iter().all(|face| face.len() == 8 * 8 * 4));

        let top_row_blue = faces[0][2];
        let bottom_row_red = faces[0][(7 * 8) * 4];
        assert_eq!(top_row_blue, 200);
        assert_eq!(faces[0][0], 0);
        assert_eq!(bottom_row_red, 200);
        assert_eq!(&faces[2][0..3], &[0, 0, 200]);
    }
}
