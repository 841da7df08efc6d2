//! Ray-surface intersection provider.
//!
//! The tracer only needs `Raycaster`; `TriangleScene` is a brute-force
//! implementation over tagged triangle surfaces (Möller–Trumbore), enough for
//! scenes with a few mirrors and occluders.

use nalgebra::Vector3;

use crate::mesh::{MeshBuffers, MeshSink, Transform};

/// Hits closer than this to the ray origin are ignored, so a bounce cast from
/// a hit point does not find its own surface again.
pub const MIN_HIT_DISTANCE: f64 = 1e-9;

/// Single ray hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub point: Vector3<f64>,
    /// Unit surface normal facing the incoming ray.
    pub normal: Vector3<f64>,
    pub distance: f64,
    /// Index of the surface in the provider (informational).
    pub surface: usize,
}

/// Which surfaces a cast may hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceFilter {
    Mirrors,
    All,
}

/// Intersection provider contract: all hits along the ray within
/// `max_distance`, nearest first. `direction` need not be normalized.
pub trait Raycaster {
    fn raycast_all(
        &self,
        origin: Vector3<f64>,
        direction: Vector3<f64>,
        max_distance: f64,
        filter: SurfaceFilter,
    ) -> Vec<Hit>;

    /// Nearest hit only.
    fn raycast(
        &self,
        origin: Vector3<f64>,
        direction: Vector3<f64>,
        max_distance: f64,
        filter: SurfaceFilter,
    ) -> Option<Hit> {
        self.raycast_all(origin, direction, max_distance, filter)
            .into_iter()
            .next()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceKind {
    Mirror,
    Occluder,
}

/// Triangle surface in world space.
#[derive(Clone, Debug)]
pub struct Surface {
    pub name: String,
    pub kind: SurfaceKind,
    pub vertices: Vec<Vector3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

impl Surface {
    pub fn new(
        name: impl Into<String>,
        kind: SurfaceKind,
        vertices: Vec<Vector3<f64>>,
        triangles: Vec<[usize; 3]>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            vertices,
            triangles,
        }
    }

    /// Copy with every vertex mapped through `tf`.
    pub fn transformed(&self, tf: &Transform) -> Self {
        Self {
            vertices: self
                .vertices
                .iter()
                .map(|&v| tf.transform_point(v))
                .collect(),
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TriangleScene {
    pub surfaces: Vec<Surface>,
    /// Report hits on triangles facing away from the ray (normal flipped).
    pub hit_backfaces: bool,
}

impl TriangleScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.add(surface);
        self
    }

    /// Add a surface, replacing any surface with the same name.
    pub fn add(&mut self, surface: Surface) {
        match self.surfaces.iter_mut().find(|s| s.name == surface.name) {
            Some(slot) => *slot = surface,
            None => self.surfaces.push(surface),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Surface> {
        let pos = self.surfaces.iter().position(|s| s.name == name)?;
        Some(self.surfaces.remove(pos))
    }

    fn intersect_triangle(
        &self,
        origin: Vector3<f64>,
        dir: Vector3<f64>,
        [a, b, c]: [Vector3<f64>; 3],
    ) -> Option<(f64, Vector3<f64>)> {
        let e1 = b - a;
        let e2 = c - a;
        let pvec = dir.cross(&e2);
        let det = e1.dot(&pvec);
        // det > 0 ⇔ the ray enters the front face (dir · normal < 0).
        if det.abs() < 1e-15 || (!self.hit_backfaces && det < 0.0) {
            return None;
        }
        let inv = 1.0 / det;
        let tvec = origin - a;
        let u = tvec.dot(&pvec) * inv;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(&e1);
        let v = dir.dot(&qvec) * inv;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(&qvec) * inv;
        let normal = e1.cross(&e2).try_normalize(0.0)?;
        let normal = if det < 0.0 { -normal } else { normal };
        Some((t, normal))
    }
}

impl Raycaster for TriangleScene {
    fn raycast_all(
        &self,
        origin: Vector3<f64>,
        direction: Vector3<f64>,
        max_distance: f64,
        filter: SurfaceFilter,
    ) -> Vec<Hit> {
        let Some(dir) = direction.try_normalize(0.0) else {
            return Vec::new();
        };
        let mut hits = Vec::new();
        for (s, surface) in self.surfaces.iter().enumerate() {
            if filter == SurfaceFilter::Mirrors && surface.kind != SurfaceKind::Mirror {
                continue;
            }
            for &[ia, ib, ic] in &surface.triangles {
                let tri = [
                    surface.vertices[ia],
                    surface.vertices[ib],
                    surface.vertices[ic],
                ];
                if let Some((t, normal)) = self.intersect_triangle(origin, dir, tri) {
                    if t > MIN_HIT_DISTANCE && t <= max_distance {
                        hits.push(Hit {
                            point: origin + dir * t,
                            normal,
                            distance: t,
                            surface: s,
                        });
                    }
                }
            }
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

/// Published meshes become occluders (the collision proxy of the mapped object).
impl MeshSink for TriangleScene {
    fn accept(&mut self, name: &str, mesh: &MeshBuffers) {
        self.add(Surface::new(
            name,
            SurfaceKind::Occluder,
            mesh.vertices.clone(),
            mesh.triangles.clone(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::vector;

    /// Unit quad in the plane z = `z`, facing -z (towards a viewer at z < `z`).
    fn quad(name: &str, kind: SurfaceKind, z: f64) -> Surface {
        Surface::new(
            name,
            kind,
            vec![
                vector![-1.0, -1.0, z],
                vector![1.0, -1.0, z],
                vector![1.0, 1.0, z],
                vector![-1.0, 1.0, z],
            ],
            vec![[0, 2, 1], [0, 3, 2]],
        )
    }

    #[test]
    fn nearest_first_and_filtered() {
        let scene = TriangleScene::new()
            .with_surface(quad("far", SurfaceKind::Mirror, 5.0))
            .with_surface(quad("near", SurfaceKind::Occluder, 2.0));
        let o = vector![0.1, 0.2, 0.0];
        let all = scene.raycast_all(o, vector![0.0, 0.0, 1.0], 100.0, SurfaceFilter::All);
        assert_eq!(all.len(), 2);
        assert!((all[0].distance - 2.0).abs() < 1e-12);
        assert!((all[0].normal - vector![0.0, 0.0, -1.0]).norm() < 1e-12);
        let mirrors = scene.raycast(o, vector![0.0, 0.0, 3.0], 100.0, SurfaceFilter::Mirrors);
        let m = mirrors.expect("mirror hit");
        assert!((m.point - vector![0.1, 0.2, 5.0]).norm() < 1e-12);
        assert_eq!(m.surface, 0);
    }

    #[test]
    fn max_distance_and_backfaces() {
        let mut scene = TriangleScene::new().with_surface(quad("m", SurfaceKind::Mirror, 5.0));
        let o = vector![0.0, 0.3, 0.0];
        assert!(scene
            .raycast(o, vector![0.0, 0.0, 1.0], 4.0, SurfaceFilter::All)
            .is_none());
        // From behind the quad the back face is skipped unless enabled.
        let behind = vector![0.0, 0.3, 10.0];
        assert!(scene
            .raycast(behind, vector![0.0, 0.0, -1.0], 100.0, SurfaceFilter::All)
            .is_none());
        scene.hit_backfaces = true;
        let h = scene
            .raycast(behind, vector![0.0, 0.0, -1.0], 100.0, SurfaceFilter::All)
            .unwrap();
        assert!((h.normal - vector![0.0, 0.0, 1.0]).norm() < 1e-12);
    }

    #[test]
    fn sink_replaces_surface_by_name() {
        let mut scene = TriangleScene::new();
        let mesh = MeshBuffers {
            vertices: quad("x", SurfaceKind::Occluder, 1.0).vertices,
            triangles: vec![[0, 2, 1]],
            ..Default::default()
        };
        scene.accept("mapped", &mesh);
        scene.accept("mapped", &mesh);
        assert_eq!(scene.surfaces.len(), 1);
        assert_eq!(scene.surfaces[0].kind, SurfaceKind::Occluder);
    }
}
