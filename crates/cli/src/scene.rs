//! JSON scene files: mirrors, source objects, view point and configuration.
//!
//! Every section falls back to defaults, so a scene only names what it
//! changes. Minimal example:
//!
//! ```json
//! {
//!   "view_point": [0, 0, 0],
//!   "mirrors": [{ "kind": "flat", "half_width": 5, "half_height": 5,
//!                 "transform": { "translation": [0, 0, 5] } }],
//!   "objects": [{ "name": "card", "shape": { "kind": "grid", "n": 8 },
//!                 "transform": { "translation": [0, 0, 2] } }]
//! }
//! ```

use anamorph::api::{
    curved_square, flat_quad, CurveDirection, DeformMethod, MapperCfg, SourceMesh, Surface,
    SurfaceKind, Transform, TriangleScene,
};
use anyhow::{bail, Context, Result};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSpec {
    pub translation: [f64; 3],
    /// Euler angles in degrees (x, y, z).
    pub rotation_deg: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation_deg: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

impl TransformSpec {
    pub fn to_transform(&self) -> Transform {
        Transform::from_euler_deg(
            Vector3::from(self.translation),
            Vector3::from(self.rotation_deg),
            Vector3::from(self.scale),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MirrorSpec {
    Flat {
        #[serde(default)]
        name: Option<String>,
        half_width: f64,
        half_height: f64,
        #[serde(default)]
        transform: TransformSpec,
    },
    Curved {
        #[serde(default)]
        name: Option<String>,
        x_size: usize,
        y_size: usize,
        radius: f64,
        #[serde(default)]
        direction: CurveDirection,
        #[serde(default)]
        transform: TransformSpec,
    },
    /// Arbitrary triangle surface in its local frame.
    Mesh {
        name: String,
        vertices: Vec<[f64; 3]>,
        triangles: Vec<[usize; 3]>,
        #[serde(default)]
        transform: TransformSpec,
    },
}

impl MirrorSpec {
    pub fn build(&self, index: usize) -> Result<Surface> {
        let (surface, name, transform) = match self {
            MirrorSpec::Flat {
                name,
                half_width,
                half_height,
                transform,
            } => (flat_quad(*half_width, *half_height), name.clone(), transform),
            MirrorSpec::Curved {
                name,
                x_size,
                y_size,
                radius,
                direction,
                transform,
            } => (
                curved_square(*x_size, *y_size, *radius, *direction)
                    .with_context(|| format!("building curved mirror #{index}"))?,
                name.clone(),
                transform,
            ),
            MirrorSpec::Mesh {
                name,
                vertices,
                triangles,
                transform,
            } => {
                if let Some(bad) = triangles.iter().flatten().find(|&&i| i >= vertices.len()) {
                    bail!("mirror {name}: triangle index {bad} out of range");
                }
                (
                    Surface::new(
                        name.clone(),
                        SurfaceKind::Mirror,
                        vertices.iter().map(|&v| Vector3::from(v)).collect(),
                        triangles.clone(),
                    ),
                    Some(name.clone()),
                    transform,
                )
            }
        };
        let mut surface = surface.transformed(&transform.to_transform());
        surface.name = name.unwrap_or_else(|| format!("mirror{index}"));
        Ok(surface)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeSpec {
    /// `n × n` square grid spanning `[-half, half]²` in the local xy-plane,
    /// facing `-z`.
    Grid {
        n: usize,
        #[serde(default = "default_half")]
        half: f64,
    },
    Mesh {
        vertices: Vec<[f64; 3]>,
        triangles: Vec<[usize; 3]>,
        #[serde(default)]
        uvs: Vec<[f64; 2]>,
        #[serde(default)]
        normals: Option<Vec<[f64; 3]>>,
    },
}

fn default_half() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub name: String,
    pub shape: ShapeSpec,
    #[serde(default)]
    pub transform: TransformSpec,
    #[serde(default = "default_true")]
    pub continuous: bool,
}

impl ObjectSpec {
    pub fn build(&self) -> Result<SourceMesh> {
        let (vertices, triangles, uvs, normals) = match &self.shape {
            ShapeSpec::Grid { n, half } => {
                if *n < 2 {
                    bail!("object {}: grid needs n >= 2, got {n}", self.name);
                }
                grid(*n, *half)
            }
            ShapeSpec::Mesh {
                vertices,
                triangles,
                uvs,
                normals,
            } => (
                vertices.iter().map(|&v| Vector3::from(v)).collect(),
                triangles.clone(),
                uvs.iter().map(|&uv| Vector2::from(uv)).collect(),
                normals
                    .as_ref()
                    .map(|ns| ns.iter().map(|&n| Vector3::from(n)).collect()),
            ),
        };
        let mesh = SourceMesh {
            name: self.name.clone(),
            vertices,
            triangles,
            uvs,
            normals,
            transform: self.transform.to_transform(),
            continuous: self.continuous,
        };
        mesh.validate()
            .with_context(|| format!("object {} is not a valid mesh", self.name))?;
        Ok(mesh)
    }
}

type Buffers = (
    Vec<Vector3<f64>>,
    Vec<[usize; 3]>,
    Vec<Vector2<f64>>,
    Option<Vec<Vector3<f64>>>,
);

fn grid(n: usize, half: f64) -> Buffers {
    let mut vertices = Vec::with_capacity(n * n);
    let mut uvs = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            let u = i as f64 / (n - 1) as f64;
            let v = j as f64 / (n - 1) as f64;
            vertices.push(Vector3::new((2.0 * u - 1.0) * half, (2.0 * v - 1.0) * half, 0.0));
            uvs.push(Vector2::new(u, v));
        }
    }
    let mut triangles = Vec::with_capacity(2 * (n - 1) * (n - 1));
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let a = j * n + i;
            triangles.push([a, a + n, a + 1]);
            triangles.push([a + 1, a + n, a + n + 1]);
        }
    }
    (vertices, triangles, uvs, None)
}

/// Top-level scene file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneFile {
    pub view_point: [f64; 3],
    pub mapper: MapperCfg,
    /// Deformation used by the `experiment` command.
    pub deformation: DeformMethod,
    pub mirrors: Vec<MirrorSpec>,
    pub objects: Vec<ObjectSpec>,
}

impl SceneFile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading scene {}", path.display()))?;
        let scene: SceneFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing scene {}", path.display()))?;
        scene
            .mapper
            .validate()
            .with_context(|| format!("validating configuration in {}", path.display()))?;
        Ok(scene)
    }

    pub fn view_point(&self) -> Vector3<f64> {
        Vector3::from(self.view_point)
    }

    pub fn raycaster(&self) -> Result<TriangleScene> {
        let mut scene = TriangleScene::new();
        for (i, m) in self.mirrors.iter().enumerate() {
            scene.add(m.build(i)?);
        }
        Ok(scene)
    }

    pub fn sources(&self) -> Result<Vec<SourceMesh>> {
        self.objects.iter().map(ObjectSpec::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SCENE: &str = r#"{
        "view_point": [0, 0, 0],
        "mapper": { "map": { "scale": 1.0 }, "optimizer": { "method": "anneal", "seed": 3 } },
        "deformation": { "kind": "random_scale", "amplitude": 0.02, "seed": 9 },
        "mirrors": [
            { "kind": "flat", "half_width": 5, "half_height": 5,
              "transform": { "translation": [0, 0, 5] } },
            { "kind": "curved", "name": "side", "x_size": 4, "y_size": 4, "radius": 2,
              "transform": { "translation": [10, 0, 5] } }
        ],
        "objects": [
            { "name": "card", "shape": { "kind": "grid", "n": 3 },
              "transform": { "translation": [0, 0, 2] } }
        ]
    }"#;

    #[test]
    fn parses_scene_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scene.json");
        fs::write(&path, SCENE).unwrap();
        let scene = SceneFile::load(&path).unwrap();
        assert_eq!(scene.mapper.optimizer.seed, 3);
        assert_eq!(scene.mapper.trace.max_reflections, 3);
        assert_eq!(
            scene.deformation,
            DeformMethod::RandomScale {
                amplitude: 0.02,
                seed: 9
            }
        );

        let rc = scene.raycaster().unwrap();
        let names: Vec<_> = rc.surfaces.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["mirror0", "side"]);
        assert!(rc.surfaces[0].vertices.iter().all(|v| v.z == 5.0));

        let sources = scene.sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].vertices.len(), 9);
        assert_eq!(sources[0].triangles.len(), 8);
        assert!(sources[0].continuous);
        assert_eq!(sources[0].global_vertices()[0], Vector3::new(-0.5, -0.5, 2.0));
    }

    #[test]
    fn bundled_scene_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenes/curved.json");
        let scene = SceneFile::load(&path).unwrap();
        assert_eq!(scene.raycaster().unwrap().surfaces[0].name, "cylinder");
        assert_eq!(scene.sources().unwrap()[0].vertices.len(), 64);
        assert_eq!(scene.mapper.optimizer.sample_rate, 10);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scene.json");
        fs::write(&path, r#"{ "mapper": { "trace": { "max_reflections": 0 } } }"#).unwrap();
        assert!(SceneFile::load(&path).is_err());
    }

    #[test]
    fn rejects_out_of_range_triangles() {
        let obj = ObjectSpec {
            name: "bad".into(),
            shape: ShapeSpec::Mesh {
                vertices: vec![[0.0; 3]; 3],
                triangles: vec![[0, 1, 3]],
                uvs: Vec::new(),
                normals: None,
            },
            transform: TransformSpec::default(),
            continuous: true,
        };
        assert!(obj.build().is_err());
    }
}
