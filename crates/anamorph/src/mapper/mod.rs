//! Anamorphic vertex mapping and the mapper lifecycle.
//!
//! Purpose
//! - Place every source vertex along the final bounce of its reflection chain
//!   so the mapped mesh, viewed through the mirrors, lines up with the source
//!   silhouette.
//! - Own the `None → Mapped → Optimized` lifecycle: optimization always starts
//!   from the mapped snapshot, re-mapping replaces everything.
//!
//! Why this design
//! - Each stage produces an owned snapshot (`MappedScene`, `OptimizedMesh`);
//!   the state enum holds them, so a stale optimized mesh can never outlive the
//!   mapping it was derived from.

mod scene;

pub use scene::{optimize_scene, MappedScene, OptimizeDetail, OptimizedMesh};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AnamorphError, Result};
use crate::mesh::{recalculate_normals, reverse_winding, MeshBuffers, MeshSink, SourceMesh, VertexIdentity};
use crate::optimize::{OptimizeCfg, OptimizeMethod, RayField, RunReport};
use crate::raycast::Raycaster;
use crate::tracer::{TraceCfg, Tracing};

/// Smallest accepted `MapCfg::scale` and `MapCfg::min_distance`.
pub const MIN_SCALE: f64 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapCfg {
    /// Multiplier on the vertex-to-mirror distance.
    pub scale: f64,
    /// Lower bound on how far a mapped vertex sits from its last hit.
    pub min_distance: Option<f64>,
}

impl Default for MapCfg {
    fn default() -> Self {
        Self {
            scale: 1.0,
            min_distance: None,
        }
    }
}

impl MapCfg {
    pub fn validate(&self) -> Result<()> {
        if !(self.scale >= MIN_SCALE) {
            return Err(AnamorphError::invalid(format!(
                "scale must be >= {MIN_SCALE}, got {}",
                self.scale
            )));
        }
        if let Some(d) = self.min_distance {
            if !(d > MIN_SCALE) {
                return Err(AnamorphError::invalid(format!(
                    "min_distance must be > {MIN_SCALE}, got {d}"
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn floor(&self) -> f64 {
        self.min_distance.unwrap_or(0.0)
    }
}

/// Complete mapper configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperCfg {
    pub trace: TraceCfg,
    pub map: MapCfg,
    pub optimizer: OptimizeCfg,
}

impl MapperCfg {
    pub fn validate(&self) -> Result<()> {
        self.trace.validate()?;
        self.map.validate()?;
        self.optimizer.validate()
    }
}

/// Mapped positions plus a per-vertex flag telling which vertices had a ray.
pub fn map_vertices(tracing: &Tracing, cfg: &MapCfg) -> (Vec<Vector3<f64>>, Vec<bool>) {
    let field = RayField::from_tracing(tracing, cfg.scale, cfg.floor());
    (field.positions(), field.valid)
}

/// Renderable result of mapping one source mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct MappedMesh {
    pub name: String,
    pub buffers: MeshBuffers,
    pub valid: Vec<bool>,
}

impl MappedMesh {
    pub fn invalid_count(&self) -> usize {
        self.valid.iter().filter(|v| !**v).count()
    }
}

/// Assemble the mapped mesh: reversed winding, source UVs, world source
/// normals as side channel, normals recomputed on the mapped positions.
pub fn build_mapped_mesh(
    source: &SourceMesh,
    tracing: &Tracing,
    cfg: &MapCfg,
    identity: &VertexIdentity,
) -> Result<MappedMesh> {
    source.validate()?;
    if tracing.len() != source.vertices.len() {
        return Err(AnamorphError::LengthMismatch {
            expected: source.vertices.len(),
            actual: tracing.len(),
        });
    }
    let (vertices, valid) = map_vertices(tracing, cfg);
    let triangles = reverse_winding(&source.triangles);
    let normals = recalculate_normals(&vertices, &triangles, identity, source.continuous);
    Ok(MappedMesh {
        name: mapped_name(&source.name),
        buffers: MeshBuffers {
            vertices,
            triangles,
            uv0: source.uv0(),
            source_normals: source.global_normals(),
            normals,
        },
        valid,
    })
}

fn mapped_name(source: &str) -> String {
    format!("{source}_mapped")
}

/// Lifecycle phase of an `AnamorphicMapper`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingStatus {
    None,
    Mapped,
    Optimized,
}

impl MappingStatus {
    pub fn name(self) -> &'static str {
        match self {
            MappingStatus::None => "None",
            MappingStatus::Mapped => "Mapped",
            MappingStatus::Optimized => "Optimized",
        }
    }
}

#[derive(Clone, Debug, Default)]
enum MappingState {
    #[default]
    None,
    Mapped(Box<MappedScene>),
    Optimized {
        scene: Box<MappedScene>,
        optimized: Box<OptimizedMesh>,
    },
}

/// Maps source meshes through the mirrors of a `Raycaster`.
pub struct AnamorphicMapper<R: Raycaster> {
    cfg: MapperCfg,
    raycaster: R,
    state: MappingState,
}

impl<R: Raycaster> AnamorphicMapper<R> {
    pub fn new(raycaster: R, cfg: MapperCfg) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            raycaster,
            state: MappingState::None,
        })
    }

    #[inline]
    pub fn cfg(&self) -> &MapperCfg {
        &self.cfg
    }

    /// Replace the configuration; takes effect on the next map/optimize call.
    pub fn set_cfg(&mut self, cfg: MapperCfg) -> Result<()> {
        cfg.validate()?;
        self.cfg = cfg;
        Ok(())
    }

    #[inline]
    pub fn raycaster(&self) -> &R {
        &self.raycaster
    }

    #[inline]
    pub fn raycaster_mut(&mut self) -> &mut R {
        &mut self.raycaster
    }

    pub fn status(&self) -> MappingStatus {
        match self.state {
            MappingState::None => MappingStatus::None,
            MappingState::Mapped(_) => MappingStatus::Mapped,
            MappingState::Optimized { .. } => MappingStatus::Optimized,
        }
    }

    /// Trace and map `source` as seen from `view_point`. Valid from every
    /// state; any previous mapping or optimization is discarded.
    pub fn map_object(&mut self, source: &SourceMesh, view_point: Vector3<f64>) -> Result<&MappedMesh> {
        self.cfg.validate()?;
        let scene = MappedScene::build(source, view_point, &self.raycaster, &self.cfg)?;
        info!(
            object = %source.name,
            vertices = source.vertices.len(),
            invalid = scene.mesh.invalid_count(),
            total_deviation = scene.total_deviation,
            "mapped object"
        );
        self.state = MappingState::Mapped(Box::new(scene));
        match &self.state {
            MappingState::Mapped(scene) => Ok(&scene.mesh),
            _ => Err(AnamorphError::state("map", self.status().name())),
        }
    }

    /// Run `method` on the mapped mesh. Valid from `Mapped` and `Optimized`;
    /// a repeated call starts again from the mapped snapshot.
    pub fn optimize(&mut self, method: OptimizeMethod) -> Result<&OptimizedMesh> {
        let scene = match &self.state {
            MappingState::None => return Err(AnamorphError::state("optimize", "None")),
            MappingState::Mapped(scene) | MappingState::Optimized { scene, .. } => scene,
        };
        let optimized = optimize_scene(scene, method, &self.cfg.optimizer)?;
        let scene = match std::mem::take(&mut self.state) {
            MappingState::Mapped(scene) | MappingState::Optimized { scene, .. } => scene,
            MappingState::None => return Err(AnamorphError::state("optimize", "None")),
        };
        self.state = MappingState::Optimized {
            scene,
            optimized: Box::new(optimized),
        };
        self.optimized()
            .ok_or_else(|| AnamorphError::state("optimize", self.status().name()))
    }

    /// Drop all mapping results.
    pub fn clear(&mut self) {
        self.state = MappingState::None;
    }

    pub fn scene(&self) -> Option<&MappedScene> {
        match &self.state {
            MappingState::None => None,
            MappingState::Mapped(scene) | MappingState::Optimized { scene, .. } => Some(scene),
        }
    }

    pub fn mapped(&self) -> Option<&MappedMesh> {
        self.scene().map(|s| &s.mesh)
    }

    pub fn optimized(&self) -> Option<&OptimizedMesh> {
        match &self.state {
            MappingState::Optimized { optimized, .. } => Some(optimized),
            _ => None,
        }
    }

    /// The mesh a renderer should show: optimized if present, else mapped.
    pub fn active_mesh(&self) -> Option<(&str, &MeshBuffers)> {
        match &self.state {
            MappingState::None => None,
            MappingState::Mapped(scene) => Some((&scene.mesh.name, &scene.mesh.buffers)),
            MappingState::Optimized { scene, optimized } => {
                Some((&scene.mesh.name, &optimized.buffers))
            }
        }
    }

    /// Hand the active mesh to `sink`.
    pub fn publish<S: MeshSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        let (name, mesh) = self
            .active_mesh()
            .ok_or_else(|| AnamorphError::state("publish", "None"))?;
        sink.accept(name, mesh);
        Ok(())
    }

    /// Persistence record of the current optimization.
    pub fn report(&self) -> Result<RunReport> {
        match &self.state {
            MappingState::Optimized { scene, optimized } => {
                Ok(optimized.report(&scene.source.name, &self.cfg.optimizer))
            }
            _ => Err(AnamorphError::state("report", self.status().name())),
        }
    }
}

impl<R: Raycaster + MeshSink> AnamorphicMapper<R> {
    /// Register the active mesh with the raycaster (collision proxy). Later
    /// bounces may then hit the mapped mesh itself.
    pub fn publish_collider(&mut self) -> Result<()> {
        let (name, mesh) = match &self.state {
            MappingState::None => return Err(AnamorphError::state("publish_collider", "None")),
            MappingState::Mapped(scene) => (scene.mesh.name.clone(), scene.mesh.buffers.clone()),
            MappingState::Optimized { scene, optimized } => {
                (scene.mesh.name.clone(), optimized.buffers.clone())
            }
        };
        self.raycaster.accept(&name, &mesh);
        Ok(())
    }
}
