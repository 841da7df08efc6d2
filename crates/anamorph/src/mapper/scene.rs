use nalgebra::Vector3;
use tracing::{debug, info};

use super::{build_mapped_mesh, MappedMesh, MapperCfg};
use crate::error::Result;
use crate::mesh::{recalculate_normals, MeshBuffers, SourceMesh, VertexIdentity, IDENTITY_EPS};
use crate::optimize::{
    angular_deviation, depth_offset, mirrored_normals, planar_correction, propagate,
    total_deviation, OptimizeCfg, OptimizeMethod, OptimizerRun, PlanarOutcome, PropagationInput,
    PropagationOutcome, RayField, RayMesh, RunReport, RunSummary, TrialLog,
};
use crate::raycast::Raycaster;
use crate::tracer::{trace, Tracing};

/// Everything derived from one `map_object` call.
#[derive(Clone, Debug)]
pub struct MappedScene {
    pub source: SourceMesh,
    pub view_point: Vector3<f64>,
    pub global_vertices: Vec<Vector3<f64>>,
    pub global_normals: Vec<Vector3<f64>>,
    /// Built from the global source positions; shared by mapped and optimized meshes.
    pub identity: VertexIdentity,
    pub tracing: Tracing,
    pub field: RayField,
    pub mesh: MappedMesh,
    /// Total deviation of the mapped normals from the ideal normals.
    pub total_deviation: f64,
    pub ideal_normals: Vec<Vector3<f64>>,
}

impl MappedScene {
    pub fn build<R: Raycaster + ?Sized>(
        source: &SourceMesh,
        view_point: Vector3<f64>,
        raycaster: &R,
        cfg: &MapperCfg,
    ) -> Result<Self> {
        source.validate()?;
        let global_vertices = source.global_vertices();
        let global_normals = source.global_normals();
        let identity = VertexIdentity::build(&global_vertices, IDENTITY_EPS);
        let tracing = trace(view_point, &global_vertices, raycaster, &cfg.trace)?;
        let field = RayField::from_tracing(&tracing, cfg.map.scale, cfg.map.floor());
        let mesh = build_mapped_mesh(source, &tracing, &cfg.map, &identity)?;
        let ideal_normals = mirrored_normals(&global_normals, cfg.optimizer.ideal_axis());
        let total = total_deviation(&angular_deviation(&ideal_normals, &mesh.buffers.normals)?);
        debug!(
            groups = identity.group_count(),
            vertices = global_vertices.len(),
            "mapped scene built"
        );
        Ok(Self {
            source: source.clone(),
            view_point,
            global_vertices,
            global_normals,
            identity,
            tracing,
            field,
            mesh,
            total_deviation: total,
            ideal_normals,
        })
    }

    /// Mesh buffers of the mapped mesh with new positions and recomputed normals.
    pub fn with_positions(&self, positions: Vec<Vector3<f64>>) -> MeshBuffers {
        let normals = recalculate_normals(
            &positions,
            &self.mesh.buffers.triangles,
            &self.identity,
            self.source.continuous,
        );
        MeshBuffers {
            vertices: positions,
            normals,
            ..self.mesh.buffers.clone()
        }
    }
}

/// Strategy-specific diagnostics of an optimization.
#[derive(Clone, Debug)]
pub enum OptimizeDetail {
    Planar(PlanarOutcome),
    Propagation(PropagationOutcome),
    Iterative { summary: RunSummary, log: TrialLog },
    DepthOffset,
}

#[derive(Clone, Debug)]
pub struct OptimizedMesh {
    pub method: OptimizeMethod,
    pub buffers: MeshBuffers,
    pub initial_total: f64,
    pub final_total: f64,
    pub detail: OptimizeDetail,
}

impl OptimizedMesh {
    pub fn report(&self, object_name: &str, cfg: &OptimizeCfg) -> RunReport {
        let trials = match &self.detail {
            OptimizeDetail::Iterative { log, .. } => log.trials.clone(),
            _ => Vec::new(),
        };
        RunReport {
            object_name: object_name.to_string(),
            seed: cfg.seed,
            deformation: "none".to_string(),
            optimizer: self.method.name().to_string(),
            sample_rate: cfg.sample_rate,
            offset_range: cfg.anneal.offset_range,
            initial_total: self.initial_total,
            final_total: self.final_total,
            trials,
            final_vertices: self.buffers.vertices.iter().map(|v| [v.x, v.y, v.z]).collect(),
        }
    }
}

/// Optimize the mapped mesh of `scene` with `method`.
pub fn optimize_scene(
    scene: &MappedScene,
    method: OptimizeMethod,
    cfg: &OptimizeCfg,
) -> Result<OptimizedMesh> {
    cfg.validate()?;
    let mapped = &scene.mesh.buffers;
    let (positions, detail) = match method {
        OptimizeMethod::Planar => {
            let reference = cfg
                .planar
                .reference_angle_deg
                .unwrap_or_else(|| scene.source.transform.angle_about_deg(cfg.planar.plane.normal()));
            let out = planar_correction(
                &scene.tracing,
                &scene.source.vertices,
                &mapped.vertices,
                reference,
                &cfg.planar,
            )?;
            (out.positions.clone(), OptimizeDetail::Planar(out))
        }
        OptimizeMethod::TrianglePropagation => {
            let input = PropagationInput {
                tracing: &scene.tracing,
                source_vertices: &scene.global_vertices,
                triangles: &scene.source.triangles,
                mapped: &mapped.vertices,
                mapped_triangles: &mapped.triangles,
                identity: &scene.identity,
                continuous: scene.source.continuous,
            };
            let out = propagate(&input, &cfg.propagation)?;
            (out.positions.clone(), OptimizeDetail::Propagation(out))
        }
        OptimizeMethod::Greedy | OptimizeMethod::Anneal => {
            let mut mesh = RayMesh::new(
                scene.field.clone(),
                mapped.triangles.clone(),
                scene.identity.clone(),
                scene.source.continuous,
                scene.ideal_normals.clone(),
            )?;
            let mut run = OptimizerRun::new(method, cfg, &mesh)?;
            let summary = run.run_to_end(&mut mesh);
            (
                mesh.positions().to_vec(),
                OptimizeDetail::Iterative {
                    summary,
                    log: run.into_log(),
                },
            )
        }
        OptimizeMethod::DepthOffset => (
            depth_offset(&scene.field, &scene.global_vertices)?,
            OptimizeDetail::DepthOffset,
        ),
    };
    let buffers = scene.with_positions(positions);
    let final_total = total_deviation(&angular_deviation(&scene.ideal_normals, &buffers.normals)?);
    info!(
        method = method.name(),
        initial_total = scene.total_deviation,
        final_total,
        "optimized mapped mesh"
    );
    Ok(OptimizedMesh {
        method,
        buffers,
        initial_total: scene.total_deviation,
        final_total,
        detail,
    })
}
