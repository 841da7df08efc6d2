use super::*;
use crate::error::AnamorphError;
use crate::fixtures::{flat_mirror, grid_source, origin};
use crate::geometry::{angle_deg, reflect};
use crate::mapper::{MappedScene, MapperCfg};
use crate::mesh::{SourceMesh, Transform};
use nalgebra::{vector, Vector3};
use proptest::prelude::*;

fn scene_of(src: &SourceMesh) -> MappedScene {
    MappedScene::build(src, origin(), &flat_mirror(5.0), &MapperCfg::default()).unwrap()
}

fn ray_mesh(scene: &MappedScene) -> RayMesh {
    RayMesh::new(
        scene.field.clone(),
        scene.mesh.buffers.triangles.clone(),
        scene.identity.clone(),
        scene.source.continuous,
        scene.ideal_normals.clone(),
    )
    .unwrap()
}

/// Flat mapped grid with every along-ray distance scaled by a fixed pattern.
fn bumpy_mesh(n: usize) -> RayMesh {
    let scene = scene_of(&grid_source(n, 1.0, 2.0));
    let mut mesh = ray_mesh(&scene);
    let bumped: Vec<f64> = (0..mesh.len())
        .map(|i| mesh.distance(i) * (1.0 + 0.08 * ((i * 7 % 5) as f64 - 2.0) / 2.0))
        .collect();
    mesh.set_distances(bumped).unwrap();
    mesh
}

// ---------- deviation ----------

#[test]
fn deviation_of_identical_fields_is_zero() {
    let n = vec![Vector3::z(), vector![1.0, 1.0, 0.0].normalize()];
    let d = angular_deviation(&n, &n).unwrap();
    assert!(d.iter().all(|&x| x.abs() < 1e-12));
    assert!(total_deviation(&d).abs() < 1e-12);
}

#[test]
fn deviation_angles_and_mismatch() {
    let target = vec![Vector3::z(), Vector3::z(), Vector3::z()];
    let current = vec![Vector3::x(), -Vector3::z(), Vector3::zeros()];
    let d = angular_deviation(&target, &current).unwrap();
    assert!((d[0] - 90.0).abs() < 1e-12);
    assert!((d[1] - 180.0).abs() < 1e-12);
    assert_eq!(d[2], 0.0);
    let err = angular_deviation(&target, &current[..2]).unwrap_err();
    assert_eq!(
        err,
        AnamorphError::LengthMismatch {
            expected: 3,
            actual: 2
        }
    );
}

#[test]
fn mirrored_normals_negate_axis_component() {
    let m = mirrored_normals(&[vector![0.3, -0.4, 0.5]], Vector3::z());
    assert_eq!(m[0], vector![0.3, -0.4, -0.5]);
}

proptest! {
    #[test]
    fn reflection_keeps_length_and_mirrors_incidence(
        d in prop::array::uniform3(-1.0f64..1.0),
        n in prop::array::uniform3(-1.0f64..1.0),
    ) {
        let d = Vector3::from(d);
        let n = Vector3::from(n);
        prop_assume!(d.norm() > 1e-3 && n.norm() > 1e-3);
        let n = n.normalize();
        let r = reflect(d, n);
        prop_assert!((r.norm() - d.norm()).abs() < 1e-9);
        prop_assert!((angle_deg(r, n) - (180.0 - angle_deg(d, n))).abs() < 1e-6);
    }

    #[test]
    fn deviation_stays_within_half_turn(
        a in prop::collection::vec(prop::array::uniform3(-5.0f64..5.0), 1..16),
        b in prop::collection::vec(prop::array::uniform3(-5.0f64..5.0), 16),
    ) {
        let t: Vec<Vector3<f64>> = a.iter().map(|&v| Vector3::from(v)).collect();
        let c: Vec<Vector3<f64>> = b[..t.len()].iter().map(|&v| Vector3::from(v)).collect();
        let d = angular_deviation(&t, &c).unwrap();
        prop_assert!(d.iter().all(|&x| (0.0..=180.0).contains(&x)));
        prop_assert!(total_deviation(&d) <= 180.0 * t.len() as f64);
    }
}

// ---------- field ----------

#[test]
fn view_field_reproduces_vertices() {
    let verts = vec![vector![1.0, 2.0, 3.0], vector![-1.0, 0.0, 4.0], Vector3::zeros()];
    let f = RayField::from_view(Vector3::zeros(), &verts);
    assert_eq!(f.valid, vec![true, true, false]);
    for (p, q) in f.positions().iter().zip(&verts) {
        assert!((p - q).norm() < 1e-12);
    }
}

#[test]
fn propose_does_not_touch_committed_state() {
    let scene = scene_of(&grid_source(3, 1.0, 2.0));
    let mut mesh = ray_mesh(&scene);
    let d4 = mesh.distance(4);
    let flat_total = mesh.total();

    let c = mesh.propose(4, d4 * 1.2);
    assert!(c.total > flat_total);
    assert_eq!(mesh.distance(4), d4);
    assert_eq!(mesh.total(), flat_total);

    mesh.commit(c);
    assert!((mesh.distance(4) - d4 * 1.2).abs() < 1e-12);
    // Moving the bumped vertex back restores the flat optimum.
    let back = mesh.propose(4, d4);
    assert!(back.total < mesh.total());
    assert!((back.total - flat_total).abs() < 1e-9);
}

#[test]
fn ray_mesh_rejects_misaligned_inputs() {
    let scene = scene_of(&grid_source(3, 1.0, 2.0));
    let err = RayMesh::new(
        scene.field.clone(),
        scene.mesh.buffers.triangles.clone(),
        scene.identity.clone(),
        true,
        scene.ideal_normals[..4].to_vec(),
    )
    .unwrap_err();
    assert!(matches!(err, AnamorphError::LengthMismatch { .. }));
}

// ---------- greedy ----------

#[test]
fn greedy_on_minimal_mesh_is_stuck_without_mutations() {
    let scene = scene_of(&grid_source(3, 1.0, 2.0));
    let mut mesh = ray_mesh(&scene);
    let before = mesh.positions().to_vec();
    let mut run = OptimizerRun::new(OptimizeMethod::Greedy, &OptimizeCfg::default(), &mesh).unwrap();
    let s = run.run_to_end(&mut mesh);
    assert_eq!(s.accepted, 0);
    assert_eq!(s.rejected, 0);
    assert_eq!(s.skipped, 9);
    assert_eq!(s.reason, Some(FinishReason::Stuck));
    assert_eq!(mesh.positions(), &before[..]);
    assert!(run.log().is_empty());
    // Further steps keep reporting the finish.
    assert_eq!(run.step(&mut mesh), StepResult::Finished(FinishReason::Stuck));
}

#[test]
fn greedy_never_increases_total() {
    let mut mesh = bumpy_mesh(4);
    let initial = mesh.total();
    let mut run = OptimizerRun::new(OptimizeMethod::Greedy, &OptimizeCfg::default(), &mesh).unwrap();
    let mut last = initial;
    loop {
        let r = run.step(&mut mesh);
        assert!(mesh.total() <= last + 1e-12);
        last = mesh.total();
        if let StepResult::Finished(_) = r {
            break;
        }
    }
    let s = run.summary(&mesh);
    assert_eq!(s.accepted + s.rejected + s.skipped, s.iterations);
    assert_eq!(s.initial_total, initial);
    assert!(s.final_total <= initial);
    assert_eq!(run.log().len(), s.accepted + s.rejected);
}

#[test]
fn greedy_respects_iteration_cap() {
    let mut mesh = bumpy_mesh(4);
    let cfg = OptimizeCfg {
        max_iterations: 3,
        ..OptimizeCfg::default()
    };
    let mut run = OptimizerRun::new(OptimizeMethod::Greedy, &cfg, &mesh).unwrap();
    let s = run.run_to_end(&mut mesh);
    assert_eq!(s.iterations, 3);
    assert_eq!(s.reason, Some(FinishReason::IterationCap));
}

#[test]
fn greedy_skips_vertices_without_reflection() {
    let mut src = grid_source(4, 1.0, 2.0);
    src.vertices[5] = vector![0.0, 0.0, -4.0];
    let scene = scene_of(&src);
    let mut mesh = ray_mesh(&scene);
    assert!(!mesh.is_valid(5));
    let bumped: Vec<f64> = (0..mesh.len())
        .map(|i| mesh.distance(i) * (1.0 + 0.1 * ((i * 3 % 4) as f64 - 1.5) / 1.5))
        .collect();
    mesh.set_distances(bumped).unwrap();
    let before = mesh.distance(5);

    let mut run = OptimizerRun::new(OptimizeMethod::Greedy, &OptimizeCfg::default(), &mesh).unwrap();
    let mut visited = false;
    loop {
        match run.step(&mut mesh) {
            StepResult::Finished(_) => break,
            StepResult::Skipped { vertex: 5, .. } => visited = true,
            StepResult::Accepted { vertex, .. } | StepResult::Rejected { vertex, .. } => {
                assert_ne!(vertex, 5);
            }
            StepResult::Skipped { .. } => {}
        }
    }
    assert!(visited);
    assert_eq!(mesh.distance(5), before);
    assert_eq!(mesh.positions()[5], Vector3::zeros());
    assert!(run.log().trials.iter().all(|t| t.vertex != 5));
}

// ---------- identity groups ----------

/// 3×3 grid whose centre vertex is split into two seam duplicates.
fn seamed_grid() -> SourceMesh {
    let mut src = grid_source(3, 1.0, 2.0);
    let dup = src.vertices[4];
    src.vertices.push(dup);
    src.uvs.push(src.uvs[4]);
    let half = src.triangles.len() / 2;
    for tri in &mut src.triangles[half..] {
        for v in tri.iter_mut() {
            if *v == 4 {
                *v = 9;
            }
        }
    }
    src
}

#[test]
fn mutations_move_whole_identity_groups() {
    let src = seamed_grid();
    let scene = scene_of(&src);
    assert_eq!(scene.identity.group_of(9), &[4, 9]);
    let mut mesh = ray_mesh(&scene);
    let bumped: Vec<f64> = (0..mesh.len())
        .map(|i| mesh.distance(i) * if i == 4 || i == 9 { 1.1 } else { 1.0 })
        .collect();
    mesh.set_distances(bumped).unwrap();
    let cfg = OptimizeCfg {
        method: OptimizeMethod::Anneal,
        max_iterations: 200,
        ..OptimizeCfg::default()
    };
    let mut run = OptimizerRun::new(OptimizeMethod::Anneal, &cfg, &mesh).unwrap();
    while !matches!(run.step(&mut mesh), StepResult::Finished(_)) {
        assert_eq!(mesh.positions()[4], mesh.positions()[9]);
        assert_eq!(mesh.normals()[4], mesh.normals()[9]);
    }
}

// ---------- annealing ----------

#[test]
fn annealing_is_reproducible_by_seed() {
    let cfg = OptimizeCfg {
        max_iterations: 150,
        seed: 42,
        ..OptimizeCfg::default()
    };
    let run = |cfg: &OptimizeCfg| {
        let mut mesh = bumpy_mesh(4);
        let mut r = OptimizerRun::new(OptimizeMethod::Anneal, cfg, &mesh).unwrap();
        r.run_to_end(&mut mesh);
        (mesh.positions().to_vec(), r.into_log())
    };
    let (pa, la) = run(&cfg);
    let (pb, lb) = run(&cfg);
    assert_eq!(pa, pb);
    assert_eq!(la, lb);
    assert_eq!(la.len(), 150);
    let (_, lc) = run(&OptimizeCfg { seed: 43, ..cfg });
    assert_ne!(la, lc);
}

#[test]
fn annealing_offsets_are_nonzero_step_multiples() {
    let mut mesh = bumpy_mesh(3);
    let cfg = OptimizeCfg {
        max_iterations: 100,
        ..OptimizeCfg::default()
    };
    let mut run = OptimizerRun::new(OptimizeMethod::Anneal, &cfg, &mesh).unwrap();
    run.run_to_end(&mut mesh);
    let step = cfg.anneal.offset_step;
    for t in &run.log().trials {
        let k = t.offset / step;
        assert!((k - k.round()).abs() < 1e-9);
        assert!(k.round() != 0.0);
        assert!(t.offset.abs() <= cfg.anneal.offset_range + 1e-12);
        assert!(t.temperature.is_some());
    }
}

#[test]
fn annealing_rejects_non_positive_distances_unevaluated() {
    let scene = scene_of(&grid_source(3, 1.0, 2.0));
    let mut mesh = ray_mesh(&scene);
    mesh.set_distances(vec![0.004; mesh.len()]).unwrap();
    let cfg = OptimizeCfg {
        max_iterations: 60,
        anneal: AnnealCfg {
            offset_range: 0.01,
            offset_step: 0.01,
            ..AnnealCfg::default()
        },
        ..OptimizeCfg::default()
    };
    let mut run = OptimizerRun::new(OptimizeMethod::Anneal, &cfg, &mesh).unwrap();
    run.run_to_end(&mut mesh);
    let mut negative = 0;
    for t in &run.log().trials {
        if t.proposed_total.is_none() {
            assert!(t.offset < 0.0);
            assert!(!t.accepted);
            negative += 1;
        }
    }
    assert!(negative > 0);
    for i in 0..mesh.len() {
        assert!(mesh.distance(i) > 0.0);
    }
}

#[test]
fn temperature_schedule_spans_bounds() {
    let mesh = bumpy_mesh(3);
    for curve in [
        CoolingCurve::Linear,
        CoolingCurve::Quadratic,
        CoolingCurve::Cubic,
        CoolingCurve::Exponential,
        CoolingCurve::Cosine,
    ] {
        let cfg = AnnealCfg {
            curve,
            t_min: 0.5,
            t_max: 4.0,
            ..AnnealCfg::default()
        };
        let s = anneal::AnnealState::new(cfg, 0, 100, &mesh);
        assert!((s.temperature(0) - 4.0).abs() < 1e-12);
        assert!((s.temperature(100) - 0.5).abs() < 1e-12);
        let mut prev = f64::INFINITY;
        for i in 0..=100 {
            let t = s.temperature(i);
            assert!(t <= prev + 1e-12, "{curve:?} not cooling at {i}");
            prev = t;
        }
    }
}

#[test]
fn closed_form_methods_are_not_steppable() {
    let mesh = bumpy_mesh(3);
    let err = OptimizerRun::new(OptimizeMethod::Planar, &OptimizeCfg::default(), &mesh).unwrap_err();
    assert!(matches!(err, AnamorphError::InvalidConfig { .. }));
}

// ---------- propagation ----------

fn propagation_input(scene: &MappedScene) -> PropagationInput<'_> {
    PropagationInput {
        tracing: &scene.tracing,
        source_vertices: &scene.global_vertices,
        triangles: &scene.source.triangles,
        mapped: &scene.mesh.buffers.vertices,
        mapped_triangles: &scene.mesh.buffers.triangles,
        identity: &scene.identity,
        continuous: scene.source.continuous,
    }
}

#[test]
fn propagation_on_flat_mirror_reproduces_mapping() {
    let scene = scene_of(&grid_source(4, 1.0, 2.0));
    let out = propagate(&propagation_input(&scene), &PropagationCfg::default()).unwrap();
    assert_eq!(out.conflicts, 0);
    assert_eq!(out.unplaced, 0);
    assert!(!out.hit_ceiling);
    for (p, q) in out.positions.iter().zip(&scene.mesh.buffers.vertices) {
        assert!((p - q).norm() < 1e-9);
    }
}

#[test]
fn propagation_ceiling_keeps_partial_result() {
    let scene = scene_of(&grid_source(4, 1.0, 2.0));
    let cfg = PropagationCfg {
        max_iterations: 1,
        ..PropagationCfg::default()
    };
    let out = propagate(&propagation_input(&scene), &cfg).unwrap();
    assert!(out.hit_ceiling);
    assert_eq!(out.iterations, 1);
    assert!(out.unplaced > 0);
    for (p, q) in out.positions.iter().zip(&scene.mesh.buffers.vertices) {
        assert!((p - q).norm() < 1e-9);
    }
}

/// Rays of the flat 5×5 grid over a flat mirror, paired with source
/// geometry whose two interior vertices are pushed off the plane. The tilted
/// source triangles ask for target planes the rays cannot all satisfy.
#[test]
fn propagation_conflicts_keep_first_placement() {
    let scene = scene_of(&grid_source(5, 1.0, 2.0));
    let mut source = scene.global_vertices.clone();
    source[12].z += 0.6;
    source[6].z -= 0.4;
    let input = PropagationInput {
        source_vertices: &source,
        ..propagation_input(&scene)
    };
    let out = propagate(&input, &PropagationCfg::default()).unwrap();
    assert!(out.conflicts > 0);
    assert!(!out.conflicted.is_empty());
    assert!(out.conflicted.len() <= out.conflicts);
    assert!(!out.hit_ceiling);
    for p in &out.positions {
        assert!(p.iter().all(|c| c.is_finite()), "{p:?}");
    }
    // Every placement lies on the vertex's final reflection ray.
    for (i, p) in out.positions.iter().enumerate() {
        let last = scene.tracing.chain(i).last().unwrap();
        let off = p - last.hit_point;
        assert!(off.cross(&last.direction.normalize()).norm() < 1e-6 * (1.0 + off.norm()));
    }
    // Stopping right after a conflicted vertex was placed yields the same
    // position, so later revisits never moved it.
    for &v in &out.conflicted {
        let k = out.placed_at[v].unwrap();
        let cfg = PropagationCfg {
            max_iterations: k,
            ..PropagationCfg::default()
        };
        let partial = propagate(&input, &cfg).unwrap();
        assert_eq!(partial.placed_at[v], Some(k));
        assert_eq!(partial.positions[v], out.positions[v]);
    }
}

#[test]
fn propagation_needs_continuous_mesh() {
    let mut src = grid_source(3, 1.0, 2.0);
    src.continuous = false;
    let scene = scene_of(&src);
    let err = propagate(&propagation_input(&scene), &PropagationCfg::default()).unwrap_err();
    assert_eq!(err, AnamorphError::DiscontinuousMesh);
}

#[test]
fn target_normals_apply_inverse_source_rotation() {
    let source = vec![Vector3::z(), Vector3::x(), -Vector3::z()];
    let mapped = vec![Vector3::z(), Vector3::zeros(), Vector3::zeros()];
    let t = propagate::target_normals(&source, &mapped, 0);
    assert!((t[0] - Vector3::z()).norm() < 1e-12);
    // x→z is a quarter turn about -y, which takes z to -x.
    assert!((t[1] + Vector3::x()).norm() < 1e-12);
    // Antiparallel source normals flip the seed's mapped normal.
    assert!((t[2] + Vector3::z()).norm() < 1e-9);
}

// ---------- planar ----------

#[test]
fn planar_without_aligned_vertex_fails() {
    let mut src = grid_source(2, 1.0, 2.0);
    src.transform = Transform::from_translation(vector![0.3, 0.0, 2.0]);
    let scene = scene_of(&src);
    let err = planar_correction(
        &scene.tracing,
        &src.vertices,
        &scene.mesh.buffers.vertices,
        0.0,
        &PlanarCfg::default(),
    )
    .unwrap_err();
    match err {
        AnamorphError::NoPlanarSolution { min_angle } => assert!(min_angle > 0.0),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn planar_on_flat_mirror_keeps_mapping() {
    let src = grid_source(3, 1.0, 2.0);
    let scene = scene_of(&src);
    let out = planar_correction(
        &scene.tracing,
        &src.vertices,
        &scene.mesh.buffers.vertices,
        0.0,
        &PlanarCfg::default(),
    )
    .unwrap();
    // First vertex on the optical plane x = 0.
    assert_eq!(out.central, 1);
    // The other two vertices on x = 0 have an undefined gamma.
    assert_eq!(out.fallbacks, 2);
    assert_eq!(out.abnormal, 6);
    for (p, q) in out.positions.iter().zip(&scene.mesh.buffers.vertices) {
        assert!((p - q).norm() < 1e-9, "{p:?} vs {q:?}");
    }
}

// ---------- depth offset ----------

#[test]
fn depth_offset_adds_depth_behind_front() {
    let verts = vec![vector![0.0, 0.0, 1.0], vector![0.0, 1.0, 3.0]];
    let field = RayField::from_view(Vector3::zeros(), &verts);
    let out = depth_offset(&field, &verts).unwrap();
    assert!((out[0] - verts[0]).norm() < 1e-12);
    let expected = verts[1] + verts[1].normalize() * 2.0;
    assert!((out[1] - expected).norm() < 1e-12);
    assert!(depth_offset(&field, &verts[..1]).is_err());
}
