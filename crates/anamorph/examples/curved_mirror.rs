//! Map a flat square onto a curved mirror and compare the optimizers.
//!
//! Usage:
//!   cargo run -p anamorph --example curved_mirror
//!   cargo run -p anamorph --example curved_mirror -- vertical
//!
//! Prints the mapped mesh extent and the total normal deviation before and
//! after every optimization strategy that applies to the scene.

use anamorph::api::{
    curved_square, AnamorphicMapper, CurveDirection, MapperCfg, OptimizeMethod, SourceMesh,
    Transform, TriangleScene,
};
use nalgebra::{vector, Vector2, Vector3};

fn main() -> anamorph::Result<()> {
    let direction = match std::env::args().nth(1).as_deref() {
        Some("vertical") => CurveDirection::Vertical,
        _ => CurveDirection::Horizontal,
    };
    let mirror = curved_square(24, 24, 2.5, direction)?
        .transformed(&Transform::from_translation(vector![0.0, 0.0, 4.0]));
    let mut mapper = AnamorphicMapper::new(
        TriangleScene::new().with_surface(mirror),
        MapperCfg::default(),
    )?;

    let n = 6;
    let mut vertices = Vec::new();
    let mut uvs = Vec::new();
    for j in 0..n {
        for i in 0..n {
            let u = i as f64 / (n - 1) as f64;
            let v = j as f64 / (n - 1) as f64;
            vertices.push(vector![u - 0.5, v - 0.5, 0.0]);
            uvs.push(Vector2::new(u, v));
        }
    }
    let mut triangles = Vec::new();
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let a = j * n + i;
            triangles.push([a, a + n, a + 1]);
            triangles.push([a + 1, a + n, a + n + 1]);
        }
    }
    let source = SourceMesh {
        name: "square".into(),
        vertices,
        triangles,
        uvs,
        normals: None,
        transform: Transform::from_translation(vector![0.0, 0.0, 2.0]),
        continuous: true,
    };

    let mapped = mapper.map_object(&source, Vector3::zeros())?;
    let (lo, hi) = mapped.buffers.vertices.iter().fold(
        (Vector3::repeat(f64::INFINITY), Vector3::repeat(f64::NEG_INFINITY)),
        |(lo, hi), v| (lo.inf(v), hi.sup(v)),
    );
    println!(
        "mapped {} vertices ({} missed), extent {:?} .. {:?}",
        mapped.buffers.vertices.len(),
        mapped.invalid_count(),
        lo.as_slice(),
        hi.as_slice()
    );

    for method in [
        OptimizeMethod::TrianglePropagation,
        OptimizeMethod::Greedy,
        OptimizeMethod::Anneal,
        OptimizeMethod::DepthOffset,
    ] {
        match mapper.optimize(method) {
            Ok(opt) => println!(
                "{:>22}: total deviation {:.3} -> {:.3}",
                method.name(),
                opt.initial_total,
                opt.final_total
            ),
            Err(e) => println!("{:>22}: {e}", method.name()),
        }
    }
    Ok(())
}
