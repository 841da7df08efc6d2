use anamorph::api::{
    AnamorphicMapper, ExperimentStatus, MeshSink, NormalExperiment, OptimizeMethod, RunMode,
    RunReport, SmoothCfg, StepResult,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::SubscriberBuilder;

mod output;
mod provenance;
mod scene;

use output::{read_report, summarize_trials, write_report, ObjWriter};
use provenance::{write_sidecar, Provenance};
use scene::SceneFile;

#[derive(Parser)]
#[command(name = "cli")]
#[command(about = "Anamorphic mirror mapping and normal optimization runner")]
struct Cmd {
    #[command(subcommand)]
    action: Action,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodArg {
    Planar,
    TrianglePropagation,
    Greedy,
    Anneal,
    DepthOffset,
}

impl From<MethodArg> for OptimizeMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Planar => OptimizeMethod::Planar,
            MethodArg::TrianglePropagation => OptimizeMethod::TrianglePropagation,
            MethodArg::Greedy => OptimizeMethod::Greedy,
            MethodArg::Anneal => OptimizeMethod::Anneal,
            MethodArg::DepthOffset => OptimizeMethod::DepthOffset,
        }
    }
}

#[derive(Subcommand)]
enum Action {
    /// Map every scene object through the mirrors and optionally optimize it
    Map {
        #[arg(long)]
        scene: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Optimization applied after mapping
        #[arg(long, value_enum)]
        method: Option<MethodArg>,
        /// Register each mapped mesh as an occluder for later objects
        #[arg(long)]
        collider: bool,
    },
    /// Deform every scene object and let an iterative optimizer recover its normals
    Experiment {
        #[arg(long)]
        scene: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// greedy or anneal; defaults to the scene's optimizer method
        #[arg(long, value_enum)]
        method: Option<MethodArg>,
        /// Step manually this many iterations (logged) before finishing the run
        #[arg(long)]
        manual_steps: Option<usize>,
        /// Laplacian smoothing iterations applied after optimization
        #[arg(long)]
        smooth: Option<usize>,
    },
    /// Summarize a written run report and its trial table
    Report {
        #[arg(long)]
        from: PathBuf,
    },
}

fn main() -> Result<()> {
    SubscriberBuilder::default().with_target(false).init();
    let cmd = Cmd::parse();
    match cmd.action {
        Action::Map {
            scene,
            out,
            method,
            collider,
        } => map(&scene, &out, method.map(Into::into), collider).map(|_| ()),
        Action::Experiment {
            scene,
            out,
            method,
            manual_steps,
            smooth,
        } => {
            let smooth = smooth.map(|iterations| SmoothCfg {
                iterations,
                ..SmoothCfg::default()
            });
            experiment(&scene, &out, method.map(Into::into), manual_steps, smooth).map(|_| ())
        }
        Action::Report { from } => report(&from),
    }
}

/// Write a report (JSON, optional CSV) plus sidecars; returns all paths.
fn persist_report(
    scene_path: &Path,
    out: &Path,
    report: &RunReport,
    params: serde_json::Value,
) -> Result<Vec<PathBuf>> {
    let files = write_report(out, report)?;
    let prov = Provenance::new(Some(scene_path), params);
    let mut paths = vec![files.json.clone()];
    write_sidecar(&files.json, &prov)?;
    if let Some(csv) = files.csv {
        write_sidecar(&csv, &prov)?;
        paths.push(csv);
    }
    tracing::info!(
        object = %report.object_name,
        optimizer = %report.optimizer,
        improvement = report.improvement(),
        path = %files.json.display(),
        "report written"
    );
    Ok(paths)
}

fn map(
    scene_path: &Path,
    out: &Path,
    method: Option<OptimizeMethod>,
    collider: bool,
) -> Result<Vec<PathBuf>> {
    let scene = SceneFile::load(scene_path)?;
    let mut mapper = AnamorphicMapper::new(scene.raycaster()?, scene.mapper)?;
    let mut meshes = ObjWriter::new(out.join("meshes"));
    let mut written = Vec::new();
    for source in scene.sources()? {
        let mapped = mapper
            .map_object(&source, scene.view_point())
            .with_context(|| format!("mapping {}", source.name))?;
        if mapped.invalid_count() > 0 {
            tracing::warn!(
                object = %source.name,
                missed = mapped.invalid_count(),
                "some vertices have no reflection path"
            );
        }
        mapper.publish(&mut meshes)?;
        if let Some(method) = method {
            let optimized = mapper
                .optimize(method)
                .with_context(|| format!("optimizing {} with {}", source.name, method.name()))?;
            meshes.accept(&format!("{}_{}", source.name, method.name()), &optimized.buffers);
            let params = json!({
                "command": "map",
                "object": source.name,
                "method": method.name(),
                "mapper": scene.mapper,
            });
            written.extend(persist_report(scene_path, out, &mapper.report()?, params)?);
        }
        if collider {
            mapper.publish_collider()?;
        }
    }
    let params = json!({ "command": "map", "mapper": scene.mapper });
    for path in meshes.finish()? {
        write_sidecar(&path, &Provenance::new(Some(scene_path), params.clone()))?;
        written.push(path);
    }
    Ok(written)
}

fn experiment(
    scene_path: &Path,
    out: &Path,
    method: Option<OptimizeMethod>,
    manual_steps: Option<usize>,
    smooth: Option<SmoothCfg>,
) -> Result<Vec<PathBuf>> {
    let scene = SceneFile::load(scene_path)?;
    let method = method.unwrap_or(scene.mapper.optimizer.method);
    let mut meshes = ObjWriter::new(out.join("meshes"));
    let mut written = Vec::new();
    for source in scene.sources()? {
        let mut e = NormalExperiment::new(scene.mapper.optimizer)?;
        e.initialize(&source, scene.view_point())?;
        let deformed_total = e.deform(scene.deformation)?.total();
        e.publish(&mut meshes)?;
        match manual_steps {
            Some(k) => {
                e.start(method, RunMode::Manual)?;
                for _ in 0..k {
                    let r = e.step()?;
                    tracing::debug!(result = ?r, "manual step");
                    if let StepResult::Finished(_) = r {
                        break;
                    }
                }
                if e.status() == ExperimentStatus::OptimizingManual {
                    e.finish()?;
                }
            }
            None => e.start(method, RunMode::All)?,
        }
        if let Some(cfg) = smooth {
            e.smooth(cfg)?;
        }
        if let Some(buffers) = e.buffers() {
            meshes.accept(&format!("{}_{}", source.name, method.name()), &buffers);
        }
        let report = e.report(&source.name)?;
        tracing::info!(
            object = %source.name,
            deformed_total,
            final_total = report.final_total,
            status = e.status().name(),
            "experiment finished"
        );
        let params = json!({
            "command": "experiment",
            "object": source.name,
            "method": method.name(),
            "deformation": scene.deformation,
            "manual_steps": manual_steps,
            "smooth": smooth.map(|s| json!({"iterations": s.iterations, "lambda": s.lambda})),
            "optimizer": scene.mapper.optimizer,
        });
        written.extend(persist_report(scene_path, out, &report, params)?);
    }
    let params = json!({ "command": "experiment", "deformation": scene.deformation });
    for path in meshes.finish()? {
        write_sidecar(&path, &Provenance::new(Some(scene_path), params.clone()))?;
        written.push(path);
    }
    Ok(written)
}

fn report(from: &Path) -> Result<()> {
    let r = read_report(from)?;
    let summary = json!({
        "object": r.object_name,
        "deformation": r.deformation,
        "optimizer": r.optimizer,
        "seed": r.seed,
        "initial_total": r.initial_total,
        "final_total": r.final_total,
        "improvement": r.improvement(),
        "trials": r.trials.len(),
        "vertices": r.final_vertices.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    let csv = from.with_extension("trials.csv");
    if csv.exists() {
        let df = summarize_trials(&csv)?;
        println!("{df}");
    }
    Ok(())
}
