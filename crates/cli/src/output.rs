//! Result persistence: OBJ meshes, JSON run reports and CSV trial tables.

use anamorph::api::{MeshBuffers, MeshSink, RunReport, Trial};
use anyhow::{anyhow, Context, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes every accepted mesh to `<dir>/<name>.obj`.
///
/// `MeshSink::accept` cannot fail, so I/O errors are kept and surfaced by
/// `finish`.
pub struct ObjWriter {
    dir: PathBuf,
    written: Vec<PathBuf>,
    error: Option<anyhow::Error>,
}

impl ObjWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
            error: None,
        }
    }

    /// Paths written so far, or the first error.
    pub fn finish(self) -> Result<Vec<PathBuf>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.written),
        }
    }

    fn write(&self, name: &str, mesh: &MeshBuffers) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.dir.join(format!("{name}.obj"));
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        let mut out = BufWriter::new(file);
        write_obj(&mut out, name, mesh)
            .and_then(|()| out.flush())
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

impl MeshSink for ObjWriter {
    fn accept(&mut self, name: &str, mesh: &MeshBuffers) {
        if self.error.is_some() {
            return;
        }
        match self.write(name, mesh) {
            Ok(path) => {
                tracing::info!(path = %path.display(), vertices = mesh.vertices.len(), "mesh written");
                self.written.push(path);
            }
            Err(e) => self.error = Some(e),
        }
    }
}

/// Stream a Wavefront OBJ with positions, UVs and normals (1-based, shared
/// indices) into `w`.
pub fn write_obj<W: Write>(w: &mut W, name: &str, mesh: &MeshBuffers) -> io::Result<()> {
    writeln!(w, "o {name}")?;
    for v in &mesh.vertices {
        writeln!(w, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for uv in &mesh.uv0 {
        writeln!(w, "vt {} {}", uv.x, uv.y)?;
    }
    for n in &mesh.normals {
        writeln!(w, "vn {} {} {}", n.x, n.y, n.z)?;
    }
    let has_uv = mesh.uv0.len() == mesh.vertices.len();
    let has_n = mesh.normals.len() == mesh.vertices.len();
    for t in &mesh.triangles {
        write!(w, "f")?;
        for &i in t {
            let k = i + 1;
            match (has_uv, has_n) {
                (true, true) => write!(w, " {k}/{k}/{k}")?,
                (true, false) => write!(w, " {k}/{k}")?,
                (false, true) => write!(w, " {k}//{k}")?,
                (false, false) => write!(w, " {k}")?,
            }
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Trials as a column table; missing proposals and temperatures are nulls.
pub fn trials_frame(trials: &[Trial]) -> Result<DataFrame> {
    let iteration: Vec<u64> = trials.iter().map(|t| t.iteration as u64).collect();
    let vertex: Vec<u64> = trials.iter().map(|t| t.vertex as u64).collect();
    let offset: Vec<f64> = trials.iter().map(|t| t.offset).collect();
    let temperature: Vec<Option<f64>> = trials.iter().map(|t| t.temperature).collect();
    let previous: Vec<f64> = trials.iter().map(|t| t.previous_total).collect();
    let proposed: Vec<Option<f64>> = trials.iter().map(|t| t.proposed_total).collect();
    let accepted: Vec<bool> = trials.iter().map(|t| t.accepted).collect();
    let df = df!(
        "iteration" => iteration,
        "vertex" => vertex,
        "offset" => offset,
        "temperature" => temperature,
        "previous_total" => previous,
        "proposed_total" => proposed,
        "accepted" => accepted
    )?;
    Ok(df)
}

/// Paths produced by `write_report`.
#[derive(Debug)]
pub struct ReportFiles {
    pub json: PathBuf,
    pub csv: Option<PathBuf>,
}

/// Write `report` as `<dir>/<report.file_name()>`, plus a sibling CSV of
/// its trials when there are any.
pub fn write_report(dir: &Path, report: &RunReport) -> Result<ReportFiles> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let json = dir.join(report.file_name());
    fs::write(&json, serde_json::to_vec_pretty(report)?)
        .with_context(|| format!("writing {}", json.display()))?;
    let csv = if report.trials.is_empty() {
        None
    } else {
        let path = json.with_extension("trials.csv");
        let mut df = trials_frame(&report.trials)?;
        let mut file =
            File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .with_context(|| format!("writing {}", path.display()))?;
        Some(path)
    };
    Ok(ReportFiles { json, csv })
}

pub fn read_report(path: &Path) -> Result<RunReport> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Acceptance statistics of a trial CSV, one row.
pub fn summarize_trials(csv: &Path) -> Result<DataFrame> {
    let lf = LazyCsvReader::new(csv)
        .with_infer_schema_length(Some(100))
        .finish()
        .with_context(|| format!("scanning {}", csv.display()))?;
    let df = lf
        .select([
            len().alias("trials"),
            col("accepted").cast(DataType::Float64).mean().alias("acceptance_rate"),
            col("previous_total").first().alias("first_total"),
            col("previous_total").min().alias("best_total"),
        ])
        .collect()
        .map_err(|e| anyhow!("summarizing {}: {e}", csv.display()))?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Vector2, Vector3};
    use tempfile::tempdir;

    fn triangle() -> MeshBuffers {
        MeshBuffers {
            vertices: vec![Vector3::zeros(), Vector3::x(), Vector3::y()],
            triangles: vec![[0, 1, 2]],
            uv0: vec![Vector2::zeros(), Vector2::x(), Vector2::y()],
            source_normals: vec![Vector3::z(); 3],
            normals: vec![Vector3::z(); 3],
        }
    }

    fn report(trials: Vec<Trial>) -> RunReport {
        RunReport {
            object_name: "card".into(),
            seed: 1,
            deformation: "none".into(),
            optimizer: "anneal".into(),
            sample_rate: 1,
            offset_range: 0.05,
            initial_total: 4.0,
            final_total: 1.0,
            trials,
            final_vertices: vec![[0.0, 0.0, 1.0]],
        }
    }

    fn trial(iteration: usize, accepted: bool, previous_total: f64) -> Trial {
        Trial {
            iteration,
            vertex: 0,
            offset: 0.01,
            temperature: Some(1.0),
            previous_total,
            proposed_total: if accepted { Some(previous_total - 1.0) } else { None },
            accepted,
        }
    }

    fn obj_text(mesh: &MeshBuffers) -> String {
        let mut buf = Vec::new();
        write_obj(&mut buf, "tri", mesh).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn obj_has_shared_indices() {
        let s = obj_text(&triangle());
        assert!(s.starts_with("o tri\n"));
        assert_eq!(s.lines().filter(|l| l.starts_with("v ")).count(), 3);
        assert!(s.lines().any(|l| l == "f 1/1/1 2/2/2 3/3/3"));
    }

    #[test]
    fn obj_face_format_follows_available_attributes() {
        let mut mesh = triangle();
        mesh.uv0.clear();
        assert!(obj_text(&mesh).lines().any(|l| l == "f 1//1 2//2 3//3"));
        mesh.normals.clear();
        assert!(obj_text(&mesh).lines().any(|l| l == "f 1 2 3"));
    }

    /// Accepts `budget` bytes, then fails every write.
    struct Full {
        budget: usize,
    }

    impl Write for Full {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn obj_write_errors_propagate() {
        let err = write_obj(&mut Full { budget: 20 }, "tri", &triangle()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn obj_writer_reports_unwritable_dir() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("meshes");
        fs::write(&blocker, b"not a directory").unwrap();
        let mut w = ObjWriter::new(&blocker);
        w.accept("tri", &triangle());
        w.accept("tri_optimized", &triangle());
        assert!(w.finish().is_err());
    }

    #[test]
    fn obj_writer_collects_paths() {
        let dir = tempdir().unwrap();
        let mut w = ObjWriter::new(dir.path().join("meshes"));
        w.accept("tri", &triangle());
        let paths = w.finish().unwrap();
        assert_eq!(paths, vec![dir.path().join("meshes").join("tri.obj")]);
        assert!(paths[0].exists());
    }

    #[test]
    fn report_round_trips_with_trial_csv() {
        let dir = tempdir().unwrap();
        let r = report(vec![trial(0, true, 4.0), trial(1, false, 3.0), trial(2, true, 3.0)]);
        let files = write_report(dir.path(), &r).unwrap();
        assert_eq!(
            files.json.file_name().unwrap().to_string_lossy(),
            "card_none_anneal_sr1_or0.05.json"
        );
        assert_eq!(read_report(&files.json).unwrap(), r);

        let csv = files.csv.unwrap();
        let summary = summarize_trials(&csv).unwrap();
        assert_eq!(summary.height(), 1);
        let rate = summary
            .column("acceptance_rate")
            .unwrap()
            .f64()
            .unwrap()
            .get(0)
            .unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn no_csv_without_trials() {
        let dir = tempdir().unwrap();
        let files = write_report(dir.path(), &report(Vec::new())).unwrap();
        assert!(files.csv.is_none());
    }
}
