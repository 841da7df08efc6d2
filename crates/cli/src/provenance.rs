use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::ffi::OsString;
use std::fs;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Command;

/// What produced an artifact: the scene it came from and the run parameters.
pub struct Provenance {
    pub scene: Option<PathBuf>,
    pub params: Value,
}

impl Provenance {
    pub fn new(scene: Option<&Path>, params: Value) -> Self {
        Self {
            scene: scene.map(Path::to_path_buf),
            params,
        }
    }
}

/// Write `<stem>.provenance.json` next to `artifact` with the code revision,
/// callsite, scene path, parameters and the artifact itself as output.
#[track_caller]
pub fn write_sidecar<P: AsRef<Path>>(artifact: P, prov: &Provenance) -> Result<PathBuf> {
    let artifact = artifact.as_ref();
    let path = sidecar_path(artifact);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating provenance dir {}", parent.display()))?;
        }
    }

    let callsite = Location::caller();
    let doc = json!({
        "code_rev": current_git_rev(),
        "crate_version": anamorph::VERSION,
        "callsite": {
            "file": callsite.file(),
            "line": callsite.line()
        },
        "scene": prov.scene.as_ref().map(|p| p.to_string_lossy().into_owned()),
        "params": prov.params,
        "outputs": [artifact.to_string_lossy()]
    });
    fs::write(&path, serde_json::to_vec_pretty(&doc)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = artifact
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(".provenance.json");
    artifact.with_file_name(name)
}

/// `GIT_COMMIT` (build time, then run time) or `git rev-parse HEAD`.
pub fn current_git_rev() -> String {
    if let Some(rev) = option_env!("GIT_COMMIT").filter(|s| !s.is_empty()) {
        return rev.to_string();
    }
    if let Ok(rev) = std::env::var("GIT_COMMIT") {
        if !rev.is_empty() {
            return rev;
        }
    }
    Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sidecar_replaces_extension() {
        let p = sidecar_path(Path::new("/tmp/out/card_mapped.obj"));
        assert_eq!(p, Path::new("/tmp/out/card_mapped.provenance.json"));
    }

    #[test]
    fn sidecar_records_scene_and_output() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("r.json");
        fs::write(&artifact, "{}").unwrap();
        let prov = Provenance::new(Some(Path::new("scene.json")), json!({"method": "greedy"}));
        let path = write_sidecar(&artifact, &prov).unwrap();
        let doc: Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(doc["outputs"][0], artifact.to_string_lossy().as_ref());
        assert_eq!(doc["scene"], "scene.json");
        assert_eq!(doc["params"]["method"], "greedy");
    }
}
