//! Every workspace member inherits the workspace version, and the internal
//! dependency pins agree with it.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    let raw = std::fs::read_to_string(path).unwrap();
    raw.parse().unwrap()
}

fn root_manifest() -> toml::Value {
    read_toml(&workspace_root().join("Cargo.toml"))
}

fn workspace_version() -> String {
    root_manifest()["workspace"]["package"]["version"]
        .as_str()
        .unwrap()
        .to_string()
}

fn members() -> Vec<String> {
    root_manifest()["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn all_members_inherit_workspace_version() {
    let members = members();
    assert!(!members.is_empty());

    for member in &members {
        let doc = read_toml(&workspace_root().join(member).join("Cargo.toml"));
        let inherits = doc
            .get("package")
            .and_then(|p| p.get("version"))
            .and_then(|v| v.as_table())
            .and_then(|t| t.get("workspace"))
            .and_then(|w| w.as_bool());
        assert_eq!(
            inherits,
            Some(true),
            "{member} should use version.workspace = true"
        );
    }
}

#[test]
fn internal_dependency_pins_match_workspace_version() {
    let root = root_manifest();
    let ws_version = workspace_version();
    let deps = root["workspace"]["dependencies"].as_table().unwrap();

    for member in members() {
        let name = Path::new(&member)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .to_string();
        let pin = deps
            .get(&name)
            .and_then(|d| d.get("version"))
            .and_then(|v| v.as_str())
            .unwrap_or_else(|| panic!("{name} missing from workspace.dependencies"));
        assert_eq!(pin, ws_version, "{name} pinned at {pin}");
    }
}

#[test]
fn library_version_matches_workspace() {
    assert_eq!(das_core::VERSION, workspace_version());
    assert_eq!(env!("CARGO_PKG_VERSION"), workspace_version());
}
