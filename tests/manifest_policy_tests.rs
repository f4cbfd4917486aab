#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest and source policy tests.
//!
//! These tests parse `Cargo.toml` and scan `src/` to verify that the crate
//! keeps its panic-free lint policy, its feature layout, and its demo targets.
//! If any test fails, the manifest has drifted from the agreed-upon standards.
//!
//! All checks are synchronous filesystem reads.

use std::path::{Path, PathBuf};

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn manifest() -> toml::Table {
    let path = project_root().join("Cargo.toml");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    toml::from_str(&text).expect("Cargo.toml must be valid TOML")
}

fn table<'a>(parent: &'a toml::Table, key: &str) -> &'a toml::Table {
    parent
        .get(key)
        .and_then(toml::Value::as_table)
        .unwrap_or_else(|| panic!("Cargo.toml is missing the [{key}] table"))
}

/// Every `.rs` file below `dir`, recursively.
fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(rust_sources(&path));
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    files
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: panic_policy
// ─────────────────────────────────────────────────────────────────────────────

mod panic_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn cargo_toml_denies_all_panic_prone_lints() {
        let manifest = manifest();
        let clippy = table(table(&manifest, "lints"), "clippy");

        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(toml::Value::as_str),
                Some("deny"),
                "Cargo.toml must set `{lint} = \"deny\"` in [lints.clippy] \
                 to enforce the panic-free policy in library code."
            );
        }
    }

    /// Library code above the `#[cfg(test)]` module must not unwrap.
    #[test]
    fn library_sources_do_not_unwrap() {
        for path in rust_sources(&project_root().join("src")) {
            let text = std::fs::read_to_string(&path).unwrap();
            let library = text.split("#[cfg(test)]").next().unwrap_or_default();
            for needle in [".unwrap()", ".expect("] {
                assert!(
                    !library.contains(needle),
                    "{} calls `{needle}` outside its test module",
                    path.display()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: package_policy
// ─────────────────────────────────────────────────────────────────────────────

mod package_policy {
    use super::*;

    #[test]
    fn declares_quoted_msrv() {
        let manifest = manifest();
        let version = table(&manifest, "package")
            .get("rust-version")
            .and_then(toml::Value::as_str)
            .expect("Cargo.toml must declare a rust-version");
        assert!(
            version.split('.').all(|part| part.parse::<u32>().is_ok()),
            "rust-version '{version}' must be a plain numeric version"
        );
    }

    #[test]
    fn default_features_enable_both_channels() {
        let manifest = manifest();
        let features = table(&manifest, "features");
        let default: Vec<&str> = features
            .get("default")
            .and_then(toml::Value::as_array)
            .expect("a default feature set is required")
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();

        assert!(default.contains(&"transport-websocket"));
        assert!(default.contains(&"http-fetch"));
    }

    #[test]
    fn optional_dependencies_are_feature_gated() {
        let manifest = manifest();
        let dependencies = table(&manifest, "dependencies");
        let features = table(&manifest, "features");

        for (name, spec) in dependencies {
            let optional = spec
                .as_table()
                .and_then(|t| t.get("optional"))
                .and_then(toml::Value::as_bool)
                .unwrap_or(false);
            if !optional {
                continue;
            }
            let gate = format!("dep:{name}");
            let gated = features.values().any(|members| {
                members
                    .as_array()
                    .is_some_and(|m| m.iter().any(|v| v.as_str() == Some(gate.as_str())))
            });
            assert!(gated, "optional dependency `{name}` is not enabled by any feature");
        }
    }

    /// Demo targets live in `demos/` and must exist on disk.
    #[test]
    fn demo_targets_exist() {
        let manifest = manifest();
        assert_eq!(
            table(&manifest, "package")
                .get("autoexamples")
                .and_then(toml::Value::as_bool),
            Some(false)
        );

        let examples = manifest
            .get("example")
            .and_then(toml::Value::as_array)
            .expect("at least one [[example]] target is required");
        assert!(!examples.is_empty());

        for example in examples {
            let path = example
                .get("path")
                .and_then(toml::Value::as_str)
                .expect("every [[example]] needs an explicit path");
            assert!(path.starts_with("demos/"), "{path} must live under demos/");
            assert!(
                project_root().join(path).is_file(),
                "demo target {path} does not exist"
            );
        }
    }
}
