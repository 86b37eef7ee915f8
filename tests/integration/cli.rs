//! The `qbuild` binary.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

use qbuild::test_utils::PackageFixture;

fn package() -> Result<PackageFixture> {
    let package = PackageFixture::new()?;
    package.doc("index.md", "title: root", "")?;
    package.doc("docs/b.md", "provides: [b-output]", "")?;
    package.doc("docs/a.md", "provides: [a-output]\nrequires: [b-output]", "")?;
    package.doc("docs/fs/ext4.md", "provides: [data/fs/ext4]", "")?;
    package.doc("docs/fs/fat.md", "provides: [data/fs/fat]", "")?;
    Ok(package)
}

fn qbuild(package: &PackageFixture) -> Result<Command> {
    let mut cmd = Command::cargo_bin("qbuild")?;
    cmd.arg("--root").arg(package.root()).current_dir(package.root()).env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn test_outputs_sorted() -> Result<()> {
    let package = package()?;
    qbuild(&package)?
        .arg("outputs")
        .assert()
        .success()
        .stdout("a-output\nb-output\ndata/fs/ext4\ndata/fs/fat\n");
    Ok(())
}

#[test]
fn test_outputs_long() -> Result<()> {
    let package = package()?;
    qbuild(&package)?
        .args(["outputs", "--long"])
        .assert()
        .success()
        .stdout(predicate::str::contains("data/fs/ext4\tfs/ext4\n"));
    Ok(())
}

#[test]
fn test_dump_is_json() -> Result<()> {
    let package = package()?;
    let output = qbuild(&package)?.arg("dump").output()?;
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["paths"]["a"]["sources"][0], "docs/a.md");
    Ok(())
}

#[test]
fn test_deps_order_strips_build_prefix() -> Result<()> {
    let package = package()?;
    qbuild(&package)?
        .args(["deps", "--order", "build/a-output"])
        .assert()
        .success()
        .stdout("b\na\n");
    Ok(())
}

#[test]
fn test_deps_json_with_glob() -> Result<()> {
    let package = package()?;
    let output = qbuild(&package)?.args(["deps", "data/fs/*"]).output()?;
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["order"], serde_json::json!(["fs/ext4", "fs/fat"]));
    Ok(())
}

#[test]
fn test_deps_tree() -> Result<()> {
    let package = package()?;
    qbuild(&package)?
        .args(["deps", "--tree", "a-output"])
        .assert()
        .success()
        .stdout("a-output\n└── a\n    └── b\n");
    Ok(())
}

#[test]
fn test_unmatched_glob_fails() -> Result<()> {
    let package = package()?;
    qbuild(&package)?
        .args(["deps", "data/disk/*"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No outputs match: data/disk/*"));
    Ok(())
}

#[test]
fn test_missing_target_fails() -> Result<()> {
    let package = package()?;
    qbuild(&package)?
        .args(["deps", "nothing"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No provider for target: nothing"));
    Ok(())
}

#[test]
fn test_build_without_container_tool_fails() -> Result<()> {
    let package = package()?;
    qbuild(&package)?
        .args(["build", "a-output", "--container-tool", "qbuild-no-such-tool"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("qbuild-no-such-tool"));
    Ok(())
}

#[test]
fn test_invalid_config_file_fails() -> Result<()> {
    let package = package()?;
    package.file("qbuild.toml", "unknown_key = true\n")?;
    qbuild(&package)?
        .arg("outputs")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("qbuild.toml"));
    Ok(())
}

#[test]
fn test_deps_writes_snapshot_like_build() -> Result<()> {
    let package = package()?;
    package.doc("docs/index-builder.md", "provides: [index.bin]\nrequires: [catalogue.json]", "")?;
    assert!(!package.build_dir().join("catalogue.json").exists());

    qbuild(&package)?
        .args(["deps", "--order", "index.bin"])
        .assert()
        .success()
        .stdout("index-builder\n");

    let snapshot: Value = serde_json::from_str(&package.read_build_file("catalogue.json")?)?;
    assert!(snapshot["paths"]["index-builder"].is_object());
    Ok(())
}
