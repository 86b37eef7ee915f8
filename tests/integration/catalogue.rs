//! Loading package trees into a catalogue.

use anyhow::Result;
use serde_json::json;

use qbuild::catalogue::Context;
use qbuild::core::BuildError;
use qbuild::test_utils::PackageFixture;

fn context(arch: &str) -> Context {
    [("ARCH".to_string(), arch.to_string()), ("HOST_ARCH".to_string(), arch.to_string())].into()
}

#[test]
fn test_paths_and_sources() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("index.md", "title: root", "# Root\n")?;
    package.doc("docs/fs/ext4.md", "provides: [data/fs/ext4]", "")?;
    package.doc("guests/linux/README.md", "title: linux", "")?;
    package.doc("docs/extra/linux-notes.md", "path: guests/linux\nnote: second", "")?;

    let catalogue = package.catalogue()?;
    assert_eq!(
        catalogue.paths.keys().map(String::as_str).collect::<Vec<_>>(),
        ["", "fs/ext4", "guests/linux"]
    );
    // Discovery is sorted by physical path
    assert_eq!(
        catalogue.paths["guests/linux"].sources,
        ["docs/extra/linux-notes.md", "guests/linux/README.md"]
    );
    Ok(())
}

#[test]
fn test_build_dir_and_hidden_dirs_not_loaded() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("index.md", "title: root", "")?;
    package.build_file("stale/doc.md", "---\ntitle: stale\n---\n")?;
    package.file(".git/notes.md", "---\ntitle: hidden\n---\n")?;

    let catalogue = package.catalogue()?;
    assert_eq!(catalogue.paths.len(), 1);
    assert_eq!(catalogue.files.keys().collect::<Vec<_>>(), ["index.md"]);
    Ok(())
}

#[test]
fn test_inheritance_substitution_and_self() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc(
        "index.md",
        "env:\n  TRIPLE: ${ARCH}-linux\nno_merge: [detect]\ndetect:\n  magic: ROOT\n  offset: 0",
        "",
    )?;
    package.doc(
        "docs/guests/linux.md",
        "env:\n  CC: ${TRIPLE}-gcc\nprovides:\n  guests/linux/${ARCH}/kernel: {}\ndetect:\n  magic: LINUX\nlabel: ${SELF}",
        "",
    )?;

    let catalogue = package.catalogue()?;
    let meta = catalogue.resolver(&context("aarch64")).resolve_path("guests/linux")?;

    assert_eq!(meta["env"], json!({"TRIPLE": "aarch64-linux", "CC": "aarch64-linux-gcc"}));
    assert_eq!(meta["provides"], json!({"guests/linux/aarch64/kernel": {}}));
    assert_eq!(meta["detect"], json!({"magic": "LINUX"}));
    assert_eq!(meta["label"], json!("guests/linux"));
    Ok(())
}

#[test]
fn test_deleted_key_removed_then_restored() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("index.md", "tags: [a, b]", "")?;
    package.doc("docs/x.md", "\"-tags\": null", "")?;
    package.doc("docs/x/y.md", "tags: [c]", "")?;

    let catalogue = package.catalogue()?;
    assert!(!catalogue.paths["x"].meta.contains_key("tags"));
    assert_eq!(catalogue.paths["x/y"].meta["tags"], json!(["c"]));
    Ok(())
}

#[test]
fn test_malformed_front_matter_is_an_error() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/bad.md", "provides: [unclosed", "")?;

    let err = package.catalogue().unwrap_err();
    let frontmatter = err.chain().find_map(|cause| cause.downcast_ref::<BuildError>());
    assert!(matches!(
        frontmatter,
        Some(BuildError::FrontmatterParse { file, .. }) if file == "docs/bad.md"
    ));
    Ok(())
}

#[test]
fn test_to_json_snapshot_shape() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("index.md", "title: root", "body\n")?;

    let catalogue = package.catalogue()?;
    let value: serde_json::Value = serde_json::from_str(&catalogue.to_json()?)?;
    assert_eq!(value["paths"][""]["sources"], json!(["index.md"]));
    assert_eq!(value["files"]["index.md"]["content"], json!("body\n"));
    assert!(value["files"]["index.md"]["hash"].as_str().unwrap().starts_with("sha256:"));
    Ok(())
}
