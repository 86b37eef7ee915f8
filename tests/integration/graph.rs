//! Provider index and dependency graph over package trees on disk.

use anyhow::Result;
use std::collections::BTreeSet;

use qbuild::catalogue::{Context, Identifier};
use qbuild::core::BuildError;
use qbuild::resolver::build_graph;
use qbuild::test_utils::PackageFixture;

fn package() -> Result<PackageFixture> {
    let package = PackageFixture::new()?;
    package.doc("index.md", "title: root", "")?;
    package.doc("docs/builder.md", "provides: [\"docker:qbuild/builder\"]", "")?;
    package.doc(
        "docs/data/base.md",
        "provides: [data/base.img]\nrequires: [\"docker:qbuild/builder\"]",
        "",
    )?;
    package.doc(
        "docs/data/disk.md",
        "provides:\n  data/disk.img: {}\n  data/disk.qcow2: {}\nrequires: [data/base.img, \"docker:qbuild/builder\"]",
        "",
    )?;
    Ok(package)
}

#[test]
fn test_order_is_topological() -> Result<()> {
    let package = package()?;
    let catalogue = package.catalogue()?;
    let graph = build_graph(&["data/disk.img"], &catalogue, &Context::new(), &package.build_dir())?;

    assert_eq!(graph.order, ["builder", "data/base", "data/disk"]);
    for (dependent, dependency) in &graph.edges {
        let dependent_at = graph.order.iter().position(|p| p == dependent).unwrap();
        if let Some(dependency_at) = graph.order.iter().position(|p| p == dependency) {
            assert!(dependency_at < dependent_at, "{dependency} after {dependent}");
        }
    }
    Ok(())
}

#[test]
fn test_needed_tracks_requested_outputs_only() -> Result<()> {
    let package = package()?;
    let catalogue = package.catalogue()?;
    let graph = build_graph(
        &["data/disk.qcow2", "data/disk.qcow2"],
        &catalogue,
        &Context::new(),
        &package.build_dir(),
    )?;

    let expected: BTreeSet<Identifier> = [Identifier::File("data/disk.qcow2".to_string())].into();
    assert_eq!(graph.needed_outputs("data/disk"), Some(&expected));
    assert!(graph.needed_outputs("builder").unwrap().contains(&Identifier::Image("qbuild/builder".to_string())));
    // Diamond: builder is required twice but walked once
    assert_eq!(graph.order.iter().filter(|p| *p == "builder").count(), 1);
    Ok(())
}

#[test]
fn test_existing_build_file_satisfies_requirement() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/fs/image.md", "provides: [data/fs.img]\nrequires: [data/fs/ext4]", "")?;
    package.build_file("data/fs/ext4", "prebuilt")?;

    let catalogue = package.catalogue()?;
    let graph = build_graph(&["data/fs.img"], &catalogue, &Context::new(), &package.build_dir())?;
    assert_eq!(graph.order, ["fs/image"]);
    assert_eq!(graph.edges, [("fs/image".to_string(), "data/fs/ext4".to_string())]);
    assert!(!graph.nodes.contains_key("data/fs/ext4"));
    Ok(())
}

#[test]
fn test_missing_dependency_names_requester() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/fs/image.md", "provides: [data/fs.img]\nrequires: [data/fs/ext4]", "")?;

    let catalogue = package.catalogue()?;
    let err = build_graph(&["data/fs.img"], &catalogue, &Context::new(), &package.build_dir())
        .unwrap_err();
    assert_eq!(err.to_string(), "No provider for data/fs/ext4 required by fs/image");
    Ok(())
}

#[test]
fn test_cycle_reports_chain() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/a.md", "provides: [a.out]\nrequires: [b.out]", "")?;
    package.doc("docs/b.md", "provides: [b.out]\nrequires: [a.out]", "")?;

    let catalogue = package.catalogue()?;
    let err = build_graph(&["a.out"], &catalogue, &Context::new(), &package.build_dir())
        .unwrap_err();
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::DependencyCycle { chain }) => {
            assert_eq!(chain, &["a", "b", "a"]);
            assert_eq!(chain.first(), chain.last());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_duplicate_provider_is_rejected() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/a.md", "provides: [same.out]", "")?;
    package.doc("docs/b.md", "provides: [same.out]", "")?;

    let catalogue = package.catalogue()?;
    let err = build_graph(&["same.out"], &catalogue, &Context::new(), &package.build_dir())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::DuplicateProvider { output, .. }) if output == "same.out"
    ));
    Ok(())
}
