//! The build runner end to end, against the in-process container tool.

use anyhow::Result;
use serde_json::Value;
use std::fs;

use qbuild::cache::{BuildCache, CacheEntry};
use qbuild::catalogue::Context;
use qbuild::core::BuildError;
use qbuild::runner::{BuildRunner, BuildSummary};
use qbuild::test_utils::{FakeContainerTool, PackageFixture, ToolCall, init_test_logging};

const HOST: &str = "x86_64";

fn context() -> Context {
    [("ARCH".to_string(), HOST.to_string()), ("HOST_ARCH".to_string(), HOST.to_string())].into()
}

/// builder (image) <- data/base (file) <- data/disk (file)
fn package() -> Result<PackageFixture> {
    init_test_logging(None);
    let package = PackageFixture::new()?;
    package.doc("index.md", "env:\n  VENDOR: qemount", "")?;
    package.doc("docs/builder.md", "provides: [\"docker:qbuild/builder\"]", "")?;
    package.recipe("builder")?;
    package.doc(
        "docs/data/base.md",
        "provides: [data/base.img]\nrequires: [\"docker:qbuild/builder\"]\nruns_on: docker:qbuild/builder",
        "",
    )?;
    package.doc(
        "docs/data/disk.md",
        "provides: [data/disk.img]\nrequires: [data/base.img, \"docker:qbuild/builder\"]\nruns_on: docker:qbuild/builder\nenv:\n  SIZE: 64M",
        "",
    )?;
    Ok(package)
}

async fn build(
    package: &PackageFixture,
    tool: &FakeContainerTool,
    targets: &[&str],
    force: bool,
) -> Result<BuildSummary> {
    let catalogue = package.catalogue()?;
    BuildRunner::new(package.root(), &package.build_dir(), HOST, tool)?
        .force(force)
        .build(&catalogue, &context(), targets)
        .await
}

#[tokio::test]
async fn test_fresh_build_runs_everything_in_order() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();

    let summary = build(&package, &tool, &["data/disk.img"], false).await?;
    assert_eq!(
        summary,
        BuildSummary {
            images_built: 1,
            images_clean: 0,
            outputs_built: 2,
            outputs_clean: 0,
        }
    );

    let calls = tool.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], ToolCall::Build(b) if b.tag == "qbuild/builder"));
    assert!(matches!(&calls[1], ToolCall::Run(r) if r.targets == ["data/base.img"]));
    assert!(matches!(&calls[2], ToolCall::Run(r) if r.targets == ["data/disk.img"]));

    assert!(package.build_dir().join("data/disk.img").is_file());
    assert!(package.build_dir().join("catalogue.json").is_file());

    let cache = BuildCache::load(&package.build_dir());
    assert!(matches!(cache.get("data/base.img"), Some(CacheEntry::File(_))));
    assert!(matches!(cache.get("data/disk.img"), Some(CacheEntry::File(_))));
    assert!(matches!(cache.get("docker:qbuild/builder:x86_64"), Some(CacheEntry::Image(_))));
    Ok(())
}

#[tokio::test]
async fn test_second_build_is_clean() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();
    build(&package, &tool, &["data/disk.img"], false).await?;
    tool.clear_calls();

    let summary = build(&package, &tool, &["data/disk.img"], false).await?;
    assert!(tool.calls().is_empty(), "unexpected calls: {:?}", tool.calls());
    assert_eq!(summary.images_clean, 1);
    assert_eq!(summary.outputs_clean, 2);
    assert_eq!(summary.outputs_built, 0);
    Ok(())
}

#[tokio::test]
async fn test_force_rebuilds_clean_nodes() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();
    build(&package, &tool, &["data/disk.img"], false).await?;
    let before = package.read_build_file("data/disk.img")?;
    tool.clear_calls();

    let summary = build(&package, &tool, &["data/disk.img"], true).await?;
    assert_eq!(summary.images_built, 1);
    assert_eq!(summary.outputs_built, 2);
    assert_eq!(tool.builds().len(), 1);
    assert_eq!(tool.runs().len(), 2);
    assert_ne!(package.read_build_file("data/disk.img")?, before);
    Ok(())
}

#[tokio::test]
async fn test_recipe_change_propagates_downstream() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();
    build(&package, &tool, &["data/disk.img"], false).await?;
    tool.clear_calls();

    package.file("builder/Dockerfile", "FROM scratch\nRUN true\n")?;
    let summary = build(&package, &tool, &["data/disk.img"], false).await?;
    assert_eq!(summary.images_built, 1);
    assert_eq!(summary.outputs_built, 2);
    Ok(())
}

#[tokio::test]
async fn test_env_change_rebuilds_only_that_path() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();
    build(&package, &tool, &["data/disk.img"], false).await?;
    tool.clear_calls();

    package.doc(
        "docs/data/disk.md",
        "provides: [data/disk.img]\nrequires: [data/base.img, \"docker:qbuild/builder\"]\nruns_on: docker:qbuild/builder\nenv:\n  SIZE: 128M",
        "",
    )?;
    let summary = build(&package, &tool, &["data/disk.img"], false).await?;
    assert_eq!(summary.images_clean, 1);
    assert_eq!(summary.outputs_clean, 1);
    assert_eq!(summary.outputs_built, 1);
    let runs = tool.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].targets, ["data/disk.img"]);
    Ok(())
}

#[tokio::test]
async fn test_pruned_image_is_rebuilt_without_dirtying_outputs() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();
    build(&package, &tool, &["data/disk.img"], false).await?;
    tool.clear_calls();

    tool.remove_image("qbuild/builder");
    let summary = build(&package, &tool, &["data/disk.img"], false).await?;
    assert_eq!(summary.images_built, 1);
    assert_eq!(summary.outputs_clean, 2);
    assert!(tool.runs().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_deleted_output_is_rebuilt() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();
    build(&package, &tool, &["data/disk.img"], false).await?;
    tool.clear_calls();

    fs::remove_file(package.build_dir().join("data/base.img"))?;
    build(&package, &tool, &["data/disk.img"], false).await?;
    let runs = tool.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].targets, ["data/base.img"]);
    Ok(())
}

#[tokio::test]
async fn test_run_receives_metadata_and_env() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();
    build(&package, &tool, &["data/disk.img"], false).await?;

    let runs = tool.runs();
    let disk = &runs[1];
    assert_eq!(disk.image, "qbuild/builder");
    assert_eq!(disk.build_dir, std::path::absolute(package.build_dir())?);

    let env = |key: &str| disk.env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
    assert_eq!(env("VENDOR").as_deref(), Some("qemount"));
    assert_eq!(env("SIZE").as_deref(), Some("64M"));

    let meta: Value = serde_json::from_str(&env("META").unwrap())?;
    assert_eq!(meta["runs_on"], "docker:qbuild/builder");
    assert!(meta["provides"]["data/disk.img"].is_object());
    assert!(meta["requires"]["data/base.img"].is_object());
    Ok(())
}

#[tokio::test]
async fn test_only_needed_outputs_are_requested() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/multi.md", "provides: [out/a, out/b]", "")?;
    package.recipe("multi")?;
    let tool = FakeContainerTool::new();

    let summary = build(&package, &tool, &["out/b"], false).await?;
    assert_eq!(summary.outputs_built, 1);
    let runs = tool.runs();
    assert_eq!(runs[0].targets, ["out/b"]);
    assert_eq!(runs[0].image, "localhost/multi");
    assert!(!package.build_dir().join("out/a").exists());
    Ok(())
}

#[tokio::test]
async fn test_build_requires_are_mounted() -> Result<()> {
    let package = PackageFixture::new()?;
    package.build_file("sysroot/lib.a", "lib")?;
    package.doc(
        "docs/toolchain.md",
        "provides: [\"docker:toolchain\"]\nbuild_requires: [sysroot]\nenv:\n  TARGET: ${ARCH}",
        "",
    )?;
    package.recipe("toolchain")?;
    let tool = FakeContainerTool::new();

    build(&package, &tool, &["docker:toolchain"], false).await?;
    let builds = tool.builds();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].tag, "toolchain");
    assert_eq!(builds[0].build_args, [("TARGET".to_string(), HOST.to_string())]);
    assert_eq!(builds[0].mounts.len(), 1);
    assert!(builds[0].mounts[0].0.ends_with("build/sysroot"));
    assert_eq!(builds[0].mounts[0].1, "/host/build/sysroot");

    // A changed build requirement dirties the image
    tool.clear_calls();
    package.build_file("sysroot/lib.a", "lib v2")?;
    build(&package, &tool, &["docker:toolchain"], false).await?;
    assert_eq!(tool.builds().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_external_requirement_change_dirties_output() -> Result<()> {
    let package = PackageFixture::new()?;
    package.build_file("data/fs/ext4", "one")?;
    package.doc("docs/fs/image.md", "provides: [data/fs.img]\nrequires: [data/fs/ext4]", "")?;
    package.recipe("fs/image")?;
    let tool = FakeContainerTool::new();

    build(&package, &tool, &["data/fs.img"], false).await?;
    tool.clear_calls();
    build(&package, &tool, &["data/fs.img"], false).await?;
    assert!(tool.runs().is_empty());

    package.build_file("data/fs/ext4", "second")?;
    build(&package, &tool, &["data/fs.img"], false).await?;
    assert_eq!(tool.runs().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_output_is_fatal_and_stale_file_removed() -> Result<()> {
    let package = package()?;
    package.build_file("data/base.img", "stale")?;
    let tool = FakeContainerTool::new();
    tool.skip_output("data/base.img");

    let err = build(&package, &tool, &["data/disk.img"], false).await.unwrap_err();
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::OutputNotCreated {
            output,
            path,
            output_log,
        }) => {
            assert_eq!(output, "data/base.img");
            assert_eq!(path, "data/base");
            assert!(output_log.contains("skipped data/base.img"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!package.build_dir().join("data/base.img").exists());
    // The build stopped before the dependent
    assert_eq!(tool.runs().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_run_aborts_and_keeps_earlier_cache() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();
    tool.fail_runs(true);

    let err = build(&package, &tool, &["data/disk.img"], false).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::ContainerToolFailed { .. })));

    let cache = BuildCache::load(&package.build_dir());
    assert!(cache.get("docker:qbuild/builder:x86_64").is_some());
    assert!(cache.get("data/base.img").is_none());
    Ok(())
}

#[tokio::test]
async fn test_image_without_recipe_is_rejected() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/builder.md", "provides: [\"docker:builder\"]", "")?;
    let tool = FakeContainerTool::new();

    let err = build(&package, &tool, &["docker:builder"], false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingRecipe { path }) if path == "builder"
    ));
    assert!(tool.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_files_without_build_mechanism_are_rejected() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/data.md", "provides: [data.img]", "")?;
    let tool = FakeContainerTool::new();

    let err = build(&package, &tool, &["data.img"], false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::NoBuildMechanism { path }) if path == "data"
    ));
    Ok(())
}

#[tokio::test]
async fn test_malformed_runs_on_is_rejected() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/data.md", "provides: [data.img]\nruns_on: builder", "")?;
    let tool = FakeContainerTool::new();

    let err = build(&package, &tool, &["data.img"], false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MalformedRunsOn { value, .. }) if value == "builder"
    ));
    Ok(())
}

#[tokio::test]
async fn test_snapshot_rewritten_only_on_change() -> Result<()> {
    let package = package()?;
    let tool = FakeContainerTool::new();
    let catalogue = package.catalogue()?;
    let runner = BuildRunner::new(package.root(), &package.build_dir(), HOST, &tool)?;

    assert!(runner.write_snapshot(&catalogue)?);
    assert!(!runner.write_snapshot(&catalogue)?);

    package.doc("docs/extra.md", "title: extra", "")?;
    assert!(runner.write_snapshot(&package.catalogue()?)?);
    Ok(())
}

#[tokio::test]
async fn test_root_provider_becomes_clean() -> Result<()> {
    init_test_logging(None);
    let package = PackageFixture::new()?;
    package.doc("index.md", "provides: [root.out]", "")?;
    package.recipe("")?;
    let tool = FakeContainerTool::new();

    let first = build(&package, &tool, &["root.out"], false).await?;
    assert_eq!(first.images_built, 1);
    assert_eq!(first.outputs_built, 1);
    assert_eq!(tool.builds()[0].tag, "localhost/root");
    assert!(package.build_dir().join("root.out").is_file());

    for _ in 0..2 {
        tool.clear_calls();
        let again = build(&package, &tool, &["root.out"], false).await?;
        assert!(tool.calls().is_empty(), "unexpected calls: {:?}", tool.calls());
        assert_eq!(
            again,
            BuildSummary {
                images_built: 0,
                images_clean: 1,
                outputs_built: 0,
                outputs_clean: 1,
            }
        );
    }

    package.file("Dockerfile", "FROM alpine\n")?;
    tool.clear_calls();
    let changed = build(&package, &tool, &["root.out"], false).await?;
    assert_eq!(changed.images_built, 1);
    assert_eq!(changed.outputs_built, 1);
    Ok(())
}
