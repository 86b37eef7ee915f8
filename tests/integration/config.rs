//! Layered configuration through the process environment.

use anyhow::Result;
use serial_test::serial;
use std::path::PathBuf;

use qbuild::config::{BuildConfig, ConfigOverrides};
use qbuild::test_utils::PackageFixture;

struct EnvGuard(&'static str);

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        // SAFETY: serialised by #[serial]; no other thread reads the environment
        unsafe { std::env::set_var(key, value) };
        Self(key)
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: see EnvGuard::set
        unsafe { std::env::remove_var(self.0) };
    }
}

#[test]
#[serial]
fn test_env_overrides_file_and_flags_override_env() -> Result<()> {
    let package = PackageFixture::new()?;
    package.file("qbuild.toml", "build_dir = \"file-build\"\ncontainer_tool = \"docker\"\n")?;

    let _dir = EnvGuard::set("QBUILD_BUILD_DIR", "env-build");
    let _arch = EnvGuard::set("QBUILD_ARCH", "arm64");

    let overrides = ConfigOverrides {
        root: Some(package.root().to_path_buf()),
        ..ConfigOverrides::default()
    };
    let config = BuildConfig::load(&overrides)?;
    assert_eq!(config.build_dir, PathBuf::from("env-build"));
    assert_eq!(config.container_tool, "docker");
    assert_eq!(config.arch, "aarch64");

    let overrides = ConfigOverrides {
        arch: Some("x86_64".to_string()),
        ..overrides
    };
    let config = BuildConfig::load(&overrides)?;
    assert_eq!(config.arch, "x86_64");
    assert_eq!(config.context()["ARCH"], "x86_64");
    Ok(())
}

#[test]
#[serial]
fn test_jobs_reaches_recipe_env() -> Result<()> {
    let package = PackageFixture::new()?;
    package.doc("docs/kernel.md", "env:\n  MAKEFLAGS: -j${JOBS}", "")?;

    let _jobs = EnvGuard::set("QBUILD_JOBS", "6");
    let overrides = ConfigOverrides {
        root: Some(package.root().to_path_buf()),
        ..ConfigOverrides::default()
    };
    let config = BuildConfig::load(&overrides)?;

    let catalogue = package.catalogue()?;
    let (_, node) = catalogue.resolver(&config.context()).resolve_node("kernel")?;
    assert_eq!(node.env, [("MAKEFLAGS".to_string(), "-j6".to_string())]);
    Ok(())
}
