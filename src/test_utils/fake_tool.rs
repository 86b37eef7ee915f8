//! In-process container tool double.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::container::{ContainerRun, ContainerTool, ImageBuild};
use crate::core::BuildError;
use crate::utils::ensure_parent_dir;

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Build(ImageBuild),
    Run(ContainerRun),
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<ToolCall>,
    /// tag -> image id
    images: BTreeMap<String, String>,
    next_id: usize,
    runs: usize,
    skip_outputs: BTreeSet<String>,
    fail_runs: bool,
}

/// Records every build and run. Builds register a fresh image id; runs write
/// every requested target into the build directory unless told to skip it.
///
/// Written outputs contain the image and a run counter, so rebuilt outputs
/// differ from earlier ones.
#[derive(Debug, Default)]
pub struct FakeContainerTool {
    state: Mutex<State>,
}

impl FakeContainerTool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pretend an image already exists.
    pub fn add_image(&self, tag: &str) {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("sha256:fake{}", state.next_id);
        state.images.insert(tag.to_string(), id);
    }

    /// Forget an image, as if it was pruned.
    pub fn remove_image(&self, tag: &str) {
        self.state().images.remove(tag);
    }

    /// Runs succeed without writing `output`.
    pub fn skip_output(&self, output: &str) {
        self.state().skip_outputs.insert(output.to_string());
    }

    /// Every run exits unsuccessfully.
    pub fn fail_runs(&self, fail: bool) {
        self.state().fail_runs = fail;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ToolCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    #[must_use]
    pub fn builds(&self) -> Vec<ImageBuild> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ToolCall::Build(build) => Some(build),
                ToolCall::Run(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn runs(&self) -> Vec<ContainerRun> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ToolCall::Run(run) => Some(run),
                ToolCall::Build(_) => None,
            })
            .collect()
    }
}

impl ContainerTool for FakeContainerTool {
    async fn image_exists(&self, reference: &str) -> Result<bool> {
        let state = self.state();
        Ok(state.images.contains_key(reference) || state.images.values().any(|id| id == reference))
    }

    async fn build_image(&self, build: &ImageBuild) -> Result<String> {
        let mut state = self.state();
        state.calls.push(ToolCall::Build(build.clone()));
        state.next_id += 1;
        let id = format!("sha256:fake{}", state.next_id);
        state.images.insert(build.tag.clone(), id.clone());
        Ok(id)
    }

    async fn run_container(&self, run: &ContainerRun) -> Result<String> {
        let mut state = self.state();
        state.calls.push(ToolCall::Run(run.clone()));
        if state.fail_runs {
            return Err(BuildError::ContainerToolFailed {
                operation: format!("run {}", run.image),
                status: "exit status: 1".to_string(),
                output: "recipe failed".to_string(),
            }
            .into());
        }
        state.runs += 1;

        let mut log = String::new();
        for target in &run.targets {
            if state.skip_outputs.contains(target) {
                log.push_str(&format!("skipped {target}\n"));
                continue;
            }
            let path = run.build_dir.join(target);
            ensure_parent_dir(&path)?;
            std::fs::write(&path, format!("{target} by {} run {}\n", run.image, state.runs))?;
            log.push_str(&format!("wrote {target}\n"));
        }
        Ok(log)
    }
}
