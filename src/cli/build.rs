//! `qbuild build`: build targets with the container tool.

use anyhow::Result;
use clap::Args;

use super::common::{CommandContext, CommandExecutor, expand_targets};
use crate::container::PodmanTool;
use crate::resolver::{BuildGraph, ProvidesIndex};
use crate::runner::BuildRunner;

#[derive(Args, Debug, Default)]
pub struct BuildCommand {
    /// Outputs to build; globs are expanded against provided outputs
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Rebuild everything, ignoring the cache
    #[arg(short, long)]
    pub force: bool,
}

impl CommandExecutor for BuildCommand {
    async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let config = &ctx.config;
        let resolver = ctx.catalogue.resolver(&ctx.context);
        let index = ProvidesIndex::build(&resolver)?;
        let targets = expand_targets(&self.targets, &index)?;

        let tool = PodmanTool::locate(&config.container_tool)?;
        let runner = BuildRunner::new(&config.root, &config.build_dir, &config.host_arch, &tool)?
            .force(self.force);

        runner.write_snapshot(&ctx.catalogue)?;
        let graph = BuildGraph::build(&targets, &resolver, &index, runner.build_dir())?;
        let summary = runner.run_graph(&graph).await?;
        println!("{summary}");
        Ok(())
    }
}
