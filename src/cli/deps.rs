//! `qbuild deps`: show the build plan for some targets.

use anyhow::Result;
use clap::Args;

use super::common::{CommandContext, CommandExecutor, expand_targets};
use crate::resolver::BuildGraph;

#[derive(Args, Debug, Default)]
pub struct DepsCommand {
    /// Outputs to plan for; globs are expanded against provided outputs
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Print paths in build order, one per line
    #[arg(long, conflicts_with = "tree")]
    pub order: bool,

    /// Print an indented dependency tree
    #[arg(long)]
    pub tree: bool,
}

impl DepsCommand {
    pub fn render(&self, graph: &BuildGraph) -> Result<String> {
        if self.order {
            let mut out = String::new();
            for path in &graph.order {
                out.push_str(if path.is_empty() { "." } else { path });
                out.push('\n');
            }
            Ok(out)
        } else if self.tree {
            Ok(graph.to_tree_string())
        } else {
            Ok(format!("{}\n", serde_json::to_string_pretty(&graph.to_json())?))
        }
    }
}

impl CommandExecutor for DepsCommand {
    async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let resolver = ctx.catalogue.resolver(&ctx.context);
        let index = crate::resolver::ProvidesIndex::build(&resolver)?;
        let targets = expand_targets(&self.targets, &index)?;
        ctx.catalogue.write_snapshot(&ctx.config.build_dir)?;
        let graph = BuildGraph::build(&targets, &resolver, &index, &ctx.config.build_dir)?;
        print!("{}", self.render(&graph)?);
        Ok(())
    }
}
