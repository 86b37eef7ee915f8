//! `qbuild outputs`: list everything the catalogue can build.

use anyhow::Result;
use clap::Args;

use super::common::{CommandContext, CommandExecutor};
use crate::resolver::ProvidesIndex;

#[derive(Args, Debug, Default)]
pub struct OutputsCommand {
    /// Also show which path provides each output
    #[arg(short, long)]
    pub long: bool,
}

impl OutputsCommand {
    /// One line per output, sorted.
    #[must_use]
    pub fn render(&self, index: &ProvidesIndex) -> String {
        let mut out = String::new();
        for (output, path) in index.iter() {
            if self.long {
                let path = if path.is_empty() { "." } else { path };
                out.push_str(&format!("{output}\t{path}\n"));
            } else {
                out.push_str(output);
                out.push('\n');
            }
        }
        out
    }
}

impl CommandExecutor for OutputsCommand {
    async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let index = ctx.provides_index()?;
        print!("{}", self.render(&index));
        Ok(())
    }
}
