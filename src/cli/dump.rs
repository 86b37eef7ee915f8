//! `qbuild dump`: print the whole catalogue.

use anyhow::Result;
use clap::Args;

use super::common::{CommandContext, CommandExecutor};

/// Print every logical path (merged metadata and sources) and every loaded
/// document as pretty JSON.
#[derive(Args, Debug, Default)]
pub struct DumpCommand {}

impl CommandExecutor for DumpCommand {
    async fn execute(self, ctx: &CommandContext) -> Result<()> {
        println!("{}", ctx.catalogue.to_json()?);
        Ok(())
    }
}
