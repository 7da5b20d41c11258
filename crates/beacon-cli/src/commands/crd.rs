//! Crd command

use std::io::Write;

use clap::Args;

use beacon_common::crd::beacon_agent_crd;

use super::{write_output, OutputFormat};
use crate::Result;

#[derive(Args, Debug)]
pub struct CrdArgs {
    /// Output format (yaml or json)
    #[arg(short, long, env = "BEACON_OUTPUT", default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,
}

pub fn run(args: CrdArgs, out: &mut impl Write) -> Result<()> {
    let crd = beacon_agent_crd()?;
    write_output(&crd, args.output, out)
}
