use std::error::Error;
use std::process::Command;

use clap::Args;
use mkid_store::{SCHEMA_VERSION, SOLUTION_SCHEMA};
use serde::Serialize;

use super::print_json;

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Include schema versions and toolchain details.
    #[arg(long)]
    pub long: bool,
}

#[derive(Debug, Serialize)]
struct VersionInfo {
    version: String,
    solution_schema: String,
    index_schema: i64,
    git_commit: String,
    rustc: String,
}

pub fn run(args: &VersionArgs) -> Result<(), Box<dyn Error>> {
    if !args.long {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    print_json(&VersionInfo {
        version: env!("CARGO_PKG_VERSION").into(),
        solution_schema: format!(
            "{}.{}.{}",
            SOLUTION_SCHEMA.major, SOLUTION_SCHEMA.minor, SOLUTION_SCHEMA.patch
        ),
        index_schema: SCHEMA_VERSION,
        git_commit: tool_output("git", &["rev-parse", "HEAD"]).unwrap_or_else(|| "unknown".into()),
        rustc: tool_output("rustc", &["--version"]).unwrap_or_else(|| "rustc unavailable".into()),
    })
}

fn tool_output(program: &str, args: &[&str]) -> Option<String> {
    let out = Command::new(program).args(args).output().ok()?;
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string())
}
