//! Configuration for easydeploy.
//!
//! Command line flags live here. They override the matching keys of the plan file.

use clap::Parser;

use crate::plan::Plan;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// Deployment plan to run
    #[arg(long, short, default_value = "deploy.yaml")]
    pub plan: String,

    /// How many servers to deploy at once. 0 deploys to all of them at once
    #[arg(long, short = 'j')]
    pub parallel: Option<usize>,

    /// Stream the output of every command
    #[arg(long, short)]
    pub verbose: bool,

    /// Give up on a single command after this many seconds
    #[arg(long, short)]
    pub timeout: Option<u64>,

    /// Only validate the plan file, don't deploy
    #[arg(long)]
    pub check: bool,
}

impl Config {
    pub fn apply(&self, plan: &mut Plan) {
        if let Some(parallel) = self.parallel {
            plan.parallel = parallel;
        }
        if self.timeout.is_some() {
            plan.timeout = self.timeout;
        }
        plan.verbose |= self.verbose;
    }
}
