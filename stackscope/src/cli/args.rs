//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stackscope",
    about = "Capture, aggregate and decode call stacks of the running process",
    after_help = "\
EXAMPLES:
    stackscope                               Capture the calling thread's stack
    stackscope --all-threads                 Merge every live thread into one tree
    stackscope --all-threads --pack s.bin    Also write the binary wire form
    stackscope --decode s.bin                Decode a wire file from any process"
)]
pub struct Args {
    /// Capture every live thread and merge the stacks into one tree
    #[arg(long)]
    pub all_threads: bool,

    /// Capture a single thread by TID instead of the calling thread
    #[arg(long, value_name = "TID", conflicts_with = "all_threads")]
    pub tid: Option<i32>,

    /// Export the aggregated stack as JSON
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Write the packed binary form of the aggregated stack
    #[arg(long, value_name = "FILE")]
    pub pack: Option<PathBuf>,

    /// Decode a packed stack file and print it instead of capturing
    #[arg(long, value_name = "FILE", conflicts_with_all = ["all_threads", "tid"])]
    pub decode: Option<PathBuf>,

    /// Maximum frames to walk per thread
    #[arg(long, default_value = "100")]
    pub max_frames: usize,

    /// Failure demonstration modes (drive the integration tests)
    #[arg(long, value_name = "MODE", hide = true)]
    pub demo: Option<DemoMode>,

    /// Suppress the capture banner
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DemoMode {
    /// Explicit abort three helper calls deep
    Abort,
    /// Two threads abort at the same instant
    AbortConcurrent,
    /// Abort with distributed coordination active and a group hook set
    GroupAbort,
    /// Raise SIGSEGV and let the fatal-signal handler report it
    Segfault,
}
