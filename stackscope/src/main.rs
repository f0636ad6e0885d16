//! # stackscope - Main Entry Point
//!
//! Captures the stacks of this process (one thread, a named thread, or all
//! of them), prints the aggregated tree, and optionally exports it as JSON
//! or in the binary wire form. `--decode` turns the binary back into text
//! in any process, which is the cross-process half of the wire format.
//!
//! The hidden `--demo` modes drive the termination pipeline on purpose and
//! exist for the integration tests.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use stackscope::cli::{Args, DemoMode};
use stackscope::domain::{CaptureScope, Tid};
use stackscope::export::StackJsonExporter;
use stackscope::{capture, system, termination};
use stackscope_common::{pack_tree, unpack_tree, StackTree};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run(&Args::parse()) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run(args: &Args) -> Result<()> {
    if let Some(mode) = args.demo {
        run_demo(mode);
    }

    if let Some(path) = &args.decode {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let tree = unpack_tree(&bytes).context("decoding packed stack data")?;
        for line in tree.render() {
            println!("{line}");
        }
        return Ok(());
    }

    let options = capture::CaptureOptions { max_frames: args.max_frames };
    let tree = if args.all_threads {
        capture::capture_all_threads(&options)
    } else if let Some(tid) = args.tid {
        StackTree::merge([capture::capture_thread(Tid(tid), &options)])
    } else {
        StackTree::merge([capture::capture_current_thread(&options)])
    };

    if !args.quiet {
        println!(
            "{} ({} contributor{})",
            system::executable_path().display(),
            tree.contributors,
            if tree.contributors == 1 { "" } else { "s" }
        );
    }
    for line in tree.render() {
        println!("{line}");
    }

    if let Some(path) = &args.export {
        StackJsonExporter::export(&tree, path)
            .with_context(|| format!("exporting JSON to {}", path.display()))?;
        info!("exported JSON to {}", path.display());
    }
    if let Some(path) = &args.pack {
        std::fs::write(path, pack_tree(&tree))
            .with_context(|| format!("writing packed stacks to {}", path.display()))?;
        info!("wrote packed stacks to {}", path.display());
    }

    Ok(())
}

/// Deliberately enter the termination pipeline. Never returns.
fn run_demo(mode: DemoMode) -> ! {
    let scope = if mode == DemoMode::GroupAbort {
        CaptureScope::Distributed
    } else {
        CaptureScope::ThreadLocal
    };
    termination::set_abort_behavior(termination::AbortBehavior {
        throw_on_abort: false,
        scope,
        max_frames: 100,
    });
    termination::set_error_handlers();

    match mode {
        DemoMode::Abort => demo_outer(),
        DemoMode::GroupAbort => {
            termination::set_group_abort(|| eprintln!("[group] abort broadcast to peers"));
            termination::abort("group abort demo requested")
        }
        DemoMode::AbortConcurrent => {
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|i| {
                    let barrier = std::sync::Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        termination::abort(format!("concurrent abort from thread {i}"));
                    })
                })
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
            // The process dies inside the pipeline before the joins finish.
            unreachable!("termination pipeline returned");
        }
        DemoMode::Segfault => {
            #[allow(unsafe_code)]
            unsafe {
                libc::raise(libc::SIGSEGV);
            }
            unreachable!("SIGSEGV handler returned");
        }
    }
}

#[inline(never)]
fn demo_outer() -> ! {
    demo_middle()
}

#[inline(never)]
fn demo_middle() -> ! {
    demo_inner()
}

#[inline(never)]
fn demo_inner() -> ! {
    termination::abort("abort demo requested")
}
