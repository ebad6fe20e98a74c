//! Turn Player: plays one "turn" of chunked PCM audio through the elastic playback
//! core, the way a conversational client plays a streamed reply.
//!
//! ## Flow
//! 1. **Produce**: a reader thread slices raw mono s16le PCM (file, stdin or a synthesized
//!    tone) into chunks, optionally paced at real-time rate.
//! 2. **Buffer**: chunks go into the controller's queue; playback starts after
//!    `start_after_chunks` chunks and opens the device once the prebuffer fills.
//! 3. **Play**: the CPAL callback drains the queue in fixed blocks, padding with silence.
//! 4. **Finish**: at end of input the queue drains, then the session stops.

mod cli;
mod config;
mod producer;
mod runtime;

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,turn_player=info,chunk_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let Some(cmd) = args.cmd.as_ref() else {
        bail!("no command given; try `turn-player play <PATH>` or `turn-player tone`");
    };
    let config = config::resolve(&args)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        let _ = ctrlc::set_handler(move || {
            if interrupted.swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        });
    }

    let summary = match cmd {
        cli::Command::Play { path, delivery } => {
            let source = runtime::open_source(path)?;
            runtime::play_turn(config, source, delivery, interrupted)?
        }
        cli::Command::Tone { freq, seconds, delivery } => {
            let pcm = producer::tone_pcm(*freq, *seconds, config.sample_rate);
            runtime::play_turn(config, Box::new(Cursor::new(pcm)), delivery, interrupted)?
        }
    };

    if let Some(summary) = summary {
        runtime::report(&summary, args.status_json)?;
    }
    Ok(())
}
