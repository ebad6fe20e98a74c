use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "turn-player", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// TOML file with playback overrides
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Samples to queue before the output stream opens
    #[arg(long)]
    pub initial_buffer_samples: Option<usize>,

    /// Chunks to receive before playback is started
    #[arg(long)]
    pub start_after_chunks: Option<usize>,

    /// Cap on queued samples (oldest chunks are dropped beyond it)
    #[arg(long)]
    pub max_buffered_samples: Option<usize>,

    /// Print the final playback status as JSON
    #[arg(long)]
    pub status_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream raw mono s16le PCM from a file, or `-` for stdin, as one turn
    Play {
        /// Path to raw PCM (already at the configured sample rate)
        path: PathBuf,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Play a synthesized sine tone as one turn
    Tone {
        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        freq: f32,

        /// Tone length in seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },
}

/// How the simulated producer hands out chunks.
#[derive(clap::Args, Debug, Clone)]
pub struct DeliveryArgs {
    /// Bytes per chunk (reads from pipes may deliver fewer)
    #[arg(long, default_value_t = 4800)]
    pub chunk_bytes: usize,

    /// Deliver chunks at real-time rate instead of as fast as possible
    #[arg(long)]
    pub pace: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_delivery_options() {
        let args = Args::try_parse_from([
            "turn-player",
            "--device",
            "USB",
            "play",
            "-",
            "--chunk-bytes",
            "960",
            "--pace",
        ])
        .unwrap();
        assert_eq!(args.device.as_deref(), Some("USB"));
        let Some(Command::Play { path, delivery }) = args.cmd else {
            panic!("expected play");
        };
        assert_eq!(path, PathBuf::from("-"));
        assert_eq!(delivery.chunk_bytes, 960);
        assert!(delivery.pace);
    }

    #[test]
    fn list_devices_needs_no_subcommand() {
        let args = Args::try_parse_from(["turn-player", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert!(args.cmd.is_none());
    }

    #[test]
    fn tone_defaults() {
        let args = Args::try_parse_from(["turn-player", "tone"]).unwrap();
        let Some(Command::Tone { freq, seconds, delivery }) = args.cmd else {
            panic!("expected tone");
        };
        assert_eq!(freq, 440.0);
        assert_eq!(seconds, 2.0);
        assert_eq!(delivery.chunk_bytes, 4800);
        assert!(!delivery.pace);
    }
}
