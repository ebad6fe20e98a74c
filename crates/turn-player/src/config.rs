use anyhow::{Context, Result};

pub use chunk_player::config::PlaybackConfig;

use crate::cli::Args;

/// Build the effective playback config: file (or defaults), then CLI overrides.
pub fn resolve(args: &Args) -> Result<PlaybackConfig> {
    let mut cfg = match args.config.as_deref() {
        Some(path) => PlaybackConfig::load(path)?,
        None => PlaybackConfig::default(),
    };

    if let Some(device) = args.device.as_ref() {
        cfg.device = Some(device.clone());
    }
    if let Some(samples) = args.initial_buffer_samples {
        cfg.initial_buffer_samples = samples;
    }
    if let Some(chunks) = args.start_after_chunks {
        cfg.start_after_chunks = chunks;
    }
    if let Some(cap) = args.max_buffered_samples {
        cfg.max_buffered_samples = Some(cap);
    }

    cfg.validate().context("playback config")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn cli_overrides_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "initial_buffer_samples = 2000\nstart_after_chunks = 5\ndevice = \"Speakers\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = Args::try_parse_from([
            "turn-player",
            "--config",
            &path,
            "--start-after-chunks",
            "1",
            "--device",
            "USB",
            "tone",
        ])
        .unwrap();
        let cfg = resolve(&args).unwrap();

        assert_eq!(cfg.initial_buffer_samples, 2000);
        assert_eq!(cfg.start_after_chunks, 1);
        assert_eq!(cfg.device.as_deref(), Some("USB"));
    }

    #[test]
    fn defaults_without_file() {
        let args = Args::try_parse_from(["turn-player", "tone"]).unwrap();
        let cfg = resolve(&args).unwrap();
        assert_eq!(cfg, PlaybackConfig::default());
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = Args::try_parse_from([
            "turn-player",
            "--max-buffered-samples",
            "10",
            "tone",
        ])
        .unwrap();
        assert!(resolve(&args).is_err());
    }
}
