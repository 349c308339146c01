use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "shadervst",
    version,
    about = "Standalone preview host for audio/MIDI-reactive GLSL patches"
)]
pub struct Cli {
    /// Patch file (JSON) listing the shader slots.
    #[arg(value_name = "PATCH", env = "SHADERVST_PATCH")]
    pub patch: PathBuf,

    /// Sample rate of the simulated audio stream.
    #[arg(long, value_name = "HZ", default_value_t = 44100.0)]
    pub sample_rate: f64,

    /// Frames per simulated audio block.
    #[arg(long, value_name = "FRAMES", default_value_t = 512)]
    pub block_size: usize,

    /// Connect to the first MIDI input whose name contains this (case-insensitive).
    #[arg(long, value_name = "SUBSTRING")]
    pub midi_port: Option<String>,

    /// Also append log lines to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Do not open any MIDI input.
    #[arg(long)]
    pub no_midi: bool,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            anyhow::bail!("--sample-rate must be a positive number");
        }
        if self.block_size == 0 {
            anyhow::bail!("--block-size must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let cli = Cli::try_parse_from(["shadervst", "patch.json"]).unwrap();
        assert_eq!(cli.patch, PathBuf::from("patch.json"));
        assert_eq!(cli.sample_rate, 44100.0);
        assert_eq!(cli.block_size, 512);
        assert!(!cli.no_midi);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn rejects_zero_block_size() {
        let cli = Cli::try_parse_from(["shadervst", "p.json", "--block-size", "0"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn parses_midi_options() {
        let cli = Cli::try_parse_from([
            "shadervst",
            "p.json",
            "--midi-port",
            "keystep",
            "--sample-rate",
            "48000",
        ])
        .unwrap();
        assert_eq!(cli.midi_port.as_deref(), Some("keystep"));
        assert_eq!(cli.sample_rate, 48000.0);
    }
}
