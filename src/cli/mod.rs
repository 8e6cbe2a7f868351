//! CLI Module
//!
//! Command-line front end for the routing engine.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::dsp::EffectKind;

/// Cablebus - live audio routing with per-route effects and level metering
#[derive(Parser, Debug)]
#[command(name = "cablebus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List capture and playback devices
    #[command(name = "devices")]
    Devices {
        /// List the machine's audio hardware instead of the configured devices
        #[arg(long)]
        hardware: bool,
    },

    /// List effect kinds and their parameters
    #[command(name = "effects")]
    Effects,

    /// Build a routing graph on the software host and render it
    #[command(name = "simulate")]
    Simulate {
        /// Route as CAPTURE:PLAYBACK device ids (repeatable)
        #[arg(short, long = "route", value_parser = parse_route, required = true)]
        routes: Vec<RouteArg>,

        /// Effect as ROUTE_INDEX:KIND, e.g. 0:reverb (repeatable)
        #[arg(short, long = "effect", value_parser = parse_effect)]
        effects: Vec<EffectArg>,

        /// Number of blocks to render
        #[arg(short, long, default_value_t = 32)]
        blocks: usize,

        /// Master volume percentage
        #[arg(short, long)]
        master: Option<f32>,

        /// Capture from hardware inputs and render in real time
        #[arg(long)]
        hardware: bool,
    },
}

/// `--route` argument
#[derive(Debug, Clone, PartialEq)]
pub struct RouteArg {
    pub input: String,
    pub output: String,
}

/// `--effect` argument
#[derive(Debug, Clone, PartialEq)]
pub struct EffectArg {
    pub route_index: usize,
    pub kind: EffectKind,
}

fn parse_route(s: &str) -> Result<RouteArg, String> {
    match s.split_once(':') {
        Some((input, output)) if !input.is_empty() && !output.is_empty() => Ok(RouteArg {
            input: input.to_string(),
            output: output.to_string(),
        }),
        _ => Err(format!("expected CAPTURE:PLAYBACK, got '{}'", s)),
    }
}

fn parse_effect(s: &str) -> Result<EffectArg, String> {
    let (index, kind) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ROUTE_INDEX:KIND, got '{}'", s))?;
    let route_index = index
        .parse()
        .map_err(|_| format!("route index '{}' is not a number", index))?;
    Ok(EffectArg {
        route_index,
        kind: kind.parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route() {
        let route = parse_route("mic:speakers").unwrap();
        assert_eq!(route.input, "mic");
        assert_eq!(route.output, "speakers");
        assert!(parse_route("mic").is_err());
        assert!(parse_route(":speakers").is_err());
    }

    #[test]
    fn test_parse_effect() {
        let effect = parse_effect("1:eq").unwrap();
        assert_eq!(effect.route_index, 1);
        assert_eq!(effect.kind, EffectKind::Equalizer);
        assert!(parse_effect("x:reverb").is_err());
        assert!(parse_effect("0:chorus").is_err());
    }

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::parse_from([
            "cablebus", "simulate", "-r", "mic:speakers", "-e", "0:delay", "--blocks", "4",
        ]);
        match cli.command {
            Some(Commands::Simulate {
                routes,
                effects,
                blocks,
                master,
                hardware,
            }) => {
                assert_eq!(routes.len(), 1);
                assert_eq!(effects[0].kind, EffectKind::Delay);
                assert_eq!(blocks, 4);
                assert!(master.is_none());
                assert!(!hardware);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_hardware_devices() {
        let cli = Cli::parse_from(["cablebus", "devices", "--hardware"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Devices { hardware: true })
        ));
        let cli = Cli::parse_from(["cablebus", "devices"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Devices { hardware: false })
        ));
    }
}
