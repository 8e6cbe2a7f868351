//! CLI Command Implementations
//!
//! Each command builds a [`SoftwareHost`] from the configuration. Capture
//! devices are fed by sine sources at different pitches so routes can be
//! told apart in the level output. With `--hardware` (and the `cpal-host`
//! feature) devices come from the machine's audio hardware instead.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context};
use serde_json::json;
use tracing::info;

use super::{EffectArg, RouteArg};
use crate::catalog::{DeviceCatalog, DeviceDescriptor, DeviceDirection, StaticCatalog};
use crate::config::Config;
use crate::dsp::EffectKind;
use crate::engine::buffer::linear_to_db;
use crate::engine::{LevelSnapshot, NodeId, RoutingEngine};
#[cfg(feature = "cpal-host")]
use crate::host::CpalCatalog;
use crate::host::{SineSource, SoftwareHost};

/// Input streams that must stay alive while a live host renders
#[cfg(feature = "cpal-host")]
type LiveStreams = Vec<cpal::Stream>;
#[cfg(not(feature = "cpal-host"))]
type LiveStreams = ();

const BASE_FREQUENCY: f32 = 220.0;
const SOURCE_AMPLITUDE: f32 = 0.5;

/// Load the config file if one was given, defaults otherwise
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Devices offered when the config lists none
pub fn default_devices() -> Vec<DeviceDescriptor> {
    vec![
        DeviceDescriptor::new("mic", "Built-in Microphone", DeviceDirection::Capture).as_default(),
        DeviceDescriptor::new("line-in", "Line In", DeviceDirection::Capture),
        DeviceDescriptor::new("speakers", "Built-in Speakers", DeviceDirection::Playback)
            .as_default(),
        DeviceDescriptor::new("headphones", "Headphones", DeviceDirection::Playback),
    ]
}

/// Devices from the config file, or the defaults when it lists none
pub fn configured_devices(config: &Config) -> Vec<DeviceDescriptor> {
    if config.devices.is_empty() {
        default_devices()
    } else {
        config.devices.clone()
    }
}

/// Catalog to list devices from
pub fn device_catalog(config: &Config, hardware: bool) -> anyhow::Result<Box<dyn DeviceCatalog>> {
    if hardware {
        hardware_catalog()
    } else {
        Ok(Box::new(StaticCatalog::new(configured_devices(config))))
    }
}

#[cfg(feature = "cpal-host")]
fn hardware_catalog() -> anyhow::Result<Box<dyn DeviceCatalog>> {
    Ok(Box::new(CpalCatalog::new()))
}

#[cfg(not(feature = "cpal-host"))]
fn hardware_catalog() -> anyhow::Result<Box<dyn DeviceCatalog>> {
    bail!("hardware devices need cablebus built with the cpal-host feature")
}

/// Software host fed by live hardware inputs
#[cfg(feature = "cpal-host")]
fn live_host(config: &Config) -> anyhow::Result<(SoftwareHost, LiveStreams)> {
    let (host, streams) = CpalCatalog::new().live_host(config.host.clone());
    info!(inputs = streams.len(), "Hardware inputs opened");
    Ok((host, streams))
}

#[cfg(not(feature = "cpal-host"))]
fn live_host(_config: &Config) -> anyhow::Result<(SoftwareHost, LiveStreams)> {
    bail!("hardware capture needs cablebus built with the cpal-host feature")
}

/// Software host with the configured devices
pub fn build_host(config: &Config) -> SoftwareHost {
    let mut host = SoftwareHost::new(config.host.clone());
    let mut captures = 0;
    for device in configured_devices(config) {
        match device.direction {
            DeviceDirection::Capture => {
                captures += 1;
                let frequency = BASE_FREQUENCY * captures as f32;
                host.add_capture_device(
                    device,
                    Box::new(SineSource::new(frequency, SOURCE_AMPLITUDE)),
                );
            }
            DeviceDirection::Playback => host = host.with_playback_device(device),
        }
    }
    host
}

/// List configured devices, or the machine's audio hardware.
pub fn list_devices(config: &Config, hardware: bool) -> anyhow::Result<()> {
    let devices = device_catalog(config, hardware)?.list_devices();
    if devices.is_empty() {
        println!("No devices.");
        return Ok(());
    }

    println!(
        "{:<24} {:<10} {:<28} {:>8} {:>8}",
        "ID", "DIRECTION", "NAME", "CHANNELS", "RATE"
    );
    println!("{:-<82}", "");
    for device in devices {
        let marker = if device.is_default { " *" } else { "" };
        println!(
            "{:<24} {:<10} {:<28} {:>8} {:>8}",
            device.id,
            device.direction.to_string(),
            format!("{}{}", device.name, marker),
            device.channels,
            device.sample_rate
        );
    }
    println!();
    println!("* default device");
    Ok(())
}

/// List effect kinds with their parameter ranges.
pub fn list_effects() -> anyhow::Result<()> {
    for kind in EffectKind::ALL {
        println!("{}", kind);
        for spec in kind.param_specs() {
            println!(
                "  {:<16} {:>9} .. {:<9} default {}",
                spec.name, spec.min, spec.max, spec.default
            );
        }
    }
    Ok(())
}

/// Build the requested graph, render it and print levels as JSON.
pub fn simulate(
    config: &Config,
    routes: &[RouteArg],
    effects: &[EffectArg],
    blocks: usize,
    master: Option<f32>,
    hardware: bool,
) -> anyhow::Result<()> {
    let (host, _streams) = if hardware {
        live_host(config)?
    } else {
        (build_host(config), Default::default())
    };
    let mut engine = RoutingEngine::new(host, config.engine.clone())?;
    engine.start().context("failed to start audio engine")?;

    let mut route_ids = Vec::with_capacity(routes.len());
    for route in routes {
        let input = NodeId::input(route.input.as_str());
        if engine.node(&input).is_none() {
            engine
                .create_input_node(&route.input)
                .with_context(|| format!("cannot activate capture device '{}'", route.input))?;
        }
        let output = NodeId::output(route.output.as_str());
        if engine.node(&output).is_none() {
            engine.create_output_node(&route.output)?;
        }
        route_ids.push(engine.create_route(&input, &output)?);
    }

    for effect in effects {
        let Some(route_id) = route_ids.get(effect.route_index) else {
            bail!(
                "effect {} refers to route {}, but only {} routes were given",
                effect.kind,
                effect.route_index,
                route_ids.len()
            );
        };
        engine.add_effect(route_id, effect.kind)?;
    }

    if let Some(volume) = master {
        engine.set_master_volume(volume)?;
    }

    let latest: Arc<Mutex<Option<LevelSnapshot>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&latest);
    engine.start_level_monitoring(move |snapshot| {
        if let Ok(mut slot) = sink.lock() {
            *slot = Some(snapshot.clone());
        }
    });

    let block_size = config.host.block_size;
    let block_time =
        Duration::from_secs_f64(block_size as f64 / config.host.sample_rate.max(1) as f64);
    let mut output_peak = 0.0_f32;
    for _ in 0..blocks {
        if hardware {
            // let the input callbacks deliver a block's worth of audio
            std::thread::sleep(block_time);
        }
        let block = engine.render(block_size);
        output_peak = output_peak.max(block.peak());
    }
    info!(blocks, block_size, "Simulation rendered");

    engine.stop_level_monitoring();
    let levels = latest
        .lock()
        .map_err(|_| anyhow::anyhow!("level monitor callback panicked"))?
        .take();

    let report = json!({
        "status": engine.status(),
        "master_volume": engine.master_volume(),
        "routes": engine.routes(),
        "output_peak_db": linear_to_db(output_peak),
        "levels": levels.map(|snapshot| {
            snapshot
                .levels
                .into_iter()
                .map(|(node, levels)| {
                    (node.to_string(), json!({ "peak_db": levels.peak_db, "rms_db": levels.rms_db }))
                })
                .collect::<serde_json::Map<_, _>>()
        }),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    engine.stop()?;
    Ok(())
}
