//! Routing Engine
//!
//! The facade the presentation layer drives. It ties together the
//! processing context, the node registry, the routing graph, the effect
//! splicer and the level monitor.
//!
//! Signal path of one route:
//!
//! ```text
//! capture -> node gain -> analyzer
//!               |
//!               +-> route gain -> effect 1 -> ... -> effect n -> node gain -> analyzer -> master -> hardware
//!                   (route)                                       (output node)
//! ```
//!
//! Every mutating call requires a running context and is all-or-nothing:
//! structural errors are returned before anything is touched, and host
//! failures part way through are rolled back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::buffer::AudioBuffer;
use super::context::{ContextState, ProcessingContext};
use super::graph::{EffectId, EffectUnit, Route, RouteId, RouteInfo, RoutingGraph};
use super::monitor::{LevelCallback, LevelMonitor, LevelSnapshot, NodeLevels};
use super::registry::{CaptureSide, NodeId, NodeInfo, NodeRegistry, StreamNode};
use super::splicer::{self, ChainEnds};
use super::transaction::StageTransaction;
use super::volume::{schedule_now, Volume};
use crate::catalog::{DeviceCatalog, DeviceDescriptor, DeviceDirection};
use crate::config::EngineConfig;
use crate::dsp::EffectKind;
use crate::error::{Result, RoutingError};
use crate::host::{AudioHost, SoftwareHost, StageHandle, StageSpec};

/// Read-only engine summary for status polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub context_state: ContextState,
    pub input_node_count: usize,
    pub output_node_count: usize,
    pub route_count: usize,
    /// Present while the hardware connection is open
    pub sample_rate: Option<u32>,
}

/// One hop of a route's signal path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalStage {
    RouteGain,
    Effect(EffectId),
    Target(NodeId),
    /// A stage the route does not own
    Unknown(StageHandle),
}

/// Audio routing graph engine
pub struct RoutingEngine<H: AudioHost = SoftwareHost> {
    context: ProcessingContext<H>,
    config: EngineConfig,
    nodes: NodeRegistry,
    graph: RoutingGraph,
    monitor: LevelMonitor,
}

impl<H: AudioHost> RoutingEngine<H> {
    /// Create an engine over a host
    ///
    /// # Arguments
    /// * `host` - Host audio subsystem; not opened until [`initialize`](Self::initialize)
    /// * `config` - Engine settings, validated here
    pub fn new(host: H, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(host, config))
    }

    pub fn with_defaults(host: H) -> Self {
        Self::build(host, EngineConfig::default())
    }

    fn build(host: H, config: EngineConfig) -> Self {
        Self {
            context: ProcessingContext::new(host),
            config,
            nodes: NodeRegistry::new(),
            graph: RoutingGraph::new(),
            monitor: LevelMonitor::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        self.context.host()
    }

    /// Direct host access, for hosts that need driving from outside
    pub fn host_mut(&mut self) -> &mut H {
        self.context.host_mut()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the hardware connection and allocate the master stage
    ///
    /// A failure here is fatal: the engine is closed and a new instance is
    /// required.
    pub fn initialize(&mut self) -> Result<()> {
        self.context
            .initialize(Volume::new(self.config.master_volume))
    }

    /// Resume hardware I/O, initializing first if needed
    pub fn start(&mut self) -> Result<()> {
        match self.context.state() {
            ContextState::Uninitialized => self.initialize(),
            _ => self.context.start(),
        }
    }

    pub fn suspend(&mut self) -> Result<()> {
        self.context.suspend()
    }

    /// Tear everything down and close the hardware connection
    ///
    /// Routes go first, then nodes, then the master stage. The engine is
    /// `Closed` afterwards even if the host fails to close; that failure is
    /// returned.
    pub fn stop(&mut self) -> Result<()> {
        if self.context.state() == ContextState::Closed {
            return Ok(());
        }
        self.monitor.stop();

        let routes = self.graph.ids();
        let nodes = self.nodes.ids();
        for id in &routes {
            if let Some(route) = self.graph.remove(id) {
                self.teardown_route(route);
            }
        }
        for id in &nodes {
            if let Some(node) = self.nodes.remove(id) {
                self.teardown_node(node);
            }
        }
        info!(
            routes = routes.len(),
            nodes = nodes.len(),
            "Routing graph torn down"
        );

        self.context.close()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            context_state: self.context.state(),
            input_node_count: self.nodes.count(DeviceDirection::Capture),
            output_node_count: self.nodes.count(DeviceDirection::Playback),
            route_count: self.graph.len(),
            sample_rate: self.context.sample_rate(),
        }
    }

    // ========================================================================
    // Stream Nodes
    // ========================================================================

    /// Activate a capture device: capture -> gain -> analyzer
    ///
    /// `"default"` resolves to the host's default capture device. A device
    /// already captured by another node, under any alias, is a duplicate.
    pub fn create_input_node(&mut self, device_id: &str) -> Result<NodeId> {
        self.context.require_running()?;
        let id = NodeId::input(device_id);
        self.ensure_new_node(&id)?;

        let volume = Volume::new(self.config.default_node_volume);
        let analyzer_config = self.config.analyzer();

        let mut tx = StageTransaction::new(self.context.host_mut());
        let stream = tx
            .open_capture(device_id)
            .map_err(RoutingError::capture_failed)?;
        if let Some(existing) = self.nodes.iter().find(|node| {
            node.capture()
                .is_some_and(|capture| capture.stream.device_id == stream.device_id)
        }) {
            warn!(
                node = %existing.id(),
                device = %stream.device_id,
                "Device is already captured by another node"
            );
            return Err(RoutingError::DuplicateNode {
                node_id: existing.id().to_string(),
            });
        }
        let source = tx.create(StageSpec::Capture(stream.id))?;
        let gain = tx.create(StageSpec::Gain {
            initial: volume.gain(),
        })?;
        let analyzer = tx.create(StageSpec::Analyzer(analyzer_config))?;
        tx.connect(source, gain)?;
        tx.connect(gain, analyzer)?;
        tx.commit();

        info!(node = %id, device = %stream.device_id, "Input node created");
        let capture = CaptureSide { stream, source };
        self.nodes
            .insert(StreamNode::new(id.clone(), volume, gain, analyzer, Some(capture)));
        Ok(id)
    }

    /// Activate a playback device: gain -> analyzer -> master
    pub fn create_output_node(&mut self, device_id: &str) -> Result<NodeId> {
        self.context.require_running()?;
        let id = NodeId::output(device_id);
        self.ensure_new_node(&id)?;

        let volume = Volume::new(self.config.default_node_volume);
        let analyzer_config = self.config.analyzer();
        let master = self.context.master()?;

        let mut tx = StageTransaction::new(self.context.host_mut());
        let gain = tx.create(StageSpec::Gain {
            initial: volume.gain(),
        })?;
        let analyzer = tx.create(StageSpec::Analyzer(analyzer_config))?;
        tx.connect(gain, analyzer)?;
        tx.connect(analyzer, master)?;
        tx.commit();

        info!(node = %id, "Output node created");
        self.nodes
            .insert(StreamNode::new(id.clone(), volume, gain, analyzer, None));
        Ok(id)
    }

    fn ensure_new_node(&self, id: &NodeId) -> Result<()> {
        if self.nodes.contains(id) {
            warn!(node = %id, "Node already exists");
            return Err(RoutingError::DuplicateNode {
                node_id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Deactivate a device, removing every route that touches it first
    ///
    /// Removing an unknown node is a no-op.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<()> {
        self.context.require_running()?;
        let Some(node) = self.nodes.get(id).cloned() else {
            debug!(node = %id, "Remove of unknown node ignored");
            return Ok(());
        };

        let touching = self.graph.routes_touching(id);
        for route_id in &touching {
            if let Some(route) = self.graph.remove(route_id) {
                self.teardown_route(route);
            }
        }
        self.teardown_node(node);
        self.nodes.remove(id);
        info!(node = %id, routes_removed = touching.len(), "Node removed");
        Ok(())
    }

    pub fn set_node_volume(&mut self, id: &NodeId, percent: f32) -> Result<()> {
        self.context.require_running()?;
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| node_not_found(id))?;
        let volume = Volume::new(percent);
        schedule_now(
            self.context.host_mut(),
            node.gain_stage(),
            volume.effective_gain(node.active),
        )?;
        node.volume = volume;
        debug!(node = %id, %volume, "Node volume set");
        Ok(())
    }

    /// Mute or unmute a node, keeping its routes and remembered volume
    pub fn set_node_active(&mut self, id: &NodeId, active: bool) -> Result<()> {
        self.context.require_running()?;
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| node_not_found(id))?;
        schedule_now(
            self.context.host_mut(),
            node.gain_stage(),
            node.volume.effective_gain(active),
        )?;
        node.active = active;
        info!(node = %id, active, "Node activity changed");
        Ok(())
    }

    pub fn node(&self, id: &NodeId) -> Option<NodeInfo> {
        self.nodes.get(id).map(NodeInfo::from)
    }

    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes.iter().map(NodeInfo::from).collect()
    }

    // ========================================================================
    // Routes
    // ========================================================================

    /// Connect an active input node to an active output node
    ///
    /// Checks, in order: both nodes exist, source is capture and target is
    /// playback, both are active, and the ordered pair is not yet routed.
    pub fn create_route(&mut self, source: &NodeId, target: &NodeId) -> Result<RouteId> {
        self.context.require_running()?;
        let source_node = self.nodes.get(source).ok_or_else(|| node_not_found(source))?;
        let target_node = self.nodes.get(target).ok_or_else(|| node_not_found(target))?;

        let invalid = |reason: &str| RoutingError::InvalidRouteEndpoints {
            source_id: source.to_string(),
            target_id: target.to_string(),
            reason: reason.to_string(),
        };
        if !source.is_input() {
            return Err(invalid("source must be a capture node"));
        }
        if target.is_input() {
            return Err(invalid("target must be a playback node"));
        }
        if !source_node.is_active() || !target_node.is_active() {
            return Err(invalid("both endpoints must be active"));
        }

        let id = RouteId::new(source.clone(), target.clone());
        if self.graph.contains(&id) {
            return Err(RoutingError::DuplicateRoute {
                route_id: id.to_string(),
            });
        }

        let from = source_node.gain_stage();
        let to = target_node.gain_stage();
        let volume = Volume::new(self.config.default_route_volume);

        let mut tx = StageTransaction::new(self.context.host_mut());
        let gain = tx.create(StageSpec::Gain {
            initial: volume.gain(),
        })?;
        tx.connect(from, gain)?;
        tx.connect(gain, to)?;
        tx.commit();

        info!(route = %id, "Route created");
        self.graph.insert(Route::new(id.clone(), volume, gain));
        Ok(id)
    }

    /// Disconnect a route and release its effect chain
    ///
    /// Removing an unknown route is a no-op.
    pub fn remove_route(&mut self, id: &RouteId) -> Result<()> {
        self.context.require_running()?;
        match self.graph.remove(id) {
            Some(route) => {
                self.teardown_route(route);
                info!(route = %id, "Route removed");
            }
            None => debug!(route = %id, "Remove of unknown route ignored"),
        }
        Ok(())
    }

    pub fn set_route_volume(&mut self, id: &RouteId, percent: f32) -> Result<()> {
        self.context.require_running()?;
        let route = self
            .graph
            .get_mut(id)
            .ok_or_else(|| route_not_found(id))?;
        let volume = Volume::new(percent);
        schedule_now(
            self.context.host_mut(),
            route.gain_stage(),
            volume.effective_gain(route.active),
        )?;
        route.volume = volume;
        debug!(route = %id, %volume, "Route volume set");
        Ok(())
    }

    /// Mute or unmute a route without touching its topology
    pub fn set_route_active(&mut self, id: &RouteId, active: bool) -> Result<()> {
        self.context.require_running()?;
        let route = self
            .graph
            .get_mut(id)
            .ok_or_else(|| route_not_found(id))?;
        schedule_now(
            self.context.host_mut(),
            route.gain_stage(),
            route.volume.effective_gain(active),
        )?;
        route.active = active;
        info!(route = %id, active, "Route activity changed");
        Ok(())
    }

    pub fn route(&self, id: &RouteId) -> Option<RouteInfo> {
        self.graph.get(id).map(RouteInfo::from)
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        self.graph.iter().map(RouteInfo::from).collect()
    }

    /// Follow the host's real connections from the route gain to its target
    pub fn route_signal_path(&self, id: &RouteId) -> Result<Vec<SignalStage>> {
        let route = self.graph.get(id).ok_or_else(|| route_not_found(id))?;
        let ends = self.chain_ends(route)?;
        let max_len = route.effects().len() + 4;

        let path = splicer::signal_path(self.context.host(), ends, max_len)
            .into_iter()
            .map(|stage| {
                if stage == ends.head {
                    SignalStage::RouteGain
                } else if stage == ends.tail {
                    SignalStage::Target(route.id().target().clone())
                } else {
                    route
                        .effects()
                        .iter()
                        .find(|unit| unit.stage() == stage)
                        .map(|unit| SignalStage::Effect(unit.id()))
                        .unwrap_or(SignalStage::Unknown(stage))
                }
            })
            .collect();
        Ok(path)
    }

    // ========================================================================
    // Master Stage
    // ========================================================================

    pub fn set_master_volume(&mut self, percent: f32) -> Result<()> {
        let volume = Volume::new(percent);
        self.context.set_master_volume(volume)?;
        debug!(%volume, "Master volume set");
        Ok(())
    }

    pub fn master_volume(&self) -> Volume {
        self.context.master_volume()
    }

    // ========================================================================
    // Effect Chains
    // ========================================================================

    /// Append an effect with its kind's default parameters to a route
    pub fn add_effect(&mut self, route_id: &RouteId, kind: EffectKind) -> Result<EffectId> {
        self.context.require_running()?;
        let route = self
            .graph
            .get(route_id)
            .ok_or_else(|| route_not_found(route_id))?;
        let ends = self.chain_ends(route)?;
        let chain = route.chain_stages();
        let parameters = kind.default_parameters();

        let host = self.context.host_mut();
        let stage = host.create_stage(StageSpec::Effect {
            kind,
            parameters: parameters.clone(),
        })?;
        if let Err(err) = splicer::splice_in(host, ends, &chain, chain.len(), stage) {
            warn!(route = %route_id, %kind, error = %err, "Effect splice failed, releasing stage");
            if let Err(release_err) = host.release_stage(stage) {
                warn!(%stage, error = %release_err, "Failed to release effect stage");
            }
            return Err(err.into());
        }

        let unit = EffectUnit::new(kind, parameters, stage);
        let effect_id = unit.id();
        if let Some(route) = self.graph.get_mut(route_id) {
            route.effects.push(unit);
        }
        info!(route = %route_id, effect = %effect_id, %kind, "Effect added");
        Ok(effect_id)
    }

    /// Splice an effect out of its route and release it
    ///
    /// Unknown routes and effects are ignored.
    pub fn remove_effect(&mut self, route_id: &RouteId, effect_id: &EffectId) -> Result<()> {
        self.context.require_running()?;
        let Some(route) = self.graph.get(route_id) else {
            debug!(route = %route_id, "Effect removal on unknown route ignored");
            return Ok(());
        };
        let Some(index) = route.effect_index(effect_id) else {
            debug!(route = %route_id, effect = %effect_id, "Removal of unknown effect ignored");
            return Ok(());
        };
        let ends = self.chain_ends(route)?;
        let chain = route.chain_stages();
        let stage = chain[index];

        let host = self.context.host_mut();
        splicer::splice_out(host, ends, &chain, index)?;
        if let Err(err) = host.release_stage(stage) {
            warn!(%stage, error = %err, "Failed to release effect stage");
        }

        if let Some(route) = self.graph.get_mut(route_id) {
            route.effects.remove(index);
        }
        info!(route = %route_id, effect = %effect_id, "Effect removed");
        Ok(())
    }

    /// Bypass or re-enable an effect in place
    pub fn set_effect_enabled(
        &mut self,
        route_id: &RouteId,
        effect_id: &EffectId,
        enabled: bool,
    ) -> Result<()> {
        self.context.require_running()?;
        let unit = self
            .graph
            .get_mut(route_id)
            .ok_or_else(|| route_not_found(route_id))?
            .effects
            .iter_mut()
            .find(|unit| &unit.id() == effect_id)
            .ok_or_else(|| effect_not_found(route_id, effect_id))?;
        self.context
            .host_mut()
            .set_stage_bypass(unit.stage(), !enabled)?;
        unit.enabled = enabled;
        debug!(route = %route_id, effect = %effect_id, enabled, "Effect enabled state set");
        Ok(())
    }

    /// Set one effect parameter, clamped into its range
    ///
    /// Returns the value actually applied.
    pub fn set_effect_parameter(
        &mut self,
        route_id: &RouteId,
        effect_id: &EffectId,
        name: &str,
        value: f32,
    ) -> Result<f32> {
        self.context.require_running()?;
        let unit = self
            .graph
            .get_mut(route_id)
            .ok_or_else(|| route_not_found(route_id))?
            .effects
            .iter_mut()
            .find(|unit| &unit.id() == effect_id)
            .ok_or_else(|| effect_not_found(route_id, effect_id))?;
        let applied = unit.kind().normalize_parameter(name, value)?;
        self.context
            .host_mut()
            .set_stage_parameter(unit.stage(), name, applied)?;
        unit.parameters.insert(name.to_string(), applied);
        debug!(route = %route_id, effect = %effect_id, name, value = applied, "Effect parameter set");
        Ok(applied)
    }

    /// Move an effect to a new chain position (clamped to the chain length)
    pub fn move_effect(
        &mut self,
        route_id: &RouteId,
        effect_id: &EffectId,
        index: usize,
    ) -> Result<()> {
        self.context.require_running()?;
        let route = self
            .graph
            .get(route_id)
            .ok_or_else(|| route_not_found(route_id))?;
        let from = route
            .effect_index(effect_id)
            .ok_or_else(|| effect_not_found(route_id, effect_id))?;
        let ends = self.chain_ends(route)?;
        let chain = route.chain_stages();
        let to = index.min(chain.len() - 1);
        if to == from {
            return Ok(());
        }

        let stage = chain[from];
        let mut remaining = chain.clone();
        remaining.remove(from);

        let host = self.context.host_mut();
        splicer::splice_out(host, ends, &chain, from)?;
        if let Err(err) = splicer::splice_in(host, ends, &remaining, to, stage) {
            warn!(route = %route_id, effect = %effect_id, error = %err, "Effect move failed, restoring position");
            if let Err(restore_err) = splicer::splice_in(host, ends, &remaining, from, stage) {
                warn!(error = %restore_err, "Could not restore effect position");
            }
            return Err(err.into());
        }

        if let Some(route) = self.graph.get_mut(route_id) {
            let unit = route.effects.remove(from);
            route.effects.insert(to, unit);
        }
        info!(route = %route_id, effect = %effect_id, from, to, "Effect moved");
        Ok(())
    }

    fn chain_ends(&self, route: &Route) -> Result<ChainEnds> {
        let target = route.id().target();
        let target_node = self.nodes.get(target).ok_or_else(|| node_not_found(target))?;
        Ok(ChainEnds {
            head: route.gain_stage(),
            tail: target_node.gain_stage(),
        })
    }

    // ========================================================================
    // Level Monitoring
    // ========================================================================

    /// Deliver level snapshots to `callback` once per host frame
    ///
    /// A fresh loop ticks immediately. Calling this while monitoring only
    /// swaps the callback.
    pub fn start_level_monitoring<F>(&mut self, callback: F)
    where
        F: FnMut(&LevelSnapshot) + Send + 'static,
    {
        let callback: LevelCallback = Box::new(callback);
        if self.monitor.start(callback) {
            info!("Level monitoring started");
            self.on_frame();
        } else {
            debug!("Level monitoring already running, callback replaced");
        }
    }

    /// Cancel level monitoring; safe when not running
    pub fn stop_level_monitoring(&mut self) {
        if self.monitor.is_running() {
            info!("Level monitoring stopped");
        }
        self.monitor.stop();
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Host frame callback: run the monitor tick if one is scheduled
    pub fn on_frame(&mut self) {
        if self.monitor.take_pending().is_none() {
            return;
        }
        let host = self.context.host();
        let levels: BTreeMap<NodeId, NodeLevels> = self
            .nodes
            .iter()
            .filter(|node| node.is_active())
            .filter_map(|node| {
                host.analyzer_levels(node.analyzer_stage())
                    .map(|reading| (node.id().clone(), NodeLevels::from(reading)))
            })
            .collect();
        self.monitor.deliver(levels);
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    fn teardown_route(&mut self, route: Route) {
        let host = self.context.host_mut();
        if let Some(source) = self.nodes.get(route.id().source()) {
            if let Err(err) = host.disconnect(source.gain_stage(), route.gain_stage()) {
                warn!(route = %route.id(), error = %err, "Failed to detach route from source");
            }
        }
        for unit in route.effects() {
            if let Err(err) = host.release_stage(unit.stage()) {
                warn!(route = %route.id(), effect = %unit.id(), error = %err, "Failed to release effect stage");
            }
        }
        if let Err(err) = host.release_stage(route.gain_stage()) {
            warn!(route = %route.id(), error = %err, "Failed to release route gain");
        }
    }

    fn teardown_node(&mut self, mut node: StreamNode) {
        let host = self.context.host_mut();
        if let Some(capture) = node.take_capture() {
            if let Err(err) = host.stop_capture(&capture.stream) {
                warn!(node = %node.id(), error = %err, "Failed to stop capture stream");
            }
            if let Err(err) = host.release_stage(capture.source) {
                warn!(node = %node.id(), error = %err, "Failed to release capture stage");
            }
        }
        for stage in [node.gain_stage(), node.analyzer_stage()] {
            if let Err(err) = host.release_stage(stage) {
                warn!(node = %node.id(), %stage, error = %err, "Failed to release node stage");
            }
        }
    }
}

impl<H: AudioHost + DeviceCatalog> RoutingEngine<H> {
    /// Devices known to the host
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.context.host().list_devices()
    }
}

impl RoutingEngine<SoftwareHost> {
    /// Render one block and run the monitor tick
    pub fn render(&mut self, frames: usize) -> AudioBuffer {
        let output = self.context.host_mut().render(frames);
        self.on_frame();
        output
    }
}

fn node_not_found(id: &NodeId) -> RoutingError {
    RoutingError::NodeNotFound {
        node_id: id.to_string(),
    }
}

fn route_not_found(id: &RouteId) -> RoutingError {
    RoutingError::RouteNotFound {
        route_id: id.to_string(),
    }
}

fn effect_not_found(route_id: &RouteId, effect_id: &EffectId) -> RoutingError {
    RoutingError::EffectNotFound {
        route_id: route_id.to_string(),
        effect_id: effect_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SineSource;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn engine() -> RoutingEngine {
        let host = SoftwareHost::default()
            .with_capture_device(
                DeviceDescriptor::new("mic", "Mic", DeviceDirection::Capture).as_default(),
                SineSource::new(440.0, 0.5),
            )
            .with_playback_device(DeviceDescriptor::new("spk", "Speakers", DeviceDirection::Playback));
        let mut engine = RoutingEngine::with_defaults(host);
        engine.start().unwrap();
        engine
    }

    fn routed() -> (RoutingEngine, RouteId) {
        let mut engine = engine();
        let mic = engine.create_input_node("mic").unwrap();
        let spk = engine.create_output_node("spk").unwrap();
        let route = engine.create_route(&mic, &spk).unwrap();
        (engine, route)
    }

    #[test]
    fn test_start_initializes() {
        let engine = engine();
        let status = engine.status();
        assert_eq!(status.context_state, ContextState::Running);
        assert_eq!(status.sample_rate, Some(48000));
        assert_eq!(engine.master_volume(), Volume::MAX);
    }

    #[test]
    fn test_input_node_wiring() {
        let mut engine = engine();
        let id = engine.create_input_node("mic").unwrap();
        assert_eq!(id.to_string(), "input-mic");
        // capture, gain, analyzer + master
        assert_eq!(engine.host().stage_count(), 4);
        assert_eq!(engine.host().open_capture_count(), 1);
        assert_eq!(engine.status().input_node_count, 1);
    }

    #[test]
    fn test_permission_denied_leaves_no_state() {
        let mut engine = engine();
        engine.host_mut().deny_capture("mic");
        let err = engine.create_input_node("mic").unwrap_err();
        assert_eq!(err.error_code(), "PERMISSION_DENIED");
        assert!(engine.nodes().is_empty());
        assert_eq!(engine.host().stage_count(), 1);
        assert_eq!(engine.host().open_capture_count(), 0);
    }

    #[test]
    fn test_route_gain_is_between_endpoints() {
        let (engine, route) = routed();
        assert_eq!(
            engine.route_signal_path(&route).unwrap(),
            vec![
                SignalStage::RouteGain,
                SignalStage::Target(NodeId::output("spk"))
            ]
        );
        let info = engine.route(&route).unwrap();
        assert_relative_eq!(info.volume.percent(), 75.0);
    }

    #[test]
    fn test_inactive_route_is_silent_and_restores_volume() {
        let (mut engine, route) = routed();
        let gain = engine.graph.get(&route).unwrap().gain_stage();
        engine.set_route_volume(&route, 40.0).unwrap();
        engine.set_route_active(&route, false).unwrap();
        assert_eq!(engine.host().gain_value(gain), Some(0.0));

        engine.set_route_active(&route, true).unwrap();
        assert_relative_eq!(engine.host().gain_value(gain).unwrap(), 0.4);
    }

    #[test]
    fn test_move_effect_reorders_chain() {
        let (mut engine, route) = routed();
        let eq = engine.add_effect(&route, EffectKind::Equalizer).unwrap();
        let comp = engine.add_effect(&route, EffectKind::Compressor).unwrap();
        let delay = engine.add_effect(&route, EffectKind::Delay).unwrap();

        engine.move_effect(&route, &delay, 0).unwrap();
        assert_eq!(
            engine.route_signal_path(&route).unwrap(),
            vec![
                SignalStage::RouteGain,
                SignalStage::Effect(delay),
                SignalStage::Effect(eq),
                SignalStage::Effect(comp),
                SignalStage::Target(NodeId::output("spk")),
            ]
        );

        engine.move_effect(&route, &delay, 99).unwrap();
        let order: Vec<EffectId> = engine
            .route(&route)
            .unwrap()
            .effects
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(order, vec![eq, comp, delay]);
    }

    #[test]
    fn test_failed_effect_splice_releases_stage() {
        let (mut engine, route) = routed();
        let ends = engine.chain_ends(engine.graph.get(&route).unwrap()).unwrap();
        let path = engine.route_signal_path(&route).unwrap();
        let stages = engine.host().stage_count();
        let edges = engine.host().edge_count();

        engine.host_mut().fault_edge(ends.head, ends.tail);
        let err = engine.add_effect(&route, EffectKind::Reverb).unwrap_err();
        assert_eq!(err.error_code(), "HOST_ERROR");
        assert_eq!(engine.host().stage_count(), stages);
        assert_eq!(engine.host().edge_count(), edges);
        assert_eq!(engine.route_signal_path(&route).unwrap(), path);
        assert!(engine.route(&route).unwrap().effects.is_empty());
    }

    #[test]
    fn test_failed_move_restores_position() {
        let (mut engine, route) = routed();
        let eq = engine.add_effect(&route, EffectKind::Equalizer).unwrap();
        let comp = engine.add_effect(&route, EffectKind::Compressor).unwrap();
        let delay = engine.add_effect(&route, EffectKind::Delay).unwrap();
        let path = engine.route_signal_path(&route).unwrap();
        let edges = engine.host().edge_count();

        let stage_of = |engine: &RoutingEngine, id: &EffectId| {
            engine.graph.get(&route).unwrap().effect(id).unwrap().stage()
        };
        let delay_stage = stage_of(&engine, &delay);
        let eq_stage = stage_of(&engine, &eq);
        engine.host_mut().fault_edge(delay_stage, eq_stage);

        let err = engine.move_effect(&route, &delay, 0).unwrap_err();
        assert_eq!(err.error_code(), "HOST_ERROR");
        assert_eq!(engine.route_signal_path(&route).unwrap(), path);
        assert_eq!(engine.host().edge_count(), edges);
        let order: Vec<EffectId> = engine
            .route(&route)
            .unwrap()
            .effects
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(order, vec![eq, comp, delay]);
    }

    #[test]
    fn test_effect_parameter_is_clamped_and_validated() {
        let (mut engine, route) = routed();
        let comp = engine.add_effect(&route, EffectKind::Compressor).unwrap();
        let applied = engine
            .set_effect_parameter(&route, &comp, "ratio", 50.0)
            .unwrap();
        assert_eq!(applied, 20.0);
        let err = engine
            .set_effect_parameter(&route, &comp, "wet", 10.0)
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PARAMETER");
    }

    #[test]
    fn test_disabled_effect_is_bypassed() {
        let (mut engine, route) = routed();
        let reverb = engine.add_effect(&route, EffectKind::Reverb).unwrap();
        engine.set_effect_enabled(&route, &reverb, false).unwrap();
        let stage = engine.graph.get(&route).unwrap().effect(&reverb).unwrap().stage();
        assert_eq!(engine.host().is_bypassed(stage), Some(true));
        assert!(!engine.route(&route).unwrap().effects[0].enabled);
    }

    #[test]
    fn test_monitor_skips_inactive_nodes() {
        use std::sync::{Arc, Mutex};

        let (mut engine, _route) = routed();
        let mic = NodeId::input("mic");
        engine.set_node_active(&mic, false).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.start_level_monitoring(move |snapshot| {
            sink.lock()
                .unwrap()
                .push(snapshot.levels.keys().cloned().collect::<Vec<_>>());
        });
        engine.render(512);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|ids| ids == &vec![NodeId::output("spk")]));
    }

    #[test]
    fn test_stop_releases_everything() {
        let (mut engine, route) = routed();
        engine.add_effect(&route, EffectKind::Filter).unwrap();
        engine.stop().unwrap();
        assert_eq!(engine.status().context_state, ContextState::Closed);
        assert_eq!(engine.status().route_count, 0);
        assert_eq!(engine.host().stage_count(), 0);
        assert_eq!(engine.host().open_capture_count(), 0);
    }
}
