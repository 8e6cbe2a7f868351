//! In-process software host
//!
//! Renders the stage graph block by block on the caller's thread. Capture
//! devices are simulated by [`CaptureSource`]s and the destination stage's
//! output is returned from [`SoftwareHost::render`] instead of reaching a
//! sound card.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use super::analyzer::{AnalyzerReading, SpectrumAnalyzer};
use super::capture::CaptureSource;
use super::{AudioHost, CaptureStream, HostError, HostState, StageHandle, StageSpec, StreamId};
use crate::catalog::{DeviceCatalog, DeviceDescriptor, DeviceDirection};
use crate::config::HostConfig;
use crate::dsp::{build_processor, EffectKind, Processor};
use crate::engine::AudioBuffer;

// ============================================================================
// Gain Automation
// ============================================================================

/// Gain value with `setValueAtTime`-style events
#[derive(Debug, Clone)]
struct GainParam {
    value: f32,
    /// Pending (time, value) events, sorted by time
    events: VecDeque<(f64, f32)>,
}

impl GainParam {
    fn new(initial: f32) -> Self {
        Self {
            value: initial,
            events: VecDeque::new(),
        }
    }

    /// Insert an event; an event already at the same time is replaced
    fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.events.retain(|&(t, _)| t != time);
        let index = self.events.partition_point(|&(t, _)| t < time);
        self.events.insert(index, (time, value));
    }

    /// Apply every event due at or before `time`
    fn advance_to(&mut self, time: f64) -> f32 {
        while let Some(&(t, value)) = self.events.front() {
            if t > time {
                break;
            }
            self.value = value;
            self.events.pop_front();
        }
        self.value
    }

    fn value_at(&self, time: f64) -> f32 {
        self.events
            .iter()
            .take_while(|&&(t, _)| t <= time)
            .last()
            .map(|&(_, v)| v)
            .unwrap_or(self.value)
    }

    fn process(&mut self, buffer: &mut AudioBuffer, start_time: f64, sample_rate: f64) {
        if self.events.is_empty() {
            buffer.apply_gain(self.value);
            return;
        }
        for i in 0..buffer.len() {
            let gain = self.advance_to(start_time + i as f64 / sample_rate);
            for ch in 0..buffer.channels() {
                if let Some(sample) = buffer.get(i, ch) {
                    buffer.set(i, ch, sample * gain);
                }
            }
        }
    }
}

// ============================================================================
// Stages
// ============================================================================

enum StageKind {
    Destination,
    Gain(GainParam),
    Analyzer(SpectrumAnalyzer),
    Capture(StreamId),
    Effect {
        processor: Box<dyn Processor>,
        bypass: bool,
    },
}

impl StageKind {
    fn label(&self) -> &'static str {
        match self {
            StageKind::Destination => "destination",
            StageKind::Gain(_) => "gain",
            StageKind::Analyzer(_) => "analyzer",
            StageKind::Capture(_) => "capture",
            StageKind::Effect { .. } => "effect",
        }
    }
}

struct OpenStream {
    device_id: String,
    source: Box<dyn CaptureSource>,
}

// ============================================================================
// Software Host
// ============================================================================

/// Host audio subsystem rendered in-process
pub struct SoftwareHost {
    config: HostConfig,
    available: bool,
    opened: bool,
    state: HostState,
    frames_rendered: u64,
    next_id: u64,
    destination: StageHandle,
    stages: BTreeMap<StageHandle, StageKind>,
    edges: BTreeMap<StageHandle, Vec<StageHandle>>,
    devices: Vec<DeviceDescriptor>,
    sources: HashMap<String, Box<dyn CaptureSource>>,
    denied: HashSet<String>,
    streams: BTreeMap<StreamId, OpenStream>,
    fail_close: bool,
    stage_budget: Option<usize>,
    faulted_edges: HashSet<(StageHandle, StageHandle)>,
}

impl Default for SoftwareHost {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl SoftwareHost {
    /// Create a host with no devices
    pub fn new(config: HostConfig) -> Self {
        let destination = StageHandle::new(0);
        let mut stages = BTreeMap::new();
        stages.insert(destination, StageKind::Destination);
        Self {
            config,
            available: true,
            opened: false,
            state: HostState::Suspended,
            frames_rendered: 0,
            next_id: 1,
            destination,
            stages,
            edges: BTreeMap::new(),
            devices: Vec::new(),
            sources: HashMap::new(),
            denied: HashSet::new(),
            streams: BTreeMap::new(),
            fail_close: false,
            stage_budget: None,
            faulted_edges: HashSet::new(),
        }
    }

    /// A host whose audio subsystem cannot be opened
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// Register a capture device backed by a signal source
    pub fn with_capture_device(
        mut self,
        descriptor: DeviceDescriptor,
        source: impl CaptureSource + 'static,
    ) -> Self {
        self.add_capture_device(descriptor, Box::new(source));
        self
    }

    /// Register a playback device
    pub fn with_playback_device(mut self, descriptor: DeviceDescriptor) -> Self {
        self.devices.push(DeviceDescriptor {
            direction: DeviceDirection::Playback,
            ..descriptor
        });
        self
    }

    pub fn add_capture_device(
        &mut self,
        descriptor: DeviceDescriptor,
        source: Box<dyn CaptureSource>,
    ) {
        self.sources.insert(descriptor.id.clone(), source);
        self.devices.push(DeviceDescriptor {
            direction: DeviceDirection::Capture,
            ..descriptor
        });
    }

    /// Make `open_capture` refuse this device as the OS would
    pub fn deny_capture(&mut self, device_id: impl Into<String>) {
        self.denied.insert(device_id.into());
    }

    /// Make the next `close` report a failure
    pub fn fail_on_close(&mut self) {
        self.fail_close = true;
    }

    /// Allow only `count` more stages to be created
    pub fn limit_stages(&mut self, count: usize) {
        self.stage_budget = Some(count);
    }

    /// Make connecting or disconnecting exactly `from -> to` fail
    pub fn fault_edge(&mut self, from: StageHandle, to: StageHandle) {
        self.faulted_edges.insert((from, to));
    }

    pub fn clear_edge_faults(&mut self) {
        self.faulted_edges.clear();
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Stages created and not yet released (the destination is not counted)
    pub fn stage_count(&self) -> usize {
        self.stages.len() - 1
    }

    /// Capture streams opened and not yet stopped
    pub fn open_capture_count(&self) -> usize {
        self.streams.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Gain value in effect at the current hardware time
    pub fn gain_value(&self, stage: StageHandle) -> Option<f32> {
        match self.stages.get(&stage) {
            Some(StageKind::Gain(param)) => Some(param.value_at(self.current_time())),
            _ => None,
        }
    }

    pub fn stage_label(&self, stage: StageHandle) -> Option<&'static str> {
        self.stages.get(&stage).map(StageKind::label)
    }

    pub fn effect_kind(&self, stage: StageHandle) -> Option<EffectKind> {
        match self.stages.get(&stage) {
            Some(StageKind::Effect { processor, .. }) => Some(processor.kind()),
            _ => None,
        }
    }

    pub fn is_bypassed(&self, stage: StageHandle) -> Option<bool> {
        match self.stages.get(&stage) {
            Some(StageKind::Effect { bypass, .. }) => Some(*bypass),
            _ => None,
        }
    }

    /// Device ids with an open capture stream
    pub fn capturing_devices(&self) -> Vec<String> {
        self.streams.values().map(|s| s.device_id.clone()).collect()
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Render one block and advance the hardware clock
    ///
    /// Returns the destination's input. A host that is not running renders
    /// silence and its clock stands still.
    pub fn render(&mut self, frames: usize) -> AudioBuffer {
        let channels = self.config.channels as usize;
        if self.state != HostState::Running || frames == 0 {
            return AudioBuffer::new(frames, channels);
        }

        let sample_rate = self.config.sample_rate;
        let start_time = self.current_time();
        let order = self.processing_order();

        let mut inputs: HashMap<StageHandle, Vec<StageHandle>> = HashMap::new();
        for (&from, targets) in &self.edges {
            for &to in targets {
                inputs.entry(to).or_default().push(from);
            }
        }

        let mut outputs: HashMap<StageHandle, AudioBuffer> = HashMap::with_capacity(order.len());
        for handle in order {
            let mut buffer = AudioBuffer::new(frames, channels);
            if let Some(sources) = inputs.get(&handle) {
                for source in sources {
                    if let Some(output) = outputs.get(source) {
                        buffer.mix_from(output, 1.0);
                    }
                }
            }

            match self.stages.get_mut(&handle) {
                Some(StageKind::Capture(stream)) => match self.streams.get_mut(stream) {
                    Some(open) => open.source.fill(&mut buffer, sample_rate),
                    None => buffer.clear(),
                },
                Some(StageKind::Gain(param)) => {
                    param.process(&mut buffer, start_time, sample_rate as f64)
                }
                Some(StageKind::Analyzer(analyzer)) => analyzer.push(&buffer),
                Some(StageKind::Effect { processor, bypass }) => {
                    if !*bypass {
                        processor.process(&mut buffer);
                    }
                }
                Some(StageKind::Destination) | None => {}
            }
            outputs.insert(handle, buffer);
        }

        self.frames_rendered += frames as u64;
        outputs
            .remove(&self.destination)
            .unwrap_or_else(|| AudioBuffer::new(frames, channels))
    }

    /// Stage order for rendering (Kahn's algorithm)
    fn processing_order(&self) -> Vec<StageHandle> {
        let mut in_degree: BTreeMap<StageHandle, usize> =
            self.stages.keys().map(|&handle| (handle, 0)).collect();
        for targets in self.edges.values() {
            for target in targets {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<StageHandle> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&handle, _)| handle)
            .collect();
        let mut order = Vec::with_capacity(self.stages.len());

        while let Some(handle) = queue.pop_front() {
            order.push(handle);
            for target in self.edges.get(&handle).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*target);
                    }
                }
            }
        }
        order
    }

    /// Whether `to` can be reached from `from` along existing edges
    fn reaches(&self, from: StageHandle, to: StageHandle) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(handle) = stack.pop() {
            if handle == to {
                return true;
            }
            if seen.insert(handle) {
                stack.extend(self.edges.get(&handle).into_iter().flatten().copied());
            }
        }
        false
    }

    fn ensure_open(&self) -> Result<(), HostError> {
        match (self.opened, self.state) {
            (_, HostState::Closed) => Err(HostError::Closed),
            (false, _) => Err(HostError::Unavailable {
                reason: "host has not been opened".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn ensure_stage(&self, stage: StageHandle) -> Result<(), HostError> {
        if self.stages.contains_key(&stage) {
            Ok(())
        } else {
            Err(HostError::UnknownStage { stage })
        }
    }

    fn resolve_capture_device(&self, device_id: &str) -> Option<DeviceDescriptor> {
        if device_id == "default" {
            self.default_device(DeviceDirection::Capture)
        } else {
            self.find_device(device_id, DeviceDirection::Capture)
        }
    }
}

impl AudioHost for SoftwareHost {
    fn name(&self) -> &str {
        "software"
    }

    fn open(&mut self) -> Result<HostState, HostError> {
        if !self.available {
            return Err(HostError::Unavailable {
                reason: "no audio subsystem present".to_string(),
            });
        }
        if self.state == HostState::Closed {
            return Err(HostError::Closed);
        }
        self.opened = true;
        self.state = if self.config.start_suspended {
            HostState::Suspended
        } else {
            HostState::Running
        };
        info!(
            sample_rate = self.config.sample_rate,
            channels = self.config.channels,
            state = %self.state,
            "Software host opened"
        );
        Ok(self.state)
    }

    fn resume(&mut self) -> Result<(), HostError> {
        self.ensure_open()?;
        self.state = HostState::Running;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), HostError> {
        self.ensure_open()?;
        self.state = HostState::Suspended;
        Ok(())
    }

    fn close(&mut self) -> Result<(), HostError> {
        if self.state == HostState::Closed {
            return Ok(());
        }
        let destination = self.destination;
        self.stages.retain(|&handle, _| handle == destination);
        self.edges.clear();
        self.streams.clear();
        self.state = HostState::Closed;

        if self.fail_close {
            warn!("Software host reported a close failure");
            return Err(HostError::CloseFailed {
                reason: "device did not acknowledge close".to_string(),
            });
        }
        info!("Software host closed");
        Ok(())
    }

    fn state(&self) -> HostState {
        self.state
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.config.sample_rate.max(1) as f64
    }

    fn destination(&self) -> StageHandle {
        self.destination
    }

    fn create_stage(&mut self, spec: StageSpec) -> Result<StageHandle, HostError> {
        self.ensure_open()?;
        if let Some(budget) = self.stage_budget.as_mut() {
            if *budget == 0 {
                return Err(HostError::StageCreation {
                    reason: format!("no resources left for a {} stage", spec.label()),
                });
            }
            *budget -= 1;
        }

        let kind = match spec {
            StageSpec::Gain { initial } => StageKind::Gain(GainParam::new(initial)),
            StageSpec::Analyzer(config) => StageKind::Analyzer(SpectrumAnalyzer::new(config)),
            StageSpec::Capture(stream) => {
                if !self.streams.contains_key(&stream) {
                    return Err(HostError::UnknownStream { stream });
                }
                StageKind::Capture(stream)
            }
            StageSpec::Effect { kind, parameters } => StageKind::Effect {
                processor: build_processor(kind, &parameters, self.config.sample_rate),
                bypass: false,
            },
        };

        let handle = StageHandle::new(self.next_id);
        self.next_id += 1;
        debug!(stage = %handle, kind = kind.label(), "Stage created");
        self.stages.insert(handle, kind);
        Ok(handle)
    }

    fn release_stage(&mut self, stage: StageHandle) -> Result<(), HostError> {
        if stage == self.destination {
            return Err(HostError::HostOwned { stage });
        }
        self.ensure_stage(stage)?;
        self.stages.remove(&stage);
        self.edges.remove(&stage);
        for targets in self.edges.values_mut() {
            targets.retain(|&t| t != stage);
        }
        debug!(stage = %stage, "Stage released");
        Ok(())
    }

    fn connect(&mut self, from: StageHandle, to: StageHandle) -> Result<(), HostError> {
        self.ensure_open()?;
        self.ensure_stage(from)?;
        self.ensure_stage(to)?;

        let invalid = |reason: &str| HostError::InvalidConnection {
            from,
            to,
            reason: reason.to_string(),
        };
        if self.faulted_edges.contains(&(from, to)) {
            return Err(invalid("edge is faulted"));
        }
        if from == self.destination {
            return Err(invalid("the destination has no outputs"));
        }
        if matches!(self.stages.get(&to), Some(StageKind::Capture(_))) {
            return Err(invalid("capture stages take no input"));
        }
        if from == to || self.reaches(to, from) {
            return Err(invalid("connection would create a cycle"));
        }

        let targets = self.edges.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
        Ok(())
    }

    fn disconnect(&mut self, from: StageHandle, to: StageHandle) -> Result<(), HostError> {
        self.ensure_stage(from)?;
        if self.faulted_edges.contains(&(from, to)) {
            return Err(HostError::InvalidConnection {
                from,
                to,
                reason: "edge is faulted".to_string(),
            });
        }
        if let Some(targets) = self.edges.get_mut(&from) {
            targets.retain(|&t| t != to);
        }
        Ok(())
    }

    fn disconnect_all(&mut self, from: StageHandle) -> Result<(), HostError> {
        self.ensure_stage(from)?;
        self.edges.remove(&from);
        Ok(())
    }

    fn connections(&self, from: StageHandle) -> Vec<StageHandle> {
        self.edges.get(&from).cloned().unwrap_or_default()
    }

    fn schedule_gain(
        &mut self,
        stage: StageHandle,
        gain: f32,
        at_time: f64,
    ) -> Result<(), HostError> {
        self.ensure_open()?;
        match self.stages.get_mut(&stage) {
            Some(StageKind::Gain(param)) if gain.is_finite() => {
                param.set_value_at_time(gain, at_time);
                Ok(())
            }
            Some(_) => Err(HostError::Parameter {
                stage,
                name: "gain".to_string(),
            }),
            None => Err(HostError::UnknownStage { stage }),
        }
    }

    fn set_stage_parameter(
        &mut self,
        stage: StageHandle,
        name: &str,
        value: f32,
    ) -> Result<(), HostError> {
        match self.stages.get_mut(&stage) {
            Some(StageKind::Effect { processor, .. }) => {
                let spec = processor
                    .kind()
                    .param_spec(name)
                    .ok_or_else(|| HostError::Parameter {
                        stage,
                        name: name.to_string(),
                    })?;
                processor.set_parameter(spec.name, spec.clamp(value));
                Ok(())
            }
            Some(_) => Err(HostError::Parameter {
                stage,
                name: name.to_string(),
            }),
            None => Err(HostError::UnknownStage { stage }),
        }
    }

    fn set_stage_bypass(&mut self, stage: StageHandle, bypass: bool) -> Result<(), HostError> {
        match self.stages.get_mut(&stage) {
            Some(StageKind::Effect {
                processor,
                bypass: current,
            }) => {
                if *current != bypass {
                    processor.reset();
                }
                *current = bypass;
                Ok(())
            }
            Some(_) => Err(HostError::Parameter {
                stage,
                name: "bypass".to_string(),
            }),
            None => Err(HostError::UnknownStage { stage }),
        }
    }

    fn open_capture(&mut self, device_id: &str) -> Result<CaptureStream, HostError> {
        self.ensure_open()?;
        let descriptor =
            self.resolve_capture_device(device_id)
                .ok_or_else(|| HostError::DeviceUnavailable {
                    device_id: device_id.to_string(),
                })?;
        if self.denied.contains(device_id) || self.denied.contains(&descriptor.id) {
            return Err(HostError::PermissionDenied {
                device_id: device_id.to_string(),
            });
        }
        let source = self
            .sources
            .get(&descriptor.id)
            .cloned()
            .ok_or_else(|| HostError::DeviceUnavailable {
                device_id: descriptor.id.clone(),
            })?;

        let id = StreamId::new(self.next_id);
        self.next_id += 1;
        self.streams.insert(
            id,
            OpenStream {
                device_id: descriptor.id.clone(),
                source,
            },
        );
        debug!(stream = %id, device = %descriptor.id, "Capture stream opened");
        Ok(CaptureStream {
            id,
            device_id: descriptor.id,
            channels: descriptor.channels,
        })
    }

    fn stop_capture(&mut self, stream: &CaptureStream) -> Result<(), HostError> {
        if self.streams.remove(&stream.id).is_none() {
            return Err(HostError::UnknownStream { stream: stream.id });
        }
        debug!(stream = %stream.id, "Capture stream stopped");
        Ok(())
    }

    fn analyzer_levels(&self, stage: StageHandle) -> Option<AnalyzerReading> {
        match self.stages.get(&stage) {
            Some(StageKind::Analyzer(analyzer)) => Some(analyzer.reading()),
            _ => None,
        }
    }
}

impl DeviceCatalog for SoftwareHost {
    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.clone()
    }
}
