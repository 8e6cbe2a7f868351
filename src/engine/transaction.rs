//! All-or-nothing stage wiring
//!
//! Node and route creation allocate several stages and edges. A
//! [`StageTransaction`] records each step; dropping it without
//! [`commit`](StageTransaction::commit) undoes them in reverse order.

use tracing::warn;

use crate::host::{AudioHost, CaptureStream, HostError, StageHandle, StageSpec};

pub(crate) struct StageTransaction<'a, H: AudioHost> {
    host: &'a mut H,
    stages: Vec<StageHandle>,
    edges: Vec<(StageHandle, StageHandle)>,
    stream: Option<CaptureStream>,
    committed: bool,
}

impl<'a, H: AudioHost> StageTransaction<'a, H> {
    pub fn new(host: &'a mut H) -> Self {
        Self {
            host,
            stages: Vec::new(),
            edges: Vec::new(),
            stream: None,
            committed: false,
        }
    }

    pub fn open_capture(&mut self, device_id: &str) -> Result<CaptureStream, HostError> {
        let stream = self.host.open_capture(device_id)?;
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    pub fn create(&mut self, spec: StageSpec) -> Result<StageHandle, HostError> {
        let stage = self.host.create_stage(spec)?;
        self.stages.push(stage);
        Ok(stage)
    }

    pub fn connect(&mut self, from: StageHandle, to: StageHandle) -> Result<(), HostError> {
        self.host.connect(from, to)?;
        self.edges.push((from, to));
        Ok(())
    }

    /// Keep everything created so far
    pub fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        for (from, to) in self.edges.drain(..).rev() {
            if let Err(err) = self.host.disconnect(from, to) {
                warn!(%from, %to, error = %err, "Rollback could not remove edge");
            }
        }
        for stage in self.stages.drain(..).rev() {
            if let Err(err) = self.host.release_stage(stage) {
                warn!(%stage, error = %err, "Rollback could not release stage");
            }
        }
        if let Some(stream) = self.stream.take() {
            if let Err(err) = self.host.stop_capture(&stream) {
                warn!(stream = %stream.id, error = %err, "Rollback could not stop capture");
            }
        }
    }
}

impl<H: AudioHost> Drop for StageTransaction<'_, H> {
    fn drop(&mut self) {
        let touched = !self.stages.is_empty() || !self.edges.is_empty() || self.stream.is_some();
        if !self.committed && touched {
            warn!(
                stages = self.stages.len(),
                edges = self.edges.len(),
                "Rolling back partially built stages"
            );
            self.rollback();
        }
    }
}
