//! Effect Chain Splicer
//!
//! A route's signal path is `head -> chain[0] -> ... -> chain[n-1] -> tail`,
//! where `head` is the route gain stage and `tail` is the target node's gain
//! stage. Splicing a unit in or out always relinks its neighbours so the
//! path never has a gap.

use tracing::warn;

use crate::host::{AudioHost, HostError, StageHandle};

/// Fixed ends of a route's effect chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChainEnds {
    pub head: StageHandle,
    pub tail: StageHandle,
}

impl ChainEnds {
    /// Neighbours of the slot at `index`, treating `index` as an insertion
    /// point into `chain`
    fn around_slot(&self, chain: &[StageHandle], index: usize) -> (StageHandle, StageHandle) {
        let prev = match index {
            0 => self.head,
            i => chain[i - 1],
        };
        let next = chain.get(index).copied().unwrap_or(self.tail);
        (prev, next)
    }
}

/// Insert `stage` into the chain before position `index`
///
/// `chain` is the chain before insertion. An index past the end appends.
/// On failure the original link is restored.
pub(crate) fn splice_in<H: AudioHost>(
    host: &mut H,
    ends: ChainEnds,
    chain: &[StageHandle],
    index: usize,
    stage: StageHandle,
) -> Result<(), HostError> {
    let index = index.min(chain.len());
    let (prev, next) = ends.around_slot(chain, index);

    host.disconnect(prev, next)?;
    if let Err(err) = host.connect(prev, stage) {
        relink(host, prev, next);
        return Err(err);
    }
    if let Err(err) = host.connect(stage, next) {
        unlink(host, prev, stage);
        relink(host, prev, next);
        return Err(err);
    }
    Ok(())
}

/// Remove the unit at `index` from the chain and link its neighbours
///
/// The unit's stage is left disconnected but not released.
pub(crate) fn splice_out<H: AudioHost>(
    host: &mut H,
    ends: ChainEnds,
    chain: &[StageHandle],
    index: usize,
) -> Result<(), HostError> {
    let stage = chain[index];
    let prev = match index {
        0 => ends.head,
        i => chain[i - 1],
    };
    let next = chain.get(index + 1).copied().unwrap_or(ends.tail);

    host.disconnect(prev, stage)?;
    if let Err(err) = host.disconnect(stage, next) {
        relink(host, prev, stage);
        return Err(err);
    }
    if let Err(err) = host.connect(prev, next) {
        relink(host, prev, stage);
        relink(host, stage, next);
        return Err(err);
    }
    Ok(())
}

/// Restore an edge while unwinding a failed splice
fn relink<H: AudioHost>(host: &mut H, from: StageHandle, to: StageHandle) {
    if let Err(err) = host.connect(from, to) {
        warn!(%from, %to, error = %err, "Splice rollback could not restore edge");
    }
}

/// Remove an edge while unwinding a failed splice
fn unlink<H: AudioHost>(host: &mut H, from: StageHandle, to: StageHandle) {
    if let Err(err) = host.disconnect(from, to) {
        warn!(%from, %to, error = %err, "Splice rollback could not remove edge");
    }
}

/// Walk the host's actual edges from head to tail
///
/// Stops at the tail, at a stage with no outgoing edge, or after
/// `max_len` stages.
pub(crate) fn signal_path<H: AudioHost>(
    host: &H,
    ends: ChainEnds,
    max_len: usize,
) -> Vec<StageHandle> {
    let mut path = vec![ends.head];
    let mut current = ends.head;
    while path.len() < max_len {
        let outputs = host.connections(current);
        let next = if outputs.contains(&ends.tail) {
            ends.tail
        } else {
            match outputs.first() {
                Some(&stage) => stage,
                None => break,
            }
        };
        path.push(next);
        if next == ends.tail {
            break;
        }
        current = next;
    }
    path
}
