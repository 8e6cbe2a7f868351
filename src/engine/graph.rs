//! Routing Graph
//!
//! Directed edges from input nodes to output nodes. Each [`Route`] owns its
//! gain stage and an ordered chain of [`EffectUnit`]s; endpoints are held by
//! id only.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use super::registry::NodeId;
use super::volume::Volume;
use crate::dsp::{EffectKind, EffectParameters};
use crate::host::StageHandle;

// ============================================================================
// Identities
// ============================================================================

/// Route id: the ordered `(source, target)` node pair
///
/// Displayed as `<source>-<target>`, e.g. `input-mic-output-spk`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId {
    source: NodeId,
    target: NodeId,
}

impl RouteId {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self { source, target }
    }

    pub fn source(&self) -> &NodeId {
        &self.source
    }

    pub fn target(&self) -> &NodeId {
        &self.target
    }

    /// Whether either endpoint is the given node
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.target)
    }
}

impl Serialize for RouteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Effect unit id, unique within its route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(Uuid);

impl EffectId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EffectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Effect Units and Routes
// ============================================================================

/// One effect in a route's chain
#[derive(Debug, Clone)]
pub struct EffectUnit {
    id: EffectId,
    kind: EffectKind,
    pub(crate) enabled: bool,
    pub(crate) parameters: EffectParameters,
    stage: StageHandle,
}

impl EffectUnit {
    pub(crate) fn new(kind: EffectKind, parameters: EffectParameters, stage: StageHandle) -> Self {
        Self {
            id: EffectId::generate(),
            kind,
            enabled: true,
            parameters,
            stage,
        }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Kind is fixed at creation
    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn parameters(&self) -> &EffectParameters {
        &self.parameters
    }

    pub fn stage(&self) -> StageHandle {
        self.stage
    }
}

/// Serializable summary of an effect unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectInfo {
    pub id: EffectId,
    pub kind: EffectKind,
    pub enabled: bool,
    pub parameters: EffectParameters,
}

impl From<&EffectUnit> for EffectInfo {
    fn from(unit: &EffectUnit) -> Self {
        Self {
            id: unit.id,
            kind: unit.kind,
            enabled: unit.enabled,
            parameters: unit.parameters.clone(),
        }
    }
}

/// A connection from one input node to one output node
#[derive(Debug, Clone)]
pub struct Route {
    id: RouteId,
    pub(crate) active: bool,
    pub(crate) volume: Volume,
    gain: StageHandle,
    pub(crate) effects: Vec<EffectUnit>,
}

impl Route {
    pub(crate) fn new(id: RouteId, volume: Volume, gain: StageHandle) -> Self {
        Self {
            id,
            active: true,
            volume,
            gain,
            effects: Vec::new(),
        }
    }

    pub fn id(&self) -> &RouteId {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn gain_stage(&self) -> StageHandle {
        self.gain
    }

    /// Effect chain in signal order
    pub fn effects(&self) -> &[EffectUnit] {
        &self.effects
    }

    pub fn effect(&self, id: &EffectId) -> Option<&EffectUnit> {
        self.effects.iter().find(|e| &e.id == id)
    }

    pub(crate) fn effect_index(&self, id: &EffectId) -> Option<usize> {
        self.effects.iter().position(|e| &e.id == id)
    }

    /// Stage handles of the chain, in order
    pub(crate) fn chain_stages(&self) -> Vec<StageHandle> {
        self.effects.iter().map(EffectUnit::stage).collect()
    }
}

/// Serializable summary of a route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInfo {
    pub id: RouteId,
    pub source: NodeId,
    pub target: NodeId,
    pub active: bool,
    pub volume: Volume,
    pub effects: Vec<EffectInfo>,
}

impl From<&Route> for RouteInfo {
    fn from(route: &Route) -> Self {
        Self {
            id: route.id.clone(),
            source: route.id.source.clone(),
            target: route.id.target.clone(),
            active: route.active,
            volume: route.volume,
            effects: route.effects.iter().map(EffectInfo::from).collect(),
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Default)]
pub struct RoutingGraph {
    routes: BTreeMap<RouteId, Route>,
}

impl RoutingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &RouteId) -> bool {
        self.routes.contains_key(id)
    }

    pub fn get(&self, id: &RouteId) -> Option<&Route> {
        self.routes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &RouteId) -> Option<&mut Route> {
        self.routes.get_mut(id)
    }

    pub(crate) fn insert(&mut self, route: Route) {
        self.routes.insert(route.id.clone(), route);
    }

    pub(crate) fn remove(&mut self, id: &RouteId) -> Option<Route> {
        self.routes.remove(id)
    }

    /// Ids of every route with the node as source or target
    pub fn routes_touching(&self, node: &NodeId) -> Vec<RouteId> {
        self.routes
            .keys()
            .filter(|id| id.touches(node))
            .cloned()
            .collect()
    }

    pub fn ids(&self) -> Vec<RouteId> {
        self.routes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
