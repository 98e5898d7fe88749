//! Provider handle types shared by every lane and the Model Router.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::LaneId;

/// What kind of backend a provider speaks for. Retrieval lanes and the LLM
/// tier share one registry so that health/rate-limit/cost
/// bookkeeping is centralized rather than duplicated per subsystem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Vector,
    Lexical,
    Graph,
    Web,
    News,
    Markets,
    Llm,
}

impl From<LaneId> for ProviderKind {
    fn from(lane: LaneId) -> Self {
        match lane {
            LaneId::Web => ProviderKind::Web,
            LaneId::Vector => ProviderKind::Vector,
            LaneId::Graph => ProviderKind::Graph,
            LaneId::News => ProviderKind::News,
            LaneId::Markets => ProviderKind::Markets,
        }
    }
}

/// Coarse health state tracked by the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Degraded,
    Down,
}

/// Relative price tier, consulted by the Model Router's cost policy and by
/// constraint-based filtering (`cost_ceiling`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CostClass {
    Free,
    Low,
    Standard,
    Premium,
}

impl fmt::Display for CostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostClass::Free => write!(f, "free"),
            CostClass::Low => write!(f, "low"),
            CostClass::Standard => write!(f, "standard"),
            CostClass::Premium => write!(f, "premium"),
        }
    }
}

/// A read-only snapshot of a provider's identity and policy flags. Cheap to
/// clone; passed by value once consulted so that lane workers never hold a
/// lock on the registry while making an outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHandle {
    pub id: String,
    pub kind: ProviderKind,
    pub keyed: bool,
    pub cost_class: CostClass,
}

impl ProviderHandle {
    pub fn new(id: impl Into<String>, kind: ProviderKind, keyed: bool, cost_class: CostClass) -> Self {
        Self {
            id: id.into(),
            kind,
            keyed,
            cost_class,
        }
    }
}
