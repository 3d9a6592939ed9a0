use serde::{Deserialize, Serialize};

/// How the in-memory bus hands a Nickel to its consumers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Consumers receive a copy of the published value.
    #[default]
    Local,
    /// Every delivery goes through encode/decode with the registered codec,
    /// as it would between cluster nodes.
    Clustered,
}

/// In-memory bus configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub delivery: Delivery,
}

impl BusConfig {
    pub fn clustered() -> Self {
        Self {
            delivery: Delivery::Clustered,
        }
    }
}
