use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use common::OrderId;

use crate::version::Version;

/// The persisted form of one order aggregate.
///
/// The store treats the aggregate state as an opaque JSON document;
/// the orchestrator owns its shape. The `version` is the optimistic
/// concurrency token checked on every save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    /// The order this record belongs to.
    pub order_id: OrderId,

    /// Version after the last accepted transition.
    pub version: Version,

    /// Serialized aggregate state.
    pub state: serde_json::Value,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Creates a record from a serializable aggregate state.
    pub fn from_state<T: Serialize>(
        order_id: OrderId,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            order_id,
            version: Version::initial(),
            state: serde_json::to_value(state)?,
            updated_at: Utc::now(),
        })
    }

    /// Deserializes the aggregate state.
    pub fn deserialize_state<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state.clone())
    }
}
