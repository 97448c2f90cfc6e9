//! Pool state serialization for the backing store

use selection_types::PoolState;

/// Converts pool state to and from stored bytes
///
/// Implementations must round-trip exactly: claim ids, token sets, amounts
/// and identifiers all survive `deserialize(serialize(state))`.
pub trait PoolStateSerializer: Send + Sync {
    fn serialize(&self, state: &PoolState) -> Result<Vec<u8>, String>;
    fn deserialize(&self, bytes: &[u8]) -> Result<PoolState, String>;
}

/// Compact binary encoding via bincode
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodePoolStateSerializer;

impl PoolStateSerializer for BincodePoolStateSerializer {
    fn serialize(&self, state: &PoolState) -> Result<Vec<u8>, String> {
        bincode::serialize(state).map_err(|e| e.to_string())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<PoolState, String> {
        bincode::deserialize(bytes).map_err(|e| e.to_string())
    }
}
