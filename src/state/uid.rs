//! Snowflake ID generation.

use cloudlink_proto::ClientId;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch (2010-11-04T01:42:54.657Z), the conventional snowflake zero.
const EPOCH_MS: u64 = 1_288_834_974_657;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// Generates per-process unique, monotonic snowflake ids:
/// 41 bits of milliseconds since [`EPOCH_MS`], 10 bits of node id,
/// 12 bits of per-millisecond sequence.
pub struct SnowflakeGenerator {
    node: u64,
    state: Mutex<GeneratorState>,
}

struct GeneratorState {
    last_ms: u64,
    sequence: u64,
}

impl SnowflakeGenerator {
    /// Create a generator for the given node id (truncated to 10 bits).
    pub fn new(node: u16) -> Self {
        Self {
            node: u64::from(node) & ((1 << NODE_BITS) - 1),
            state: Mutex::new(GeneratorState {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    /// Generate the next id. Monotonic even if the wall clock steps
    /// backwards: the generator never reuses an earlier millisecond.
    pub fn next(&self) -> ClientId {
        let mut state = self.state.lock().expect("snowflake state poisoned");

        let mut now = current_ms().max(state.last_ms);
        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond; move to the next.
                now += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        let raw = (now.saturating_sub(EPOCH_MS) << (NODE_BITS + SEQUENCE_BITS))
            | (self.node << SEQUENCE_BITS)
            | state.sequence;
        ClientId(raw)
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_monotonic() {
        let generator = SnowflakeGenerator::new(1);
        let mut seen = HashSet::new();
        let mut last = ClientId(0);
        for _ in 0..10_000 {
            let id = generator.next();
            assert!(id > last, "id {} not greater than {}", id, last);
            assert!(seen.insert(id));
            last = id;
        }
    }

    #[test]
    fn node_id_is_embedded() {
        let generator = SnowflakeGenerator::new(5);
        let id = generator.next();
        assert_eq!((id.0 >> SEQUENCE_BITS) & ((1 << NODE_BITS) - 1), 5);
    }
}
