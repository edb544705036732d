use serde::{Deserialize, Serialize};

/// Read position on one backend partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub partition: String,
    pub offset: String,
}

/// Advance the cursor for the matching partition to the freshly seen one.
pub fn advance_cursors(cursors: &mut [Cursor], seen: &Cursor) {
    for cursor in cursors {
        if cursor.partition == seen.partition {
            cursor.offset = seen.offset.clone();
        }
    }
}

/// One synthetic probe event on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeEvent {
    pub value: u64,
    /// Per-connector UUID so parallel monitor instances sharing a topic
    /// ignore each other's probes.
    pub instance_id: String,
    /// Random payload simulating realistic message size.
    pub filler: String,
}

/// One batch from a poll or streaming read.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBatch {
    pub cursor: Cursor,
    #[serde(default)]
    pub events: Vec<ProbeEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionInfo {
    pub partition: String,
    pub newest_available_offset: String,
}

/// Multi-step backend bootstrap, driven by completion of each async step.
/// A transient failure retries the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    CheckingExists,
    Creating,
    FetchingCursors,
    StartingReceivers,
    Ready,
}
