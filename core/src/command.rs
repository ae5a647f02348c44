//! Run control commands for the JSON-line front end.

use serde::{Deserialize, Serialize};

/// Control commands a front end may send to a running engine, one JSON
/// object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunCommand {
    GetState,
    Tick { count: u64 },
    Pause,
    Resume,
    Stop,
    Quit,
}
