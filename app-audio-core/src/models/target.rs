use std::fmt;

use serde::{Deserialize, Serialize};

/// Exactly one capture source for one capture attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum CaptureTarget {
    Process(i32),
    Window(u64),
    Display(u32),
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process(pid) => write!(f, "process {}", pid),
            Self::Window(id) => write!(f, "window {}", id),
            Self::Display(id) => write!(f, "display {}", id),
        }
    }
}
