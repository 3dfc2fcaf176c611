mod translate;
mod window;

pub use translate::translate;
pub use window::EventWindow;

use serde::{Deserialize, Serialize};

/// One human readable progress line of a deployment.
///
/// `index` is assigned once by the events cache and never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub index: u64,
    pub description: String,
}
