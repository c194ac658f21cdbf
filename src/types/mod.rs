// ABOUTME: Shared value types for the bridge API.
// ABOUTME: SwitchName cache key and the typed operation argument Value.

mod switch_name;
mod value;

pub use switch_name::{SwitchName, SwitchNameError};
pub use value::Value;
