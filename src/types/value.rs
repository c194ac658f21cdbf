// ABOUTME: Typed operation argument for table keys and action parameters.
// ABOUTME: Interface values resolve to numeric port IDs before any backend call.

/// One match key or action parameter.
///
/// Guessing whether a string names a network interface by probing the port
/// mapping lets a typo on an interface name silently pass through as a
/// literal. Here the caller states the intent: a
/// [`Value::Interface`] that is missing from the switch's mapping
/// fails fast with `UnknownInterfaceError`, while literals (IP prefixes, MAC
/// addresses, range or ternary match specs) are forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Passed to the backend as-is.
    Literal(String),
    /// Rendered in decimal.
    Number(i64),
    /// A network interface name (e.g. `s1-eth3`), resolved to its port ID.
    Interface(String),
}

impl Value {
    pub fn literal(value: impl Into<String>) -> Self {
        Value::Literal(value.into())
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Value::Interface(name.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Literal(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Literal(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(i64::from(value))
    }
}
