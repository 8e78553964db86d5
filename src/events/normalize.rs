//! Door method normalization
//!
//! Door firmware reports the unlock method with its own vocabulary. The
//! store only accepts the canonical names, so aliases are rewritten before
//! the event leaves the decoder.

/// Firmware alias -> canonical method name
pub const DOOR_METHOD_ALIASES: &[(&str, &str)] = &[("keypad", "pin"), ("app_button", "remote")];

/// Map a reported door method to its canonical name
///
/// Unknown methods pass through unchanged.
pub fn normalize_door_method(method: &str) -> &str {
    DOOR_METHOD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == method)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(method)
}
