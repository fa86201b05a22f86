//! Edge content types.
//!
//! Content types identify what a frame carries. Data frames flow on a
//! logical connection; the rest are state and control frames exchanged with
//! the edge router.

/// Application payload for one logical connection.
pub const DATA: u32 = 0x4500;

/// The logical connection was closed by the sender.
pub const STATE_CLOSED: u32 = 0x4502;

/// Request to stop hosting a service.
pub const UNBIND: u32 = 0x4504;

/// Cost and/or precedence change for a hosted service.
pub const UPDATE_BIND: u32 = 0x4505;

/// Returns a human-readable name for a content type.
pub fn content_type_name(content_type: u32) -> &'static str {
    match content_type {
        DATA => "Data",
        STATE_CLOSED => "StateClosed",
        UNBIND => "Unbind",
        UPDATE_BIND => "UpdateBind",
        _ => "Unknown",
    }
}
