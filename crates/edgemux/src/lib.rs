//! Client-side edge connection layer for overlay networks.
//!
//! edgemux multiplexes many logical connections over each persistent router
//! connection and presents redundant per-router listeners as one fail-over
//! listener.
//!
//! # Crate Structure
//!
//! - [`frame`]: Edge message model, wire codec and sequence numbers
//! - [`transport`]: Physical router connection with prioritized, confirmed sends
//! - [`edge`]: Message mux, message channels, listeners (behind `edge` feature)
//! - [`logging`]: `tracing-subscriber` setup (behind `logging` feature)

/// Re-export frame types.
pub mod frame {
    pub use edgemux_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use edgemux_transport::*;
}

/// Re-export edge types (requires `edge` feature).
#[cfg(feature = "edge")]
pub mod edge {
    pub use edgemux_edge::*;
}

#[cfg(feature = "logging")]
pub mod logging;
