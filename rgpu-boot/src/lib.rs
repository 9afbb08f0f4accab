//! Vulkan bootstrap: capability negotiation, physical device selection and
//! logical device creation, built on [`ash`].
//!
//! > **Personal project.** This crate is not intended for general use
//! > and makes no API stability guarantees.
//!
//! # Pipeline
//!
//! ```text
//! create_instance ─▶ setup_debug_channel ─▶ create_surface
//!        │                                        │
//!        ▼                                        ▼
//!   negotiate (exts, layers)       select_physical_device
//!                                   ├── resolve_queue_families
//!                                   └── SelectionCriteria::score
//!                                                 │
//!                                                 ▼
//!                                      create_logical_device
//! ```
//!
//! Every stage writes the handles it creates into a single
//! [`RuntimeState`](state::RuntimeState) owned by the caller, and
//! [`cleanup`](state::cleanup) tears them down in reverse order.
//!
//! All driver calls go through the [`Driver`](driver::Driver) trait.
//! [`AshDriver`](ash_driver::AshDriver) is the real implementation.
//!
//! # Naming conventions
//!
//! | prefix  | meaning                                   |
//! |---------|-------------------------------------------|
//! | `raw_*` | accepts or returns a raw `ash::vk` handle |
//! | `ash_*` | returns the `ash` wrapper object          |

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod ash_driver;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod debug;
pub mod device;
pub mod driver;
pub mod instance;
pub mod log;
pub mod negotiate;
pub mod queue;
pub mod select;
pub mod state;
pub mod surface;

#[cfg(test)]
pub(crate) mod testing;

pub use ash;
pub use bootstrap::{BootstrapError, ErrorCategory, init};
pub use config::BootstrapConfig;
pub use raw_window_handle::HandleError as RwhHandleError;
pub use state::{RuntimeState, cleanup};
