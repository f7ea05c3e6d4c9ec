//! External tools: user-defined shell commands organised in a directory tree,
//! shown as a menu filtered by the active document, bound to keyboard
//! shortcuts kept in sync with the host accelerator table, and run with their
//! output captured into a panel.

pub mod accel;
pub mod capture;
pub mod config;
pub mod context;
pub mod error;
pub mod library;
pub mod menu;
pub mod output;
pub mod window;

pub use error::ExtoolsError;
