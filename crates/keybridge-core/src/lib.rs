//! # keybridge-core
//!
//! Shared library for keybridge containing the key identifier tables, the
//! action model, the debounce gate and the Sony IRCC command catalog.
//!
//! This crate has zero dependencies on OS APIs, network sockets, or the
//! async runtime.  Everything here is deterministic and can be unit-tested
//! without a device attached.
//!
//! # Architecture overview
//!
//! keybridge turns key presses on a physical input device (a child's
//! keyboard, or an IR receiver that presents itself as a keyboard) into
//! effects: an audio clip, or a command sent to a TV.  The daemon crate owns
//! the I/O; this crate defines the vocabulary it uses:
//!
//! - **`keymap`** – Linux input-event key codes and their canonical names
//!   (`SPACE`, `A`, `VOLUMEUP`, ...).  Configuration files refer to keys by
//!   name; devices report them by code.
//!
//! - **`domain`** – Pure business rules: [`KeyEvent`], the [`Action`] enum
//!   and its configuration syntax, the immutable [`ActionTable`], the
//!   [`DebounceGate`], and the serializable [`BridgeStats`] snapshot.
//!
//! - **`ircc`** – The static scancode → IRCC command table and the SOAP
//!   envelope that carries a command to the TV.

pub mod domain;
pub mod ircc;
pub mod keymap;

pub use domain::action::{Action, ActionParseError, ActionTable, CommandId, DefaultAction};
pub use domain::debounce::{DebounceConfig, DebounceGate};
pub use domain::event::{KeyEvent, KeyId};
pub use domain::stats::{BridgeStats, BridgeStatus};
pub use ircc::{CatalogError, IrccCatalog, OutboundCommand};
pub use keymap::KeymapError;
