//! Video4Linux frame capture
//!
//! This crate opens a V4L2 capture device, negotiates a single-planar format and fetches frames
//! using one of three i/o methods:
//!
//! * read(2) into a host buffer
//! * driver buffers mapped into our address space
//! * host buffers handed to the driver by address (user pointers)
//!
//! [`Session`] drives the whole lifecycle: connect, start, the per-frame poll loop, stop and
//! disconnect. Frames are passed to a [`Sink`] raw, in the format the driver delivers them.
//!
//! The kernel interface sits behind the [`Device`] trait, so everything above it can run against
//! a simulated device as well.

pub mod v4l2;

pub mod buffer;
pub mod config;
pub mod device;
pub mod io;
pub mod memory;
pub mod pselect;
pub mod session;

mod capability;
pub use capability::Capabilities;
pub use capability::Flags as CapabilityFlags;

mod error;
pub use error::{Error, Result};

mod field;
pub use field::FieldOrder;

mod format;
pub use format::Format;

mod fourcc;
pub use fourcc::FourCC;

mod timestamp;
pub use timestamp::Timestamp;

pub use config::Config;
pub use device::{Device, Open};
pub use session::{Frame, Session, Sink};
