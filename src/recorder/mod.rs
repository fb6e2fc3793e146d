//! Recording handles
//!
//! The capture layer hands a finished recording over as a [`Recording`]:
//! payload, declared media type and the element that plays it back.

pub mod state;

pub use state::{PlaybackSnapshot, Recording};
