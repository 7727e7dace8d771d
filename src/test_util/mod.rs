//! This module contains utilities for testing code that uses a link session without a real
//!  radio. They are used for testing the crate itself, but they are also exported for
//!  application testing, so they are part of the crate's regular (non-#[cfg(test)]) code.

pub mod fake_driver;
pub mod recording_callbacks;
