// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for video capture
//!
//! # Modules
//!
//! - [`camera`]: Capture devices, sessions and discovery

pub mod camera;
