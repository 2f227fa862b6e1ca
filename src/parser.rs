// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Parsers for the VC-2 stream syntax.
//!
//! This module only recovers syntax elements from the bitstream - turning
//! them back into pictures is the job of the [crate::decoder] module.

pub mod dataunit;
pub mod picture;
pub mod sequence;
