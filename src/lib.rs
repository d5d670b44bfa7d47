// Copyright (c) 2025 Monmouth Contributors
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Test harness that keeps an execution node and a beacon-node mock in lockstep.
//!
//! Every test runs against the same pair of backends. The [`SnapshotCoordinator`]
//! snapshots and reverts both of them under a single token so a test can start
//! from the baseline state and leave nothing behind for the next one.

#![warn(missing_debug_implementations, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

pub mod backends;
pub mod config;
pub mod error;
pub mod harness;
pub mod metrics;
pub mod snapshot;

pub use backends::{
    Backend, BackendError, BeaconMockManager, ConsensusAdmin, ExecutionAdmin, HardhatAdmin,
};
pub use config::{BeaconMockConfig, HarnessConfig};
pub use error::{ErrorSeverity, SnapshotError};
pub use harness::TestHarness;
pub use metrics::SnapshotMetrics;
pub use snapshot::{CoordinatorState, OrphanedSnapshot, SnapshotCoordinator, SnapshotId};
