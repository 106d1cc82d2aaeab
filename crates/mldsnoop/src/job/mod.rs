// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background work scheduling.

mod queue;
mod semaphore;

pub use queue::{Job, JobQueue, JobState};
pub use semaphore::Semaphore;
