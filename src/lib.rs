/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod config;
mod dispatcher;
mod error;
mod handle;
mod id;
mod message;
mod pending;
mod pool;
mod query;
mod runtime;
mod stats;
mod util;

pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{CreateError, DispatchError};
pub use handle::{DispatcherHandle, QueryJob};
pub use id::{IdSource, SecureIdSource};
pub use query::{QueryOutcome, QueryReply};
pub use stats::{DispatcherSnapshot, DispatcherStats};
pub use util::AddressFamily;
