// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod api;

pub use api::{directory_router, leaf_router, relay_router, root_router, ApiError};
