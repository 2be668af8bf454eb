// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod alerts;
pub mod event_bus;
pub mod in_process;
pub mod metrics;
pub mod readings;
pub mod sinks;

pub use alerts::{LogAlertChannel, RecordingAlertChannel, WebhookAlertChannel};
pub use event_bus::EventBus;
pub use in_process::InProcessNetwork;
pub use readings::ProviderRegistry;
pub use sinks::{InMemorySink, SinkRegistry};
