/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/telemetry.rs
*
* Initializes `tracing` for the binary. Logs go to stderr so that stdout
* carries nothing but the JSON report.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::cli::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("[cert_deployer] Failed to initialize logging.");
    }
}
