// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run the upload server

use anyhow::{Context, Result};
use std::sync::Arc;

use homecare::config::Config;
use homecare::report::{CommandReportGenerator, CommandTranscriber};
use homecare::server::{self, AppState};

/// Run `serve`
pub fn run(bind: Option<String>) -> Result<()> {
    let config = Config::load();
    let mut server_config = config.server().clone();
    if bind.is_some() {
        server_config.bind = bind;
    }

    let state = AppState::new(
        Arc::new(CommandTranscriber::new(config.pipeline().transcribe_command())),
        Arc::new(CommandReportGenerator::new(config.pipeline().report_command())),
        server_config.allowed_extensions(),
    );

    eprintln!("homecare upload server listening on {}", server_config.bind());
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime
        .block_on(server::run(state, &server_config))
        .with_context(|| format!("Upload server failed on {}", server_config.bind()))
}
