// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use logforth::color::LevelColor;
use logforth::filter::EnvFilter;
use logforth::{Layout, append};

/// Default filter, overridden by `RUST_LOG`.
const DEFAULT_FILTER: &str = "unlsim=debug,info";

#[derive(Clone, Copy, Debug)]
struct MinimalLogforthLayout;

impl Layout for MinimalLogforthLayout {
    fn format(
        &self,
        record: &log::Record,
        _: &[Box<dyn logforth::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let colors = LevelColor::default();
        let level = colors.colorize_record_level(false, record.level());
        let message = record.args();
        Ok(format!("{level:>5} {message}").into_bytes())
    }
}

/// Installs the global logger, writing to stderr.
///
/// Per-combination reports are logged on `info`, scheduler internals on
/// `trace`.
pub fn enable_logforth() {
    let filter = EnvFilter::from_default_env_or(DEFAULT_FILTER);
    let to_append = append::Stderr::default().with_layout(MinimalLogforthLayout);
    logforth::builder()
        .dispatch(|d| d.filter(filter).append(to_append))
        .apply();
}

#[cfg(test)]
mod tests {
    use log::{Level, debug, error, info, log_enabled, trace, warn};

    use super::*;

    #[test]
    fn basic() {
        enable_logforth();

        // our own crate logs on debug, everything else on info
        assert!(log_enabled!(Level::Error));
        assert!(log_enabled!(Level::Warn));
        assert!(log_enabled!(Level::Info));
        assert!(log_enabled!(Level::Debug));
        assert!(!log_enabled!(Level::Trace));
        assert!(!log_enabled!(target: "rayon", Level::Debug));

        trace!("trace");
        debug!("debug");
        info!("info");
        warn!("warn");
        error!("error");
    }
}
