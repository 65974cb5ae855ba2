//! `dark-mode-daemon current`: what the system reports right now.

use anyhow::{Context, Result};
use clap::Args;
use tracing::level_filters::LevelFilter;

use dmd_core::ColorMode;
use dmd_daemon::appearance::mode_or_fallback;
use dmd_daemon::paths::base_dir_from_env;
use dmd_daemon::{init_tracing, load_config, native_appearance, watch_blocking, LogTarget};

#[derive(Args, Debug)]
pub struct CurrentArgs {
    /// Print only `light` or `dark`.
    #[arg(long)]
    pub plain: bool,

    /// Keep running and print the mode again whenever it changes.
    #[arg(long)]
    pub watch: bool,
}

impl CurrentArgs {
    pub fn run(self) -> Result<()> {
        init_tracing(LevelFilter::WARN, LogTarget::Stderr);
        let plain = self.plain;

        if self.watch {
            return watch_blocking(move |mode| println!("{}", render(mode, plain)))
                .context("failed to watch appearance changes");
        }

        let config = load_config(base_dir_from_env().as_deref());
        let mode = mode_or_fallback(native_appearance().as_ref(), config.fallback_mode);
        println!("{}", render(mode, plain));
        Ok(())
    }
}

fn render(mode: ColorMode, plain: bool) -> String {
    if plain {
        mode.to_string()
    } else {
        format!("{} {mode}", mode.emoji())
    }
}
