//! VkStartup smoke test
//!
//! Initializes a Vulkan context with validation enabled. Without arguments
//! the context is headless. With `--window` a window is opened and given a
//! surface, swapchain, render pass and framebuffers; closing the window
//! exits.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vkstartup-test
//! cargo run -p vkstartup-test -- --window --width 1280 --height 720
//! cargo run -p vkstartup-test -- --window --exit-after-init
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod targets;
mod windowed;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vkstartup::{InitContextOptions, QueueFamily};

/// Start Vulkan the way an application would and report what was created.
#[derive(Debug, Parser)]
#[command(name = "vkstartup-test")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Open a window and create a swapchain for it
    #[arg(long)]
    window: bool,

    /// Initial window width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Close the window as soon as everything is created
    #[arg(long)]
    exit_after_init: bool,

    /// Disable validation layers
    #[arg(long)]
    no_validation: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.window {
        windowed::run(windowed::WindowConfig {
            width: cli.width,
            height: cli.height,
            validation: !cli.no_validation,
            exit_after_init: cli.exit_after_init,
        })
    } else {
        run_headless(!cli.no_validation)
    }
}

fn run_headless(validation: bool) -> anyhow::Result<()> {
    let context = InitContextOptions::new()
        .app_name("VkStartup Test")
        .validation(validation)
        .build()?;

    info!("GPU: {}", context.physical_device_info().summary());
    info!(
        "Validation: {}, layers: {:?}",
        context.validation_enabled(),
        context.layers()
    );
    for family in [QueueFamily::Graphics, QueueFamily::Compute, QueueFamily::Transfer] {
        if let Some(queue) = context.queue(family) {
            info!("{family:?} queue family {}", queue.family_index);
        }
    }

    context.wait_idle()?;
    info!("Headless start-up succeeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn headless_by_default() {
        let cli = Cli::try_parse_from(["vkstartup-test"]).unwrap();
        assert!(!cli.window);
        assert!(!cli.no_validation);
        assert_eq!((cli.width, cli.height), (1280, 720));
    }

    #[test]
    fn window_size_flags() {
        let cli = Cli::try_parse_from([
            "vkstartup-test",
            "--window",
            "--width",
            "640",
            "--height",
            "480",
            "--exit-after-init",
        ])
        .unwrap();
        assert!(cli.window);
        assert!(cli.exit_after_init);
        assert_eq!((cli.width, cli.height), (640, 480));
    }
}
