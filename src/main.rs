use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cfg = loudmap::config::Config::parse();
    if cfg.list_devices {
        loudmap::audio::list_input_devices()?;
        return Ok(());
    }

    loudmap::app::run(cfg)
}
