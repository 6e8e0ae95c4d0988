//! Device report: lists the catalog, benchmarks every device and shows
//! which one the dispatcher would select.
//!
//! ```text
//! RUST_LOG=debug cargo run --example device_report
//! ```

use pixmorph_kernels::{AccelConfig, BatteryRunner, DeviceCatalog, KernelDispatcher, WgpuCatalog};

fn main() {
    env_logger::init();

    let config = AccelConfig::from_env();
    println!("=== Device Catalog ===");
    let devices = WgpuCatalog::new(config.backends).enumerate();
    for (i, device) in devices.iter().enumerate() {
        println!("  {}. {} (driver {:?})", i + 1, device.name(), device.driver_version());
    }

    println!("\n=== Benchmark Battery ===");
    let runner = BatteryRunner::new(&config);
    for device in &devices {
        let report = runner.run_detailed(device);
        println!("  {}", report.device);
        for (name, secs) in &report.timings {
            match secs {
                Some(secs) => println!("    {:<16} {:>10.3} ms", name, secs * 1e3),
                None => println!("    {:<16} {:>10}", name, "failed"),
            }
        }
        println!("    {:<16} {:>10.6}", "time cost", report.time_cost);
    }

    println!("\n=== Selection ===");
    println!("  score file: {}", config.score_path().display());
    let dispatcher = KernelDispatcher::new(config);
    match dispatcher.backend().ensure_selected() {
        Ok(selection) => {
            println!(
                "  selected {}. {}{}",
                selection.index + 1,
                selection.device(),
                if selection.overridden { " (override)" } else { "" }
            );
            match dispatcher.active_backend() {
                Ok(name) => println!("  operations run on: {}", name),
                Err(e) => println!("  cannot open the selected device: {}", e),
            }
        }
        Err(e) => println!("  selection failed: {}", e),
    }
}
