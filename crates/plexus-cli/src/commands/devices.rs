//! Audio device listing command.

use plexus_io::{default_output_device, list_devices};

pub fn run() -> anyhow::Result<()> {
    let devices = list_devices()?;
    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    let default_name = default_output_device().map(|d| d.name);

    println!("Output Devices:");
    let outputs: Vec<_> = devices.iter().filter(|d| d.is_output).collect();
    for (idx, device) in outputs.iter().enumerate() {
        let marker = if default_name.as_deref() == Some(device.name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!(
            "  [{}] {} ({} Hz, {} ch){}",
            idx, device.name, device.default_sample_rate, device.output_channels, marker
        );
    }

    let inputs = devices.iter().filter(|d| d.is_input).count();
    println!("\nTotal: {} output(s), {} input(s)", outputs.len(), inputs);
    println!("\nTip: pick a device by partial name with `plexus play GRAPH --device \"USB\"`");
    Ok(())
}
