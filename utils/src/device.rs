use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());

    let Some(target) = device_name else {
        return host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device"));
    };

    let input_devices = host.input_devices()?;
    for in_device in input_devices {
        if in_device.name().is_ok_and(|name| name == target) {
            return Ok(in_device);
        }
    }
    Err(anyhow::anyhow!("No input device named {:?}", target))
}

pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();

    let Some(target) = device_name else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No default output device"));
    };

    let output_devices = host.output_devices()?;
    for out_device in output_devices {
        if out_device.name().is_ok_and(|name| name == target) {
            return Ok(out_device);
        }
    }
    Err(anyhow::anyhow!("No output device named {:?}", target))
}

pub fn list_inputs() -> anyhow::Result<String> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for in_device in host.input_devices()? {
        let d_name = in_device.name()?;
        let d_cfg = in_device.default_input_config()?;
        let mut d = format!(
            " * {}({}ch, {}hz)",
            d_name,
            d_cfg.channels(),
            d_cfg.sample_rate().0
        );
        if Some(&d_name) == default_name.as_ref() {
            d.push_str(" [default]");
        }
        device_names.push(d);
    }
    Ok(device_names.join("\n"))
}
