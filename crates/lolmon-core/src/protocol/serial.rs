//! Serial port handling
//!
//! Discovery and opening of the USB-serial adapter wired to the monitor's
//! console UART.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::ProtocolError;

/// An available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path, e.g. "/dev/ttyUSB0" or "COM3"
    pub name: String,
    /// USB vendor and product ID, for USB adapters
    pub usb_id: Option<(u16, u16)>,
    /// Product string reported by the adapter
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            usb_id: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                usb_id: Some((usb.vid, usb.pid)),
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key putting ttyUSB* adapters first, then ttyACM*, then the rest,
/// numerically within each group.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyUSB"), (1, "ttyACM")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (2, 0, basename.to_string())
}

/// List serial ports the monitor could be attached to
pub fn list_ports() -> Vec<PortInfo> {
    let mut found: BTreeMap<String, PortInfo> = BTreeMap::new();
    match serialport::available_ports() {
        Ok(ports) => {
            for info in ports {
                let port = PortInfo::from(info);
                found.entry(port.name.clone()).or_insert(port);
            }
        }
        Err(e) => warn!("serial port enumeration failed: {}", e),
    }

    // udev-less systems do not report adapters through the API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = std::fs::read_dir("/dev") {
        for entry in entries.flatten() {
            let fname = entry.file_name();
            let Some(fname) = fname.to_str() else {
                continue;
            };
            if fname.starts_with("ttyUSB") || fname.starts_with("ttyACM") {
                let full = format!("/dev/{}", fname);
                found
                    .entry(full.clone())
                    .or_insert_with(|| PortInfo::bare(full));
            }
        }
    }

    let mut ports: Vec<PortInfo> = found.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Open a serial port at `baud_rate` with a per-call read timeout
pub fn open_port(
    name: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    debug!(port = name, baud_rate, "opening serial port");
    serialport::new(name, baud_rate)
        .timeout(read_timeout)
        .open()
        .map_err(|e| ProtocolError::ConnectionFailed(format!("{}: {}", name, e)))
}

/// Configure a port as 8N1 without flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(serial_error)?;
    port.set_parity(serialport::Parity::None)
        .map_err(serial_error)?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(serial_error)?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(serial_error)?;

    // Some adapters wire DTR/RTS to the board's reset or boot-select lines
    if let Err(e) = port.write_data_terminal_ready(true) {
        warn!("failed to assert DTR: {} (continuing)", e);
    }
    if let Err(e) = port.write_request_to_send(true) {
        warn!("failed to assert RTS: {} (continuing)", e);
    }

    Ok(())
}

/// Discard everything buffered in both directions
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(serial_error)
}

fn serial_error(e: serialport::Error) -> ProtocolError {
    ProtocolError::SerialError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_list_ports_does_not_panic() {
        for port in list_ports() {
            assert!(!port.name.is_empty());
        }
    }

    #[test]
    fn test_port_sorting() {
        let mut ports: Vec<PortInfo> = [
            "/dev/ttyACM0",
            "/dev/ttyUSB10",
            "/dev/ttyS0",
            "/dev/ttyUSB0",
            "/dev/ttyUSB2",
        ]
        .into_iter()
        .map(|n| PortInfo::bare(n.to_string()))
        .collect();

        ports.sort_by_key(|p| port_sort_key(&p.name));
        let ordered: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();

        assert_eq!(
            ordered,
            vec![
                "/dev/ttyUSB0",
                "/dev/ttyUSB2",
                "/dev/ttyUSB10",
                "/dev/ttyACM0",
                "/dev/ttyS0",
            ]
        );
    }
}
