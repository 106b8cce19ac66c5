//! Serial port transport
//!
//! Direct USB / RS-232 link to the controller.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Bounded line reads over a cloned read handle
//! - DTR pulse reset
//! - Hang-up-on-close handling so opening the port does not reboot the board

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use printlink_core::{ConnectionError, TransportError};

use super::{read_line_with, LineBuffer, Transport, TransportKind};

/// Read timeout used when the port is first opened
const OPEN_TIMEOUT: Duration = Duration::from_millis(10);

/// How long DTR is held low for a reset
const RESET_PULSE: Duration = Duration::from_millis(200);

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that look like printer controllers
///
/// Keeps:
/// - Windows: COM*
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>, ConnectionError> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::FailedToOpen {
            port: "*".to_string(),
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, port_description(port));
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    let mut info = info.with_usb_ids(usb.vid, usb.pid);
                    if let Some(ref mfg) = usb.manufacturer {
                        info = info.with_manufacturer(mfg);
                    }
                    if let Some(ref serial) = usb.serial_number {
                        info = info.with_serial_number(serial);
                    }
                    info
                }
                _ => info,
            }
        })
        .collect())
}

fn is_controller_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn map_open_error(port: &str, err: &serialport::Error) -> ConnectionError {
    let port = port.to_string();
    match err.kind() {
        serialport::ErrorKind::NoDevice => ConnectionError::PortNotFound { port },
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            ConnectionError::PortNotFound { port }
        }
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            ConnectionError::PermissionDenied { port }
        }
        serialport::ErrorKind::Io(std::io::ErrorKind::ResourceBusy) => {
            ConnectionError::PortBusy { port }
        }
        _ if err.description.to_lowercase().contains("busy") => ConnectionError::PortBusy { port },
        _ => ConnectionError::FailedToOpen {
            port,
            reason: err.to_string(),
        },
    }
}

struct ReadSide {
    port: Box<dyn serialport::SerialPort>,
    buffer: LineBuffer,
}

/// Serial transport backed by the serialport crate
pub struct SerialTransport {
    path: String,
    reader: Mutex<ReadSide>,
    writer: Mutex<Box<dyn serialport::SerialPort>>,
    /// Hang-up flag as found before opening, when it must be put back
    restore_hangup: Option<bool>,
    closed: AtomicBool,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`.
    ///
    /// Hang-up-on-close is cleared on the device first so the open does not
    /// reset the controller. With `restore_hangup` the original flag is put
    /// back on [`Transport::close`].
    pub fn open(path: &str, baud_rate: u32, restore_hangup: bool) -> Result<Self, ConnectionError> {
        let previous = match hangup::set(path, false) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::debug!("Could not clear hang-up flag on {}: {}", path, e);
                None
            }
        };

        let port = serialport::new(path, baud_rate)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", path, e);
                map_open_error(path, &e)
            })?;

        let read_port = port.try_clone().map_err(|e| ConnectionError::FailedToOpen {
            port: path.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!("Opened serial port {} at {} baud", path, baud_rate);

        Ok(Self {
            path: path.to_string(),
            reader: Mutex::new(ReadSide {
                port: read_port,
                buffer: LineBuffer::new(),
            }),
            writer: Mutex::new(port),
            restore_hangup: previous.filter(|_| restore_hangup),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Transport for SerialTransport {
    fn read_line(&self, timeout: Duration) -> Result<Option<String>, TransportError> {
        self.ensure_open()?;
        let mut side = self.reader.lock();
        let ReadSide { port, buffer } = &mut *side;
        read_line_with(buffer, timeout, false, |chunk, remaining| {
            port.set_timeout(remaining)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            port.read(chunk)
        })
    }

    fn write_all(&self, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut port = self.writer.lock();
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| TransportError::Write {
                reason: e.to_string(),
            })
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Restored while our handle still holds the device open
        if let Some(previous) = self.restore_hangup {
            if let Err(e) = hangup::set(&self.path, previous) {
                tracing::warn!("Could not restore hang-up flag on {}: {}", self.path, e);
            }
        }

        tracing::info!("Closed serial port {}", self.path);
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn name(&self) -> String {
        self.path.clone()
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut port = self.writer.lock();
        let pulse = |port: &mut Box<dyn serialport::SerialPort>, level| {
            port.write_data_terminal_ready(level)
                .map_err(|e| TransportError::Write {
                    reason: e.to_string(),
                })
        };
        pulse(&mut *port, false)?;
        thread::sleep(RESET_PULSE);
        pulse(&mut *port, true)?;
        tracing::info!("Pulsed DTR on {}", self.path);
        Ok(())
    }
}

#[cfg(unix)]
mod hangup {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;

    use nix::sys::termios::{tcgetattr, tcsetattr, ControlFlags, SetArg};

    /// Set HUPCL on `path`; returns the previous setting
    pub fn set(path: &str, enabled: bool) -> Result<Option<bool>, String> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NOCTTY | nix::libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| e.to_string())?;

        let mut attrs = tcgetattr(&device).map_err(|e| e.to_string())?;
        let previous = attrs.control_flags.contains(ControlFlags::HUPCL);
        if previous != enabled {
            attrs.control_flags.set(ControlFlags::HUPCL, enabled);
            tcsetattr(&device, SetArg::TCSANOW, &attrs).map_err(|e| e.to_string())?;
        }
        Ok(Some(previous))
    }
}

#[cfg(not(unix))]
mod hangup {
    pub fn set(_path: &str, _enabled: bool) -> Result<Option<bool>, String> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_port_patterns() {
        assert!(is_controller_port("COM3"));
        assert!(is_controller_port("/dev/ttyUSB0"));
        assert!(is_controller_port("/dev/ttyACM1"));
        assert!(is_controller_port("/dev/cu.usbmodem1421"));
        assert!(!is_controller_port("COM"));
        assert!(!is_controller_port("COMX"));
        assert!(!is_controller_port("/dev/ttyS0"));
    }

    #[test]
    fn open_errors_map_to_connection_errors() {
        let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        assert!(matches!(
            map_open_error("/dev/ttyUSB9", &err),
            ConnectionError::PortNotFound { .. }
        ));

        let err = serialport::Error::new(
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "denied",
        );
        assert!(matches!(
            map_open_error("/dev/ttyUSB9", &err),
            ConnectionError::PermissionDenied { .. }
        ));

        let err = serialport::Error::new(
            serialport::ErrorKind::Io(std::io::ErrorKind::Other),
            "Device or resource busy",
        );
        assert!(matches!(
            map_open_error("/dev/ttyUSB9", &err),
            ConnectionError::PortBusy { .. }
        ));
    }

    #[test]
    fn missing_device_fails_to_open() {
        let result = SerialTransport::open("/dev/printlink-does-not-exist", 115200, true);
        assert!(result.is_err());
    }
}
