use nusb::transfer::{Control, ControlType, Recipient};
use nusb::{Device as NUSBDevice, DeviceInfo, Interface};

use crate::error::OtpError;
use crate::usb::{
    found_devices, Backend, Device, Transport, HID_GET_REPORT, HID_SET_REPORT, PRODUCT_ID, REPORT_SIZE, REPORT_TYPE_FEATURE,
    VENDOR_ID,
};
use crate::Result;
use std::time::Duration;
use tracing::{debug, trace};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(2);

/// nusb talks to the OS directly, so there is no library to load.
pub(crate) fn init_backend() -> Result<()> {
    debug!("Initialized nusb backend");
    Ok(())
}

pub struct NUSBBackend {}

/// A device opened through nusb. Claimed interfaces are released when dropped.
pub struct NUSBHandle {
    _device: NUSBDevice,
    interfaces: Vec<Interface>,
    product_id: u16,
}

impl NUSBHandle {
    fn interface(&self) -> Result<&Interface> {
        self.interfaces.first().ok_or(OtpError::OpenDeviceError)
    }
}

impl Transport for NUSBHandle {
    fn read_report(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() != REPORT_SIZE {
            return Err(OtpError::invalid(format!("report buffer must be {} bytes", REPORT_SIZE)));
        }

        let control_in = Control {
            control_type: ControlType::Class,
            recipient: Recipient::Interface,
            request: HID_GET_REPORT,
            value: REPORT_TYPE_FEATURE << 8,
            index: 0,
        };

        match self.interface()?.control_in_blocking(control_in, buf, CONTROL_TIMEOUT) {
            Ok(r) => Ok(r),
            Err(_e) => Err(OtpError::CanNotReadFromDevice),
        }
    }

    fn write_report(&mut self, packet: &[u8]) -> Result<()> {
        let control_out = Control {
            control_type: ControlType::Class,
            recipient: Recipient::Interface,
            request: HID_SET_REPORT,
            value: REPORT_TYPE_FEATURE << 8,
            index: 0,
        };

        match self.interface()?.control_out_blocking(control_out, packet, CONTROL_TIMEOUT) {
            Ok(bytes_written) => {
                if bytes_written != REPORT_SIZE {
                    Err(OtpError::CanNotWriteToDevice)
                } else {
                    Ok(())
                }
            }
            Err(_) => Err(OtpError::CanNotWriteToDevice),
        }
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn close(&mut self) -> Result<()> {
        trace!(count = self.interfaces.len(), "Releasing interfaces");
        self.interfaces.clear();
        Ok(())
    }
}

impl NUSBBackend {
    fn describe(&mut self, device_info: &DeviceInfo) -> Option<Device> {
        let product_id = device_info.product_id();
        let vendor_id = device_info.vendor_id();
        if !VENDOR_ID.contains(&vendor_id) || !PRODUCT_ID.contains(&product_id) {
            return None;
        }

        let mut found = Device {
            name: match device_info.product_string() {
                Some(name) => Some(name.to_string()),
                None => Some("unknown".to_string()),
            },
            serial: None,
            product_id,
            vendor_id,
            bus_id: device_info.bus_number(),
            address_id: device_info.device_address(),
        };
        found.serial = self.read_serial_from_device(&found).ok();
        trace!(?found, "Found device");
        Some(found)
    }
}

impl Backend for NUSBBackend {
    type Handle = NUSBHandle;

    fn new() -> Result<Self> {
        Ok(Self {})
    }

    fn open_device(&mut self, device: &Device) -> Result<NUSBHandle> {
        let nusb_devices = match nusb::list_devices() {
            Ok(d) => d,
            Err(e) => return Err(e.into()),
        };
        for device_info in nusb_devices {
            if device_info.bus_number() != device.bus_id || device_info.device_address() != device.address_id {
                continue;
            }

            let opened = match device_info.open() {
                Ok(d) => d,
                Err(_) => {
                    return Err(OtpError::OpenDeviceError);
                }
            };

            let mut interfaces: Vec<Interface> = Vec::new();
            for interface in device_info.interfaces() {
                let interface = match opened.detach_and_claim_interface(interface.interface_number()) {
                    Ok(interface) => interface,
                    Err(_) => continue,
                };

                interfaces.push(interface);
            }
            if interfaces.is_empty() {
                return Err(OtpError::OpenDeviceError);
            }

            debug!(bus = device.bus_id, address = device.address_id, "Opened device");
            return Ok(NUSBHandle {
                _device: opened,
                interfaces,
                product_id: device.product_id,
            });
        }

        Err(OtpError::DeviceNotFound)
    }

    fn find_all_devices(&mut self) -> Result<Vec<Device>> {
        let mut devices: Vec<Device> = Vec::new();
        for device_info in nusb::list_devices()? {
            if let Some(found) = self.describe(&device_info) {
                devices.push(found);
            }
        }
        found_devices(devices)
    }
}
