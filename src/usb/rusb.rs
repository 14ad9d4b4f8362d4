use crate::error::OtpError;
use crate::usb::{
    found_devices, Backend, Device, Transport, HID_GET_REPORT, HID_SET_REPORT, PRODUCT_ID, REPORT_SIZE, REPORT_TYPE_FEATURE,
    VENDOR_ID,
};
use crate::Result;

use rusb::{request_type, Context, DeviceHandle, Direction, Recipient, RequestType, UsbContext};
use std::time::Duration;
use tracing::{debug, trace, warn};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(2);

/// Checks that libusb can be loaded and a context created.
pub(crate) fn init_backend() -> Result<()> {
    let version = rusb::version();
    Context::new()?;
    debug!(
        "Initialized libusb {}.{}.{}",
        version.major(),
        version.minor(),
        version.micro()
    );
    Ok(())
}

pub struct RUSBBackend {
    context: Context,
}

/// A device opened through libusb, with the interfaces claimed for it.
pub struct RUSBHandle {
    handle: DeviceHandle<Context>,
    interfaces: Vec<u8>,
    product_id: u16,
}

impl Transport for RUSBHandle {
    fn read_report(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() != REPORT_SIZE {
            return Err(OtpError::invalid(format!("report buffer must be {} bytes", REPORT_SIZE)));
        }
        let reqtype = request_type(Direction::In, RequestType::Class, Recipient::Interface);
        let value = REPORT_TYPE_FEATURE << 8;
        Ok(self
            .handle
            .read_control(reqtype, HID_GET_REPORT, value, 0, buf, CONTROL_TIMEOUT)?)
    }

    fn write_report(&mut self, packet: &[u8]) -> Result<()> {
        let reqtype = request_type(Direction::Out, RequestType::Class, Recipient::Interface);
        let value = REPORT_TYPE_FEATURE << 8;
        if self
            .handle
            .write_control(reqtype, HID_SET_REPORT, value, 0, packet, CONTROL_TIMEOUT)?
            != REPORT_SIZE
        {
            Err(OtpError::CanNotWriteToDevice)
        } else {
            Ok(())
        }
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    #[cfg(any(target_os = "macos", target_os = "windows"))]
    fn close(&mut self) -> Result<()> {
        self.interfaces.clear();
        Ok(())
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn close(&mut self) -> Result<()> {
        let handle = &mut self.handle;
        release_interfaces(std::mem::take(&mut self.interfaces), |interface| {
            handle.release_interface(interface)?;
            handle.attach_kernel_driver(interface)?;
            Ok(())
        })
    }
}

/// Runs `release` on every interface, even after one fails, and returns the first error.
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn release_interfaces<F>(interfaces: Vec<u8>, mut release: F) -> Result<()>
where
    F: FnMut(u8) -> Result<()>,
{
    let mut first_error = None;
    for interface in interfaces {
        trace!(interface, "Releasing interface");
        if let Err(e) = release(interface) {
            warn!(interface, error = %e, "Failed to release interface");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl RUSBBackend {
    fn describe(&mut self, device: &rusb::Device<Context>) -> Result<Option<Device>> {
        let descr = device.device_descriptor()?;
        if !VENDOR_ID.contains(&descr.vendor_id()) || !PRODUCT_ID.contains(&descr.product_id()) {
            return Ok(None);
        }

        let name = device
            .open()
            .ok()
            .and_then(|handle| handle.read_product_string_ascii(&descr).ok());
        let mut found = Device {
            name,
            serial: None,
            product_id: descr.product_id(),
            vendor_id: descr.vendor_id(),
            bus_id: device.bus_number(),
            address_id: device.address(),
        };
        found.serial = self.read_serial_from_device(&found).ok();
        trace!(?found, "Found device");
        Ok(Some(found))
    }
}

impl Backend for RUSBBackend {
    type Handle = RUSBHandle;

    fn new() -> Result<Self> {
        let context = Context::new()?;
        Ok(Self { context })
    }

    fn open_device(&mut self, device: &Device) -> Result<RUSBHandle> {
        let devices = match self.context.devices() {
            Ok(device) => device,
            Err(_) => {
                return Err(OtpError::DeviceNotFound);
            }
        };

        for usb_device in devices.iter() {
            if usb_device.bus_number() != device.bus_id || usb_device.address() != device.address_id {
                continue;
            }

            let handle = match usb_device.open() {
                Ok(handle) => handle,
                Err(_) => {
                    return Err(OtpError::OpenDeviceError);
                }
            };
            let config = usb_device.config_descriptor(0)?;

            #[cfg_attr(any(target_os = "macos", target_os = "windows"), allow(unused_mut))]
            let mut interfaces: Vec<u8> = Vec::new();
            for interface in config.interfaces() {
                for usb_int in interface.descriptors() {
                    match handle.kernel_driver_active(usb_int.interface_number()) {
                        Ok(true) => {
                            #[cfg(not(any(target_os = "macos", target_os = "windows")))]
                            handle.detach_kernel_driver(usb_int.interface_number())?;
                        }
                        _ => continue,
                    };

                    if handle.active_configuration()? != config.number() {
                        handle.set_active_configuration(config.number())?;
                    }
                    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
                    handle.claim_interface(usb_int.interface_number())?;
                    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
                    interfaces.push(usb_int.interface_number());
                }
            }

            debug!(bus = device.bus_id, address = device.address_id, "Opened device");
            return Ok(RUSBHandle {
                handle,
                interfaces,
                product_id: device.product_id,
            });
        }

        Err(OtpError::DeviceNotFound)
    }

    fn find_all_devices(&mut self) -> Result<Vec<Device>> {
        let mut result: Vec<Device> = Vec::new();
        let devices = self.context.devices()?;
        for device in devices.iter() {
            if let Some(found) = self.describe(&device)? {
                result.push(found);
            }
        }

        found_devices(result)
    }
}
