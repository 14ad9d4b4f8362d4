use otp_slots::config::Slot;
use otp_slots::OtpSlots;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut otp = OtpSlots::new().unwrap();
    let devices = match otp.find_all_devices() {
        Ok(devices) => devices,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    for device in devices {
        println!(
            "{} (vendor {:04x}, product {:04x}, serial {:?})",
            device.name.as_deref().unwrap_or("unknown"),
            device.vendor_id,
            device.product_id,
            device.serial
        );

        let session = match otp.open(&device) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("  {}", e);
                continue;
            }
        };
        println!("  Firmware: {}", session.version());
        println!("  Mode: {}", session.mode());
        for slot in [Slot::Slot1, Slot::Slot2] {
            println!(
                "  {:?} is {}configured",
                slot,
                if session.is_configured(slot) { "" } else { "not " }
            );
        }
        if let Err(e) = session.close() {
            eprintln!("  {}", e);
        }
    }
}
