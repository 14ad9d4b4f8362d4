use otp_slots::config::{Config, Slot};
use otp_slots::hmacmode::HmacKey;
use otp_slots::otpmode::{Aes128Key, PrivateId};
use otp_slots::OtpSlots;
use rand::rng;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut otp = OtpSlots::new().unwrap();
    let device = match otp.find_device() {
        Ok(device) => device,
        Err(_) => {
            println!("Device not found");
            return;
        }
    };
    let mut session = otp.open(&device).unwrap();
    println!("Programming device {:?} (firmware {})", session.serial(), session.version());

    // Slot 1: Yubico OTP with random secrets.
    let mut rng = rng();
    let key = Aes128Key::generate(&mut rng);
    let uid = PrivateId::generate(&mut rng);
    let public_id = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
    match session.program_otp(Slot::Slot1, &key.0, &public_id, &uid.0, true) {
        Ok(()) => println!("Slot 1: Yubico OTP, AES key {}", hex::encode(key.0)),
        Err(e) => eprintln!("Slot 1: {}", e),
    }

    // Slot 2: HMAC-SHA1 challenge-response, then a test challenge.
    let secret = HmacKey::generate(&mut rng);
    if let Err(e) = session.program_chalresp(Slot::Slot2, &secret.0, false) {
        eprintln!("Slot 2: {}", e);
        return;
    }
    let challenge = b"mychallenge";
    match session.challenge_response_hmac(challenge, Config::default().set_slot(Slot::Slot2)) {
        Ok(hmac) => {
            println!("Slot 2: {}", hex::encode(&hmac.0));
            println!("Response verified: {}", hmac.check(&secret, challenge));
        }
        Err(e) => eprintln!("Slot 2: {}", e),
    }

    session.close().unwrap();
}
