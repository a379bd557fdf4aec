//! Print wire vectors for interop testing against other peers.
//!
//! Run with: cargo run --package protocol --example test_vectors

use protocol::messages::*;
use protocol::{envelope, KeyPair};

fn main() {
    // Test vector 1: request without payload
    print_test_vector("get_ports", &Command::ListPorts);

    // Test vector 2: request with a device
    print_test_vector(
        "open_connection",
        &Command::OpenConnection {
            device_id: "/dev/ttyUSB0".to_string(),
        },
    );

    // Test vector 3: device listing
    print_test_vector(
        "com_ports",
        &Command::Ports {
            devices: vec!["/dev/ttyUSB0".to_string(), "/dev/ttyUSB1".to_string()],
        },
    );

    // Test vector 4: finished service
    print_test_vector("check_empty", &Command::CheckStatus(String::new()));

    // Test vector 5: error
    print_test_vector("error", &Command::error_notice(WRONG_RSA_KEY));

    // Test vector 6: protected frame layout
    let keypair = KeyPair::generate().expect("key generation failed");
    let plaintext = Command::Check.encode().expect("serialization failed");
    let frame = envelope::encode(&plaintext, keypair.public_key()).expect("sealing failed");
    println!("# public key\n{}", keypair.public_key().to_pem().expect("pem failed"));
    println!(
        "# envelope: {} bytes = {} wrapped key + 16 nonce + 16 tag + {} ciphertext",
        frame.len(),
        keypair.modulus_len(),
        plaintext.len()
    );
}

fn print_test_vector(name: &str, command: &Command) {
    let bytes = command.encode().expect("serialization failed");
    println!("# {}", name);
    print!("{}", String::from_utf8_lossy(&bytes));
    println!("---");
}
