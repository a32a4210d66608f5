use std::env;

use dotenvy::from_path;

/// Credentials required to build an image, with the all-zero fallback used
/// for bench images that never join a real network.
const CREDENTIALS: [(&str, &str); 4] = [
    ("LORAWAN_DEVICE_ADDRESS", "00:00:00:00"),
    ("LORAWAN_APP_EUI", "00:00:00:00:00:00:00:00"),
    (
        "LORAWAN_APP_SESSION_KEY",
        "00:00:00:00:00:00:00:00:00:00:00:00:00:00:00:00",
    ),
    (
        "LORAWAN_NETWORK_SESSION_KEY",
        "00:00:00:00:00:00:00:00:00:00:00:00:00:00:00:00",
    ),
];

fn main() {
    let _ = from_path(".env");

    println!("cargo:rerun-if-changed=.env");

    for (name, fallback) in CREDENTIALS {
        println!("cargo:rerun-if-env-changed={}", name);
        let value = env::var(name).unwrap_or_else(|_| {
            println!("cargo:warning={} not set, using {}", name, fallback);
            fallback.to_string()
        });
        println!("cargo:rustc-env={}={}", name, value);
    }

    // Optional: modems keep their factory mask when this is absent
    println!("cargo:rerun-if-env-changed=LORAWAN_CHANNEL_MASK");
    if let Ok(mask) = env::var("LORAWAN_CHANNEL_MASK") {
        println!("cargo:rustc-env=LORAWAN_CHANNEL_MASK={}", mask);
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
