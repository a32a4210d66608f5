//! LoRaWAN session credentials
//!
//! Injected by `build.rs` from the environment or a `.env` file next to the
//! crate manifest.

use loranode_core::config::{Confirmation, DataRate, DeviceClass, JoinMode, LoRaWanConfig};

pub const DEVICE_ADDRESS: &str = env!("LORAWAN_DEVICE_ADDRESS");
pub const APP_EUI: &str = env!("LORAWAN_APP_EUI");
pub const APP_SESSION_KEY: &str = env!("LORAWAN_APP_SESSION_KEY");
pub const NETWORK_SESSION_KEY: &str = env!("LORAWAN_NETWORK_SESSION_KEY");
pub const CHANNEL_MASK: Option<&str> = option_env!("LORAWAN_CHANNEL_MASK");

/// ABP session at data rate 2, class A, unconfirmed uplinks, ADR off.
///
/// The uplink port is chosen by the device variant.
pub fn lorawan() -> LoRaWanConfig<'static> {
    LoRaWanConfig {
        device_address: DEVICE_ADDRESS,
        app_eui: APP_EUI,
        app_session_key: APP_SESSION_KEY,
        network_session_key: NETWORK_SESSION_KEY,
        channel_mask: CHANNEL_MASK,
        join_mode: JoinMode::Abp,
        adaptive_data_rate: false,
        data_rate: DataRate::DR2,
        class: DeviceClass::A,
        confirmation: Confirmation::Unconfirmed,
        port: 1,
    }
}
