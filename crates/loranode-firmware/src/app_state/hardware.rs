//! Peripheral bring-up
//!
//! Pin assignment (ESP32-S3):
//!
//! | Function              | GPIO |
//! |-----------------------|------|
//! | Modem UART TX / RX    | 17 / 18 |
//! | Pulse counter 1 / 2   | 3 / 4   |
//! | DS18B20 one-wire      | 5       |
//! | HC-SR04 trigger / echo| 6 / 7   |
//! | Ultrasonic supply     | 8       |
//! | Tamper switch         | 9       |

use esp_hal::gpio::{
    DriveMode, Flex, Input, InputConfig, InputPin, Level, Output, OutputConfig, OutputPin, Pull,
};
use esp_hal::uart::{Config as UartConfig, Uart};
use esp_storage::FlashStorage;
use log::info;
use loranode_core::storage::{COUNTER_NAMESPACE, FlashCounterStore, StoreError};

use super::BootError;

/// Baud rate of the LoRaWAN modem's AT interface.
pub const MODEM_BAUD_RATE: u32 = 9_600;

/// Start of the flash region holding persisted counters (NVS partition).
pub const COUNTER_FLASH_BASE: u32 = 0x9000;
/// Record slots in the counter region.
pub const COUNTER_FLASH_SLOTS: u32 = 16;

pub type ModemUart = Uart<'static, esp_hal::Async>;
pub type CounterStore = FlashCounterStore<FlashStorage<'static>>;

/// UART to the modem, 9600 8N1.
pub fn create_modem_uart(
    uart: esp_hal::peripherals::UART1<'static>,
    tx: impl OutputPin + 'static,
    rx: impl InputPin + 'static,
) -> Result<ModemUart, BootError> {
    let uart = Uart::new(uart, UartConfig::default().with_baudrate(MODEM_BAUD_RATE))
        .map_err(|_| BootError::Uart)?
        .with_tx(tx)
        .with_rx(rx)
        .into_async();
    info!("Modem UART ready at {} baud", MODEM_BAUD_RATE);
    Ok(uart)
}

/// Counter table in the on-chip flash.
pub fn create_counter_store(
    flash: esp_hal::peripherals::FLASH<'static>,
) -> Result<CounterStore, StoreError> {
    FlashCounterStore::new(
        FlashStorage::new(flash),
        COUNTER_FLASH_BASE,
        COUNTER_FLASH_SLOTS,
        COUNTER_NAMESPACE,
    )
}

/// Pulse input: pulled up, counted on the falling edge.
pub fn counter_input(pin: impl InputPin + 'static) -> Input<'static> {
    Input::new(pin, InputConfig::default().with_pull(Pull::Up))
}

/// Open-drain, pulled-up line for the one-wire bus.
pub fn one_wire_line(pin: impl InputPin + OutputPin + 'static) -> Flex<'static> {
    let mut line = Flex::new(pin);
    line.apply_output_config(
        &OutputConfig::default()
            .with_drive_mode(DriveMode::OpenDrain)
            .with_pull(Pull::Up),
    );
    line.set_input_enable(true);
    line.set_output_enable(true);
    line.set_high();
    line
}

/// Push-pull output, initially low.
pub fn switched_output(pin: impl OutputPin + 'static) -> Output<'static> {
    Output::new(pin, Level::Low, OutputConfig::default())
}

/// Input without pull resistor, for lines driven from outside (tamper
/// switch, ultrasonic echo).
pub fn floating_input<'d>(pin: impl InputPin + 'd) -> Input<'d> {
    Input::new(pin, InputConfig::default().with_pull(Pull::None))
}
