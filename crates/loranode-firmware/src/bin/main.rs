#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::convert::Infallible;

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::peripherals::Peripherals;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};
use loranode_core::config::DeviceConfig;
use loranode_core::modem::LoRaWanModem;
use loranode_firmware::app_state::{self, BootError, create_modem_uart};
use loranode_firmware::platform::{self, RtcWatchdog};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Pause before restarting after a failed boot, so the log reaches the host.
const RESTART_DELAY: Duration = Duration::from_secs(1);

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(size: 32 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("loranode {} starting", env!("CARGO_PKG_VERSION"));

    let Err(e) = boot(peripherals).await;
    error!("Boot failed: {}, restarting", e);
    Timer::after(RESTART_DELAY).await;
    esp_hal::system::software_reset()
}

async fn boot(p: Peripherals) -> Result<Infallible, BootError> {
    platform::install_watchdog(Rtc::new(p.LPWR));
    let config = app_state::device_config()?;

    let uart = create_modem_uart(p.UART1, p.GPIO17, p.GPIO18)?;
    let modem = LoRaWanModem::new(uart, Delay, RtcWatchdog, config.timing);

    #[cfg(feature = "variant-temperature")]
    return run_temperature(p, modem, config).await;
    #[cfg(feature = "variant-tamper")]
    return run_tamper(p, modem, config).await;
    #[cfg(not(any(feature = "variant-temperature", feature = "variant-tamper")))]
    return run_pulse(p, modem, config).await;
}

type Modem = LoRaWanModem<app_state::ModemUart, Delay, RtcWatchdog>;

#[cfg(not(any(feature = "variant-temperature", feature = "variant-tamper")))]
async fn run_pulse(
    p: Peripherals,
    mut modem: Modem,
    config: DeviceConfig<'static>,
) -> Result<Infallible, BootError> {
    use esp_hal::gpio::Io;
    use loranode_core::pipelines::{PulsePipeline, restore_counters};
    use loranode_core::storage::PersistenceBridge;
    use loranode_core::time::Clock;
    use loranode_firmware::app_state::{CounterStore, counter_input, create_counter_store, install_counters};
    use loranode_firmware::platform::EmbassyClock;
    use static_cell::StaticCell;

    static BRIDGE: StaticCell<PersistenceBridge<CounterStore>> = StaticCell::new();
    let bridge = BRIDGE.init(PersistenceBridge::new(create_counter_store(p.FLASH)?));
    let restored = restore_counters(bridge);

    let mut io = Io::new(p.IO_MUX);
    let cells = install_counters(
        &mut io,
        [counter_input(p.GPIO3), counter_input(p.GPIO4)],
        restored,
        config.debounce_window_ms,
    )?;

    if let Err(e) = modem.configure(&config.lorawan).await {
        error!("Modem configuration failed: {}", e);
    }

    let mut pipeline = PulsePipeline::new(
        cells,
        bridge,
        modem,
        Delay,
        RtcWatchdog,
        config.schedule,
        config.lorawan.port,
        EmbassyClock.now_ms(),
    );
    pipeline.run(EmbassyClock).await
}

#[cfg(feature = "variant-temperature")]
async fn run_temperature(
    p: Peripherals,
    mut modem: Modem,
    config: DeviceConfig<'static>,
) -> Result<Infallible, BootError> {
    use loranode_core::InitError;
    use loranode_core::pipelines::TemperaturePipeline;
    use loranode_core::sensors::{Ds18b20, OneWirePin};
    use loranode_core::time::Clock;
    use loranode_firmware::app_state::one_wire_line;
    use loranode_firmware::platform::EmbassyClock;

    let bus = OneWirePin::new(one_wire_line(p.GPIO5), esp_hal::delay::Delay::new());
    let sensor = Ds18b20::discover(bus, Delay).map_err(|e| {
        error!("DS18B20 discovery failed: {}", e);
        InitError::SensorMissing("DS18B20")
    })?;

    if let Err(e) = modem.configure(&config.lorawan).await {
        error!("Modem configuration failed: {}", e);
    }

    let mut pipeline = TemperaturePipeline::new(
        sensor,
        modem,
        Delay,
        RtcWatchdog,
        config.schedule,
        config.lorawan.port,
        EmbassyClock.now_ms(),
    );
    pipeline.run(EmbassyClock).await
}

#[cfg(feature = "variant-tamper")]
async fn run_tamper(
    p: Peripherals,
    modem: Modem,
    config: DeviceConfig<'static>,
) -> Result<Infallible, BootError> {
    use loranode_core::pipelines::WakeCycle;
    use loranode_core::sensors::{HcSr04, PoweredSensor};
    use loranode_firmware::app_state::{floating_input, switched_output};
    use loranode_firmware::platform::EmbassyClock;

    let reason = platform::wake_reason();

    let ranger = HcSr04::new(
        switched_output(p.GPIO6),
        floating_input(p.GPIO7),
        esp_hal::delay::Delay::new(),
        EmbassyClock,
    )?;
    let sensor = PoweredSensor::new(ranger, switched_output(p.GPIO8));

    let mut tamper_pin = p.GPIO9;
    let plan = {
        let tamper = floating_input(tamper_pin.reborrow());
        let mut cycle = WakeCycle::new(modem, sensor, tamper, Delay, RtcWatchdog, config);
        cycle.run(reason).await
    };
    platform::enter_deep_sleep(plan, tamper_pin)
}
