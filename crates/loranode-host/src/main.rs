//! Desktop runner for the loranode pipelines.
//!
//! `simulate` runs one device variant against a simulated modem, synthetic
//! sensors and a RAM flash on a virtual clock. `serial` configures a real
//! LoRaWAN modem on a host serial port and sends one test uplink.
//!
//! ```bash
//! RUST_LOG=info loranode-host simulate temperature --minutes 60
//! loranode-host serial /dev/ttyUSB0 --baud 9600
//! ```
//!
//! Credentials for `serial` come from `LORAWAN_*` variables in the
//! environment or a `.env` file.

mod serial;
mod sim;

use std::env;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use embassy_futures::block_on;
use log::info;
use loranode_core::config::{
    Confirmation, DataRate, DeviceClass, DeviceConfig, JoinMode, LoRaWanConfig, ModemTiming,
};
use loranode_core::counter::{EdgeCounterBank, LineId};
use loranode_core::handoff::HandoffTable;
use loranode_core::modem::{LineEnding, LoRaWanModem};
use loranode_core::payload::WakeReason;
use loranode_core::pipelines::{
    PulsePipeline, TICK_INTERVAL_MS, TemperaturePipeline, WakeCycle, restore_counters,
};
use loranode_core::storage::{COUNTER_NAMESPACE, FlashCounterStore, PersistenceBridge};
use loranode_core::time::{Clock, NoWatchdog};

use serial::{SerialLink, ThreadDelay};
use sim::{
    PulseSource, RamFlash, SimClock, SimTamperSwitch, SimulatedModem, SyntheticRangefinder,
    SyntheticThermometer,
};

/// The simulated modem answers BUSY to every n-th command.
const SIM_BUSY_EVERY: u32 = 9;
const SIM_FLASH_SIZE: usize = 4 * 1024;
const SIM_FLASH_SLOTS: u32 = 16;

#[derive(Parser)]
#[command(name = "loranode-host")]
#[command(about = "Run loranode pipelines on a desktop", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a device variant against simulated hardware
    Simulate {
        #[arg(value_enum, default_value = "pulse")]
        variant: Variant,

        /// Virtual device time to simulate
        #[arg(long, default_value = "30")]
        minutes: u64,
    },

    /// Configure a real modem on a serial port and send a test uplink
    Serial {
        /// Serial device, e.g. /dev/ttyUSB0
        device: String,

        #[arg(long, default_value = "9600")]
        baud: u32,

        /// Terminate commands with "\n\r" instead of "\n"
        #[arg(long)]
        lf_cr: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Variant {
    Pulse,
    Temperature,
    Tamper,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Simulate { variant, minutes } => {
            let duration_ms = i64::try_from(minutes.saturating_mul(60_000))
                .context("simulation too long")?;
            match variant {
                Variant::Pulse => simulate_pulse(duration_ms),
                Variant::Temperature => simulate_temperature(duration_ms),
                Variant::Tamper => simulate_tamper(duration_ms),
            }
        }
        Commands::Serial {
            device,
            baud,
            lf_cr,
        } => run_serial(&device, baud, lf_cr),
    }
}

fn sim_credentials() -> LoRaWanConfig<'static> {
    LoRaWanConfig {
        device_address: "26:0B:1A:2C",
        app_eui: "70:B3:D5:7E:D0:00:00:01",
        app_session_key: "2B:7E:15:16:28:AE:D2:A6:AB:F7:15:88:09:CF:4F:3C",
        network_session_key: "2B:7E:15:16:28:AE:D2:A6:AB:F7:15:88:09:CF:4F:3D",
        channel_mask: Some("00FF:0000:0000:0000:0000:0000"),
        join_mode: JoinMode::Abp,
        adaptive_data_rate: false,
        data_rate: DataRate::DR2,
        class: DeviceClass::A,
        confirmation: Confirmation::Unconfirmed,
        port: 1,
    }
}

fn report(modem: &SimulatedModem) {
    info!(
        "{} commands, {} BUSY replies, {} uplinks",
        modem.commands(),
        modem.busy_replies(),
        modem.uplinks().len()
    );
    for uplink in modem.uplinks() {
        info!("  {}", uplink);
    }
}

// ---------------------------------------------------------------------------
// Simulated variants
// ---------------------------------------------------------------------------

fn simulate_pulse(duration_ms: i64) -> Result<()> {
    let config = DeviceConfig::pulse_counter(sim_credentials());
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;
    let clock = SimClock::default();
    let modem_line = SimulatedModem::new(SIM_BUSY_EVERY);

    let flash = RamFlash::new(SIM_FLASH_SIZE);
    let store = FlashCounterStore::new(flash, 0, SIM_FLASH_SLOTS, COUNTER_NAMESPACE)
        .map_err(|e| anyhow!("counter store: {e}"))?;
    let bridge = PersistenceBridge::new(store);
    let restored = restore_counters(&bridge);

    let table: HandoffTable<2> = HandoffTable::new();
    let mut bank: EdgeCounterBank<'_, 2> = EdgeCounterBank::new(config.debounce_window_ms);
    for (index, initial) in restored.into_iter().enumerate() {
        bank.register(LineId(index as u8), &table, initial, clock.now_ms())
            .map_err(|e| anyhow!("{e}"))?;
    }

    let mut modem = LoRaWanModem::new(modem_line.clone(), clock.delay(), NoWatchdog, config.timing);
    block_on(modem.configure(&config.lorawan)).map_err(|e| anyhow!("modem: {e}"))?;

    let cells = [table.cell(LineId(0)), table.cell(LineId(1))];
    let [Ok(first), Ok(second)] = cells else {
        bail!("handoff table has no cell for a counter line");
    };
    let mut pipeline = PulsePipeline::new(
        [first, second],
        &bridge,
        modem,
        clock.delay(),
        NoWatchdog,
        config.schedule,
        config.lorawan.port,
        clock.now_ms(),
    );

    let mut sources = [PulseSource::new(700, Some(30)), PulseSource::new(1_300, None)];
    let end_ms = clock.now_ms() + duration_ms;
    while clock.now_ms() < end_ms {
        let now = clock.now_ms();
        for (index, source) in sources.iter_mut().enumerate() {
            for edge in source.edges_until(now) {
                bank.on_edge_event(LineId(index as u8), edge);
            }
        }
        block_on(pipeline.tick(now));
        clock.advance_ms(u64::from(TICK_INTERVAL_MS));
    }

    report(&modem_line);
    info!(
        "Generated {} and {} pulses, counted {:?}, persisted {:?}",
        sources[0].pulses(),
        sources[1].pulses(),
        [bank.state(LineId(0)), bank.state(LineId(1))].map(|s| s.map(|c| c.count)),
        restore_counters(&bridge)
    );
    Ok(())
}

fn simulate_temperature(duration_ms: i64) -> Result<()> {
    let config = DeviceConfig::temperature(sim_credentials());
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;
    let clock = SimClock::default();
    let modem_line = SimulatedModem::new(SIM_BUSY_EVERY);

    let mut modem = LoRaWanModem::new(modem_line.clone(), clock.delay(), NoWatchdog, config.timing);
    block_on(modem.configure(&config.lorawan)).map_err(|e| anyhow!("modem: {e}"))?;

    let mut pipeline = TemperaturePipeline::new(
        SyntheticThermometer::new(clock.clone()),
        modem,
        clock.delay(),
        NoWatchdog,
        config.schedule,
        config.lorawan.port,
        clock.now_ms(),
    );

    let end_ms = clock.now_ms() + duration_ms;
    while clock.now_ms() < end_ms {
        block_on(pipeline.tick(clock.now_ms()));
        clock.advance_ms(u64::from(TICK_INTERVAL_MS));
    }

    report(&modem_line);
    info!(
        "{} of {} samples in the current window",
        pipeline.buffer().len(),
        pipeline.buffer().capacity()
    );
    Ok(())
}

fn simulate_tamper(duration_ms: i64) -> Result<()> {
    let config = DeviceConfig::tamper(sim_credentials());
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;
    let clock = SimClock::default();
    let modem_line = SimulatedModem::new(SIM_BUSY_EVERY);
    let switch = SimTamperSwitch::new(clock.clone());

    let end_ms = clock.now_ms() + duration_ms;
    let mut wake = 0u32;
    // First boot has no wake source; every third wake-up is a tamper event
    let mut reason = WakeReason::from_sources(false, false);
    while clock.now_ms() < end_ms {
        wake += 1;
        info!("Wake-up #{} ({:?})", wake, reason);
        if reason == WakeReason::Tamper {
            switch.open_for_ms(3_000);
        }

        let modem = LoRaWanModem::new(modem_line.clone(), clock.delay(), NoWatchdog, config.timing);
        let mut cycle = WakeCycle::new(
            modem,
            SyntheticRangefinder::new(clock.clone()),
            switch.clone(),
            clock.delay(),
            NoWatchdog,
            config,
        );
        let plan = block_on(cycle.run(reason));

        clock.advance_ms(u64::from(plan.sleep_secs) * 1_000);
        reason = WakeReason::from_sources(wake % 3 == 2, wake % 3 != 2);
    }

    report(&modem_line);
    Ok(())
}

// ---------------------------------------------------------------------------
// Real modem
// ---------------------------------------------------------------------------

fn credential(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} not set (environment or .env)"))
}

fn run_serial(device: &str, baud: u32, lf_cr: bool) -> Result<()> {
    let device_address = credential("LORAWAN_DEVICE_ADDRESS")?;
    let app_eui = credential("LORAWAN_APP_EUI")?;
    let app_session_key = credential("LORAWAN_APP_SESSION_KEY")?;
    let network_session_key = credential("LORAWAN_NETWORK_SESSION_KEY")?;
    let channel_mask = env::var("LORAWAN_CHANNEL_MASK").ok();

    let lorawan = LoRaWanConfig {
        device_address: &device_address,
        app_eui: &app_eui,
        app_session_key: &app_session_key,
        network_session_key: &network_session_key,
        channel_mask: channel_mask.as_deref(),
        ..sim_credentials()
    };
    if let Err(e) = lorawan.validate() {
        bail!("invalid credentials: {e}");
    }

    let link = SerialLink::open(device, baud)
        .with_context(|| format!("failed to open serial port '{device}'"))?;
    info!("Opened {} at {} baud", device, baud);

    let timing = ModemTiming {
        line_ending: if lf_cr { LineEnding::LfCr } else { LineEnding::Lf },
        ..ModemTiming::default()
    };
    let mut modem = LoRaWanModem::new(link, ThreadDelay, NoWatchdog, timing);

    block_on(async {
        modem
            .configure(&lorawan)
            .await
            .map_err(|e| anyhow!("modem configuration failed: {e}"))?;
        modem
            .send_text(lorawan.port, "loranode test")
            .await
            .map_err(|e| anyhow!("test uplink failed: {e}"))
    })?;

    info!(
        "Test uplink sent ({} BUSY retries on the last command)",
        modem.driver().last_busy_retries()
    );
    Ok(())
}
