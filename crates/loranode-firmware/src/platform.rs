//! Clock, watchdog and sleep control on the ESP32-S3
//!
//! The RTC peripheral is shared: the watchdog handles feed its RWDT while the
//! device runs, and the tamper variant finally takes it to enter deep sleep.
//! It lives in a critical-section mutex so any task or handle can reach it.

use core::cell::RefCell;

use critical_section::Mutex;
use esp_hal::gpio::RtcPin;
use esp_hal::rtc_cntl::sleep::{Ext0WakeupSource, TimerWakeupSource, WakeupLevel};
use esp_hal::rtc_cntl::{Rtc, RwdtStage, SleepSource, wakeup_cause};
use log::{error, info};
use loranode_core::payload::WakeReason;
use loranode_core::pipelines::SleepPlan;
use loranode_core::time::{Clock, Watchdog};

/// Time without a feed before the RWDT resets the chip.
///
/// Must exceed the longest blocking step, a BUSY backoff plus one exchange.
pub const WATCHDOG_TIMEOUT_SECS: u64 = 30;

static RTC: Mutex<RefCell<Option<Rtc<'static>>>> = Mutex::new(RefCell::new(None));

/// Monotonic clock backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_us(&self) -> u64 {
        embassy_time::Instant::now().as_micros()
    }
}

/// Arm the RTC watchdog and park the RTC where [`RtcWatchdog`] can reach it.
pub fn install_watchdog(mut rtc: Rtc<'static>) {
    rtc.rwdt.set_timeout(
        RwdtStage::Stage0,
        esp_hal::time::Duration::from_secs(WATCHDOG_TIMEOUT_SECS),
    );
    rtc.rwdt.enable();
    info!("RTC watchdog armed ({} s)", WATCHDOG_TIMEOUT_SECS);
    critical_section::with(|cs| RTC.borrow_ref_mut(cs).replace(rtc));
}

/// Handle feeding the shared RTC watchdog; copy one into every owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcWatchdog;

impl Watchdog for RtcWatchdog {
    fn feed(&mut self) {
        critical_section::with(|cs| {
            if let Some(rtc) = RTC.borrow_ref_mut(cs).as_mut() {
                rtc.rwdt.feed();
            }
        });
    }
}

/// Why the chip left deep sleep (or booted).
pub fn wake_reason() -> WakeReason {
    let cause = wakeup_cause();
    info!("Wake-up cause: {:?}", cause);
    WakeReason::from_sources(
        matches!(cause, SleepSource::Ext0),
        matches!(cause, SleepSource::Timer),
    )
}

/// Enter deep sleep as described by `plan`. Never returns; the chip reboots
/// on wake-up.
pub fn enter_deep_sleep<P: RtcPin>(plan: SleepPlan, tamper: P) -> ! {
    let rtc = critical_section::with(|cs| RTC.borrow_ref_mut(cs).take());
    let Some(mut rtc) = rtc else {
        error!("RTC not installed, restarting instead of sleeping");
        esp_hal::system::software_reset();
    };

    rtc.rwdt.disable();
    let timer = TimerWakeupSource::new(core::time::Duration::from_secs(u64::from(
        plan.sleep_secs,
    )));
    info!("Entering deep sleep for {} s", plan.sleep_secs);
    if plan.wake_on_tamper_high {
        let ext0 = Ext0WakeupSource::new(tamper, WakeupLevel::High);
        rtc.sleep_deep(&[&timer, &ext0])
    } else {
        rtc.sleep_deep(&[&timer])
    }
}
