//! nRF52840 firmware for the bt2cdc head-unit bridge.
//!
//! Task layout:
//!   - pulse task (interrupt-priority executor): edge timestamps from the
//!     head unit's DataOut line through the pulse framer and packet
//!     scanner, decoded buttons into a bounded channel
//!   - cdc tx task: one display frame per 50 ms bus slot, bit-banged at
//!     62.5 kHz (below the SPIM block's minimum clock)
//!   - bt task: UART line assembly into the AT driver plus the command
//!     dispatch/poll loop
//!   - coordinator task: button handling, connect/disconnect reactions,
//!     flash settings and restart requests
//!
//! The CDC link and the BT driver live behind separate mutexes; the only
//! place both are held at once is the coordinator, which always takes
//! the link first.

#![no_std]
#![no_main]

mod settings;

use defmt::{info, unwrap};
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_futures::join::join;
use embassy_futures::select::{select, Either};
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::interrupt::{InterruptExt, Priority};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::pac::interrupt;
use embassy_nrf::peripherals::{TIMER1, UARTE0};
use embassy_nrf::{bind_interrupts, buffered_uarte, uarte};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration, Instant, Ticker, Timer};
use embedded_io_async::{Read, Write};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use bt2cdc::bt::{BtDriver, NullObserver};
use bt2cdc::cdc::link::CdcLink;
use bt2cdc::cdc::pulse::{PulseFramer, PulseThresholds};
use bt2cdc::cdc::scanner::ButtonPacketScanner;
use bt2cdc::cdc::CdcButton;
use bt2cdc::config::{
    BT_LINE_MAX, BT_UART_BAUD, CDC_FRAME_PERIOD_MS, CDC_INTER_BYTE_GAP_US, TRACK_NET_CONFIG_OFF,
    TRACK_NET_CONFIG_ON,
};
use bt2cdc::coordinator::{Coordinator, SystemRequest};
use bt2cdc::Error;
use settings::SystemSettings;

type LinkMutex = Mutex<CriticalSectionRawMutex, CdcLink>;
type BtMutex = Mutex<CriticalSectionRawMutex, BtDriver>;

/// Decoded button presses, pulse task -> coordinator. Lossy on overflow:
/// a stale button press is worse than none.
static BUTTON_EVENTS: Channel<CriticalSectionRawMutex, CdcButton, 8> = Channel::new();

static LINK: StaticCell<LinkMutex> = StaticCell::new();
static BT: StaticCell<BtMutex> = StaticCell::new();

static UARTE_RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static UARTE_TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

/// Bounded wait for a shared resource. A frame slot missed while the
/// coordinator holds the lock is recoverable; a stalled task is not.
const LOCK_WAIT: Duration = Duration::from_millis(100);

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI1_EGU1() {
    EXECUTOR_HIGH.on_interrupt()
}

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => buffered_uarte::InterruptHandler<UARTE0>;
});

/// Edge capture on the head unit's DataOut line. Runs on the
/// interrupt-priority executor so UART and frame traffic cannot delay
/// the pulse timestamps.
#[embassy_executor::task]
async fn pulse_task(mut data_in: Input<'static>) {
    let mut framer = PulseFramer::new(PulseThresholds::default());
    let mut scanner = ButtonPacketScanner::new();
    let mut diag = Ticker::every(Duration::from_secs(5));

    info!("pulse decoder running");
    loop {
        match select(data_in.wait_for_any_edge(), diag.next()).await {
            Either::First(_) => {
                let now_us = Instant::now().as_micros();
                framer.on_edge(data_in.is_high(), now_us);

                scanner.scan(framer.capture(), |btn| {
                    if BUTTON_EVENTS.try_send(btn).is_err() {
                        defmt::warn!("button channel full, press dropped");
                    }
                });
            }
            Either::Second(_) => {
                let (falling, rising) = framer.edge_counts();
                defmt::debug!("pulse edges: {=u32} falling, {=u32} rising", falling, rising);
                framer
                    .raw_log()
                    .drain(|us| defmt::trace!("raw pulse {=u16} us", us));
            }
        }
    }
}

/// Clock out one byte at 62.5 kHz, MSB first. The head unit samples on
/// the rising clock edge. 8 us half-periods are busy-waited; the whole
/// byte blocks for 128 us.
fn send_cdc_byte(sck: &mut Output<'static>, mosi: &mut Output<'static>, byte: u8) {
    // 64 MHz core clock, 8 us half-period.
    const HALF_PERIOD_CYCLES: u32 = 512;
    for bit in (0..8).rev() {
        if byte & (1 << bit) != 0 {
            mosi.set_high();
        } else {
            mosi.set_low();
        }
        sck.set_low();
        cortex_m::asm::delay(HALF_PERIOD_CYCLES);
        sck.set_high();
        cortex_m::asm::delay(HALF_PERIOD_CYCLES);
    }
}

/// Display frame transmitter. One frame per 50 ms slot; a slot is
/// skipped rather than delayed when the link mutex is contended.
#[embassy_executor::task]
async fn cdc_tx_task(
    link: &'static LinkMutex,
    mut sck: Output<'static>,
    mut mosi: Output<'static>,
) {
    let mut ticker = Ticker::every(Duration::from_millis(CDC_FRAME_PERIOD_MS));
    loop {
        ticker.next().await;

        let frame = match with_timeout(LOCK_WAIT, link.lock()).await {
            Ok(mut link) => link.next_frame(Instant::now().as_millis()),
            Err(_) => continue,
        };

        for (i, byte) in frame.iter().enumerate() {
            send_cdc_byte(&mut sck, &mut mosi, *byte);
            if i < frame.len() - 1 {
                Timer::after_micros(CDC_INTER_BYTE_GAP_US).await;
            }
        }
    }
}

/// UART side of the BT1036: assembles response lines into the driver
/// and writes out whatever the command queue dispatches.
#[embassy_executor::task]
async fn bt_task(
    bt: &'static BtMutex,
    link: &'static LinkMutex,
    uarte: buffered_uarte::BufferedUarte<'static, UARTE0, TIMER1>,
) {
    let (mut rx, mut tx) = uarte.split();

    let rx_loop = async {
        let mut line: heapless::Vec<u8, BT_LINE_MAX> = heapless::Vec::new();
        let mut chunk = [0u8; 32];
        loop {
            let n = match rx.read(&mut chunk).await {
                Ok(n) => n,
                Err(_) => continue,
            };
            for &byte in &chunk[..n] {
                match byte {
                    b'\r' => {}
                    b'\n' => {
                        if let Ok(text) = core::str::from_utf8(&line) {
                            let now_ms = Instant::now().as_millis();
                            // A line lost to contention is recovered by
                            // the command timeout and the next poll.
                            let update = match with_timeout(LOCK_WAIT, bt.lock()).await {
                                Ok(mut bt) => bt.handle_line(text, now_ms, &mut NullObserver),
                                Err(_) => None,
                            };
                            // Track progress goes to the display link
                            // under its own lock, after the driver's is
                            // released.
                            if let Some(u) = update {
                                if let Ok(mut link) = with_timeout(LOCK_WAIT, link.lock()).await {
                                    link.set_play_time(u.minutes, u.seconds, now_ms);
                                }
                            }
                        }
                        line.clear();
                    }
                    b => {
                        // Runaway input without a newline is discarded.
                        if line.push(b).is_err() {
                            line.clear();
                        }
                    }
                }
            }
        }
    };

    let tx_loop = async {
        let mut ticker = Ticker::every(Duration::from_millis(50));
        loop {
            ticker.next().await;
            let cmd: Option<heapless::String<32>> = match with_timeout(LOCK_WAIT, bt.lock()).await {
                Ok(mut bt) => bt
                    .service(Instant::now().as_millis())
                    .and_then(|c| c.try_into().ok()),
                Err(_) => continue,
            };
            if let Some(cmd) = cmd {
                defmt::debug!("BT >> {}", cmd.as_str());
                if let Err(e) = send_command(&mut tx, &cmd).await {
                    defmt::warn!("BT uart write failed: {}", e);
                }
            }
        }
    };

    join(rx_loop, tx_loop).await;
}

/// Write one AT command line, CR/LF terminated.
async fn send_command(tx: &mut impl Write, cmd: &str) -> Result<(), Error> {
    tx.write_all(cmd.as_bytes()).await.map_err(|_| Error::Uart)?;
    tx.write_all(b"\r\n").await.map_err(|_| Error::Uart)?;
    Ok(())
}

/// Button handling and periodic housekeeping. The only task that takes
/// both mutexes, always link before driver.
#[embassy_executor::task]
async fn coordinator_task(link: &'static LinkMutex, bt: &'static BtMutex, nvmc: Nvmc<'static>) {
    let mut flash = embassy_embedded_hal::adapter::BlockingAsync::new(nvmc);

    let mut settings = SystemSettings::new();
    // Defaults already in place if the read fails, keep going.
    let _ = settings.load_from_flash(&mut flash).await;
    info!(
        "network config is {}",
        if settings.network_config_on { "ON" } else { "OFF" }
    );

    let mut coord = {
        let mut link = link.lock().await;
        Coordinator::new(&mut link)
    };

    let mut ticker = Ticker::every(Duration::from_millis(50));
    loop {
        let request = match with_timeout(Duration::from_millis(50), BUTTON_EVENTS.receive()).await {
            Ok(btn) => {
                let now_ms = Instant::now().as_millis();
                // Link first, then driver, both bounded. A press lost
                // to contention is no worse than a lost bus packet.
                match with_timeout(LOCK_WAIT, link.lock()).await {
                    Ok(mut link) => match with_timeout(LOCK_WAIT, bt.lock()).await {
                        Ok(mut bt) => coord.on_button(btn, now_ms, &mut link, &mut bt),
                        Err(_) => None,
                    },
                    Err(_) => None,
                }
            }
            Err(_) => None,
        };

        if let Some(SystemRequest::ToggleNetworkConfig) = request {
            settings.network_config_on = !settings.network_config_on;
            if settings.save_to_flash(&mut flash).await.is_err() {
                // Restart anyway, the toggle just will not stick.
                defmt::warn!("settings save failed");
            }

            let track = if settings.network_config_on {
                TRACK_NET_CONFIG_ON
            } else {
                TRACK_NET_CONFIG_OFF
            };
            if let Ok(mut link) = with_timeout(LOCK_WAIT, link.lock()).await {
                link.set_disc_track(1, track);
            }
            info!("network config toggled, restarting");

            // Leave the new track number on the display long enough to
            // be read before the restart.
            Timer::after_secs(2).await;
            cortex_m::peripheral::SCB::sys_reset();
        }

        ticker.next().await;
        {
            let now_ms = Instant::now().as_millis();
            // Housekeeping reruns every 50 ms; skip the cycle rather
            // than pile up behind a held lock.
            if let Ok(mut link) = with_timeout(LOCK_WAIT, link.lock()).await {
                if let Ok(mut bt) = with_timeout(LOCK_WAIT, bt.lock()).await {
                    coord.tick(now_ms, &mut link, &mut bt);
                }
            }
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_nrf::init(Default::default());
    info!("bt2cdc starting");

    let link = LINK.init(Mutex::new(CdcLink::new()));
    let bt = BT.init(Mutex::new(BtDriver::new(Instant::now().as_millis())));

    // Head-unit side: bit-banged display bus plus the DataOut pulse
    // input. Pins per the map in config.rs.
    let sck = Output::new(p.P0_18, Level::High, OutputDrive::Standard);
    let mosi = Output::new(p.P0_23, Level::High, OutputDrive::Standard);
    let data_in = Input::new(p.P0_04, Pull::Up);

    // BT1036 UART.
    let mut uarte_config = uarte::Config::default();
    uarte_config.baudrate = baudrate_for(BT_UART_BAUD);
    let uarte = buffered_uarte::BufferedUarte::new(
        p.UARTE0,
        p.TIMER1,
        p.PPI_CH0,
        p.PPI_CH1,
        p.PPI_GROUP0,
        Irqs,
        p.P0_16,
        p.P0_17,
        uarte_config,
        UARTE_RX_BUF.init([0; 256]),
        UARTE_TX_BUF.init([0; 256]),
    );

    // Pulse capture preempts everything else.
    embassy_nrf::interrupt::SWI1_EGU1.set_priority(Priority::P6);
    let high_spawner = EXECUTOR_HIGH.start(embassy_nrf::interrupt::SWI1_EGU1);
    unwrap!(high_spawner.spawn(pulse_task(data_in)));

    unwrap!(spawner.spawn(cdc_tx_task(link, sck, mosi)));
    unwrap!(spawner.spawn(bt_task(bt, link, uarte)));
    unwrap!(spawner.spawn(coordinator_task(link, bt, Nvmc::new(p.NVMC))));

    info!("all tasks running");
}

fn baudrate_for(baud: u32) -> uarte::Baudrate {
    match baud {
        9600 => uarte::Baudrate::BAUD9600,
        38400 => uarte::Baudrate::BAUD38400,
        57600 => uarte::Baudrate::BAUD57600,
        _ => uarte::Baudrate::BAUD115200,
    }
}
