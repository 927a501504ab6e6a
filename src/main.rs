//! devlocator firmware
//!
//! Drives an ESP-AT co-processor over UART, lists the access points it can
//! see on a fixed period, and emits the location payload as one line per
//! publish over serial. A companion on the serial port forwards the
//! payloads to the geolocation integration.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
compile_error!("select a board feature: xiao or m5stickc");

use core::sync::atomic::{AtomicBool, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{self, Uart, UartRx, UartTx};
use esp_hal::Blocking;

use devlocator::aggregator::{CheckFlags, NoCellular, PayloadBuilder, ScanReport};
use devlocator::board;
use devlocator::comm::{LineFramer, LineQueue, LineReceiver};
use devlocator::command::{dispatch_scan_line, AtError, CommandProtocol, ResponseSession};
use devlocator::defaults::{
    CMD_ATTENTION, CMD_LIST_APS, CMD_SETUP, COMMAND_TIMEOUT_MS, DEFAULT_PERIOD_SECS,
    MAX_PAYLOAD_LEN,
};
use devlocator::locator::{CloudLink, DeviceLocator, EventName, LocatorAction};
use devlocator::protocol::{PayloadError, VERSION};
use devlocator::scanner::AccessPointRecord;
use devlocator::transport::{PacketRead, PacketWrite, ReadError};

/// Main loop tick interval
const TICK_INTERVAL_MS: u64 = 100;

// ── Static channels and shared state ─────────────────────────────────

/// Response lines from the co-processor, filled by the receiver task
static LINE_QUEUE: LineQueue = LineQueue::new();

/// One location publish, rendered on the serial console
struct Publication {
    event: EventName,
    data: heapless::String<MAX_PAYLOAD_LEN>,
}

type PublishChannel = Channel<CriticalSectionRawMutex, Publication, 2>;

/// Static channel for publishes waiting for the serial output task
static PUBLISH_CHANNEL: PublishChannel = Channel::new();

/// Set once the co-processor answers `AT`
static LINK_UP: AtomicBool = AtomicBool::new(false);

// ── UART transport ───────────────────────────────────────────────────

/// Read half of the AT UART, framed into one packet per line.
struct UartLineRx {
    uart: UartRx<'static, Blocking>,
    framer: LineFramer,
}

impl PacketRead for UartLineRx {
    type Error = uart::RxError;

    fn data_pending(&mut self) -> bool {
        self.uart.read_ready()
    }

    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, ReadError<uart::RxError>> {
        let mut byte = [0u8; 1];
        while self.uart.read_ready() {
            self.uart.read(&mut byte).map_err(ReadError::Io)?;
            if let Some(line) = self.framer.feed(byte[0]) {
                let len = line.len().min(buf.len());
                buf[..len].copy_from_slice(&line[..len]);
                return Ok(len);
            }
        }
        Err(ReadError::Incomplete)
    }
}

/// Write half of the AT UART.
struct UartLinkTx {
    uart: UartTx<'static, Blocking>,
}

impl PacketWrite for UartLinkTx {
    type Error = uart::TxError;

    fn write_packet(&mut self, data: &[u8]) -> Result<(), uart::TxError> {
        let mut rest = data;
        while !rest.is_empty() {
            let n = self.uart.write(rest)?;
            rest = &rest[n..];
        }
        self.uart.flush()
    }
}

// ── Cloud sink ───────────────────────────────────────────────────────

/// Publishes to the serial console. Connected while the co-processor is up.
struct SerialCloud;

impl CloudLink for SerialCloud {
    fn connected(&self) -> bool {
        LINK_UP.load(Ordering::Relaxed)
    }

    fn publish(&mut self, event: &str, data: &str) -> bool {
        let (Ok(event), Ok(data)) = (EventName::try_from(event), heapless::String::try_from(data))
        else {
            return false;
        };
        PUBLISH_CHANNEL.try_send(Publication { event, data }).is_ok()
    }

    fn subscribe(&mut self, topic: &str) -> bool {
        log::info!("no reply path on serial, not subscribing to {}", topic);
        false
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Heap for the response line queue
    esp_alloc::heap_allocator!(size: 32 * 1024);

    // Start the RTOS: needs a timer and a software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("devlocator v{} starting on {}", VERSION, board::BOARD_NAME);

    #[cfg(feature = "board-xiao")]
    let (tx_pin, rx_pin, en_pin) = (peripherals.GPIO43, peripherals.GPIO44, peripherals.GPIO3);
    #[cfg(feature = "board-m5stickc")]
    let (tx_pin, rx_pin, en_pin) = (peripherals.GPIO32, peripherals.GPIO33, peripherals.GPIO26);

    // Hold power on (M5StickC Plus2 needs GPIO4 HIGH to stay powered)
    #[cfg(feature = "board-m5stickc")]
    let _power_hold = Output::new(peripherals.GPIO4, Level::High, OutputConfig::default());

    log::info!(
        "AT link: UART1 tx=GPIO{} rx=GPIO{} en=GPIO{} @ {} baud",
        board::AT_TX_PIN,
        board::AT_RX_PIN,
        board::AT_EN_PIN,
        board::AT_BAUD_RATE
    );

    // Power-cycle the co-processor so it starts from a known state
    let mut at_enable = Output::new(en_pin, Level::Low, OutputConfig::default());
    Timer::after(Duration::from_millis(board::RESET_HOLD_MS)).await;
    at_enable.set_high();

    let config = uart::Config::default().with_baudrate(board::AT_BAUD_RATE);
    let (uart_rx, uart_tx) = Uart::new(peripherals.UART1, config)
        .expect("AT UART config failed")
        .with_tx(tx_pin)
        .with_rx(rx_pin)
        .split();

    spawner
        .spawn(line_receiver_task(UartLineRx {
            uart: uart_rx,
            framer: LineFramer::new(),
        }))
        .unwrap();
    spawner.spawn(output_serial_task()).unwrap();

    Timer::after(Duration::from_millis(board::BOOT_WAIT_MS)).await;

    let mut protocol = CommandProtocol::new(UartLinkTx { uart: uart_tx }, &LINE_QUEUE);

    while !matches!(run_command(&mut protocol, CMD_ATTENTION).await, Ok(true)) {
        log::warn!("co-processor not answering, retrying");
        Timer::after(Duration::from_secs(1)).await;
    }
    for command in CMD_SETUP {
        if !matches!(run_command(&mut protocol, command).await, Ok(true)) {
            log::warn!("setup command failed: {}", command.trim_end());
        }
    }
    LINK_UP.store(true, Ordering::Relaxed);
    log::info!("co-processor ready");

    let mut cloud = SerialCloud;
    let mut locator = DeviceLocator::new()
        .with_locate_periodic(DEFAULT_PERIOD_SECS)
        .with_check_flags(CheckFlags::WIFI);

    loop {
        let now = Instant::now().as_millis();
        if let Some(LocatorAction::Publish) = locator.tick(now, cloud.connected()) {
            log::info!("publishing location");
            match scan_location(&mut protocol, locator.checks()).await {
                Ok(report) => {
                    locator.publish_report(&report, &mut cloud);
                }
                Err(e) => log::warn!("location payload: {}", e),
            }
        }
        Timer::after(Duration::from_millis(TICK_INTERVAL_MS)).await;
    }
}

// ── AT exchanges ─────────────────────────────────────────────────────

/// Consume response lines until the terminal line, yielding to other tasks
/// while the queue is empty.
async fn wait_response<F: FnMut(&str)>(
    mut session: ResponseSession<'_>,
    mut on_line: F,
) -> Result<bool, AtError> {
    let deadline = Instant::now() + Duration::from_millis(COMMAND_TIMEOUT_MS);
    loop {
        if let Some(ok) = session.poll(&mut on_line) {
            return Ok(ok);
        }
        if Instant::now() >= deadline {
            return Err(AtError::Timeout);
        }
        embassy_futures::yield_now().await;
    }
}

async fn run_command(
    protocol: &mut CommandProtocol<'static, UartLinkTx>,
    command: &str,
) -> Result<bool, AtError> {
    let session = protocol.begin(command);
    wait_response(session, |line| log::debug!("< {}", line)).await
}

/// Access point scan feeding a payload builder.
async fn scan_location(
    protocol: &mut CommandProtocol<'static, UartLinkTx>,
    checks: CheckFlags,
) -> Result<ScanReport, PayloadError> {
    let mut builder = PayloadBuilder::new(checks);

    if checks.wifi {
        let session = protocol.begin(CMD_LIST_APS);
        let mut add = |ap: &AccessPointRecord| builder.add_access_point(ap);
        match wait_response(session, |line| dispatch_scan_line(line, &mut add)).await {
            Ok(true) => {}
            Ok(false) => log::warn!("wifi scan reported ERROR"),
            Err(e) => log::warn!("wifi scan: {}", e),
        }
        log::info!(
            "wifi scan: {} access points, {} kept",
            builder.wifi_seen(),
            builder.wifi_entries().len()
        );
    }

    if checks.cellular {
        builder.add_cellular(&mut NoCellular);
    }

    builder.finish()
}

// ── Tasks ────────────────────────────────────────────────────────────

/// Line receiver task: drains the AT UART into the line queue forever.
#[embassy_executor::task]
async fn line_receiver_task(link: UartLineRx) {
    log::info!("Line receiver task started");

    let mut receiver = LineReceiver::new(link, &LINE_QUEUE);
    loop {
        receiver.poll();
        embassy_futures::yield_now().await;
    }
}

/// Serial output task: writes each publish as one line to serial.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let publish_rx = PUBLISH_CHANNEL.receiver();

    loop {
        let msg = publish_rx.receive().await;
        esp_println::println!("{} {}", msg.event, msg.data);
    }
}
