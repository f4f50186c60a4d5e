//! NPI Coprocessor Main Application
//!
//! Entry point for the STM32G474-based network processor.
//! Brings up the NPI link, MRDY as the host wake line and SRDY as the
//! awake indicator, then runs the NPI task. USART1 carries the link by
//! default; the `transport-i2c` feature serves it from the I2C1 slave.

#![no_std]
#![no_main]

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_stm32::{bind_interrupts, peripherals, Peripherals};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use npi_firmware::prelude::*;

/// Interrupt-side NPI state
static SHARED: NpiShared = NpiShared::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("NPI coprocessor v{}", env!("CARGO_PKG_VERSION"));

    let p = embassy_stm32::init(embassy_stm32::Config::default());
    link::start(p, &spawner);
}

/// Ticks without host traffic before releasing the sleep vote
const SLEEP_AFTER_TICKS: u32 = 1_000;

/// Idle tick shared by both links
fn ticker() -> Ticker {
    Ticker::every(Duration::from_millis(u64::from(UART_IDLE_TIMEOUT_MS)))
}

/// Ask for sleep once the host has been quiet long enough
fn after_pass<L: Link>(ctx: &mut NpiContext<'_, L, DemoHandler>) {
    if ctx.handler().idle_ticks > SLEEP_AFTER_TICKS && ctx.power_state() == PowerState::Hold {
        ctx.request_sleep();
    }
    ctx.handler_mut().idle_ticks += 1;
}

#[cfg(not(feature = "transport-i2c"))]
mod link {
    //! USART1 link with SRDY reporting the power vote

    use embassy_stm32::usart::{self, BufferedUart};

    use npi_firmware::hal::{HandshakePins, IoUart};

    use super::*;

    bind_interrupts!(struct Irqs {
        USART1 => usart::BufferedInterruptHandler<peripherals::USART1>;
    });

    static TX_BUF: StaticCell<[u8; UART_TX_BUFFER_SIZE]> = StaticCell::new();
    static RX_BUF: StaticCell<[u8; UART_RX_BUFFER_SIZE]> = StaticCell::new();

    type NpiPins = HandshakePins<Output<'static>, ExtiInput<'static>>;

    pub fn start(p: Peripherals, spawner: &Spawner) {
        let mut uart_config = usart::Config::default();
        uart_config.baudrate = UART_BAUD_RATE;

        // PA10 = RX, PA9 = TX
        let uart = match BufferedUart::new(
            p.USART1,
            Irqs,
            p.PA10,
            p.PA9,
            TX_BUF.init([0; UART_TX_BUFFER_SIZE]),
            RX_BUF.init([0; UART_RX_BUFFER_SIZE]),
            uart_config,
        ) {
            Ok(uart) => uart,
            Err(_) => defmt::panic!("USART1 configuration rejected"),
        };

        // PB0 = SRDY (active low), PB1 = MRDY (active low, EXTI1)
        let srdy = Output::new(p.PB0, Level::High, Speed::Low);
        let mrdy = ExtiInput::new(p.PB1, p.EXTI1, Pull::Up);
        let handshake = HandshakePins::new(srdy, mrdy);

        info!("USART1 at {} baud, SRDY {}, MRDY {}", UART_BAUD_RATE, pins::SRDY, pins::MRDY);

        defmt::unwrap!(spawner.spawn(npi_task(uart, handshake)));
    }

    /// NPI task: runs one processing pass per wake edge or idle tick
    #[embassy_executor::task]
    async fn npi_task(uart: BufferedUart<'static>, mut handshake: NpiPins) {
        let link = UartLink::new(IoUart::new(uart));
        let mut ctx = NpiContext::new(&SHARED, link, DemoHandler::default(), NpiConfig::default());
        if let Err(e) = ctx.init() {
            warn!("npi init failed: {}", e);
            return;
        }

        let mut ticker = ticker();
        loop {
            match select(ticker.next(), handshake.mrdy_pin_mut().wait_for_any_edge()).await {
                Either::First(()) => SHARED.on_uart_idle(),
                Either::Second(()) => {
                    if handshake.sample_mrdy() {
                        SHARED.on_wake_interrupt();
                    }
                }
            }

            let vote = ctx.process();
            handshake.set_srdy(vote == PowerVote::Hold);
            after_pass(&mut ctx);
        }
    }
}

#[cfg(feature = "transport-i2c")]
mod link {
    //! I2C1 slave link; the handshake engine drives SRDY

    use embassy_stm32::i2c::{self, Address, I2c, OwnAddresses, SlaveAddrConfig};
    use embassy_stm32::time::Hertz;

    use npi_firmware::hal::{I2cAddress, I2cSlave, SrdyLine};
    use npi_firmware::protocol::handshake::{HandshakeEngine, HandshakeMode};
    use npi_firmware::transport::slave::{SlaveServer, SlaveState};

    use super::*;

    bind_interrupts!(struct Irqs {
        I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
        I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
    });

    type Srdy = SrdyLine<Output<'static>>;
    type Engine = HandshakeEngine<'static, Srdy>;

    static ENGINE: StaticCell<Engine> = StaticCell::new();
    static SLAVE: SlaveState = SlaveState::new();

    pub fn start(p: Peripherals, spawner: &Spawner) {
        let address = I2cAddress::new(I2C_SLAVE_ADDR);

        // PB8 = SCL, PB9 = SDA
        let i2c = I2c::new(
            p.I2C1,
            p.PB8,
            p.PB9,
            Irqs,
            p.DMA1_CH1,
            p.DMA1_CH2,
            Hertz(I2C_FREQUENCY_HZ),
            i2c::Config::default(),
        )
        .into_slave_multimaster(SlaveAddrConfig {
            addr: OwnAddresses::OA1(Address::SevenBit(address.addr())),
            general_call: false,
        });

        // PB0 = SRDY (active low), PB1 = MRDY (active low, EXTI1)
        let srdy = SrdyLine::new(Output::new(p.PB0, Level::High, Speed::Low));
        let mrdy = ExtiInput::new(p.PB1, p.EXTI1, Pull::Up);
        let engine: &'static Engine = ENGINE.init(HandshakeEngine::new(&SHARED, HandshakeMode::I2c, srdy));

        info!("I2C1 slave at {}, SCL {}, SDA {}", address, pins::I2C_SCL, pins::I2C_SDA);

        let server = SlaveServer::new(I2cSlave::new(i2c, address), engine, &SLAVE);
        defmt::unwrap!(spawner.spawn(slave_task(server)));
        defmt::unwrap!(spawner.spawn(npi_task(engine, mrdy)));
    }

    /// Serves host transactions until the bus cannot be configured
    #[embassy_executor::task]
    async fn slave_task(mut server: SlaveServer<'static, I2cSlave<'static>, Srdy>) {
        let e = server.run().await;
        warn!("i2c slave stopped: {}", e);
    }

    /// NPI task: runs one processing pass per MRDY edge or idle tick
    #[embassy_executor::task]
    async fn npi_task(engine: &'static Engine, mut mrdy: ExtiInput<'static>) {
        let link = HandshakeLink::new(SLAVE.control(TransportKind::I2c), engine);
        let config = NpiConfig::new(TransportKind::I2c);
        let mut ctx = NpiContext::new(&SHARED, link, DemoHandler::default(), config);
        if let Err(e) = ctx.init() {
            warn!("npi init failed: {}", e);
            return;
        }

        let mut ticker = ticker();
        loop {
            if let Either::Second(()) = select(ticker.next(), mrdy.wait_for_any_edge()).await {
                let asserted = mrdy.is_low();
                engine.with_pins(|pins| pins.set_mrdy(asserted));
                engine.on_mrdy();
                if asserted {
                    SHARED.on_wake_interrupt();
                }
            }

            ctx.process();
            after_pass(&mut ctx);
        }
    }
}

/// SYS subsystem: ping
const SYS_PING: u8 = 0x01;
/// SYS subsystem: firmware version
const SYS_VERSION: u8 = 0x02;
/// UTIL subsystem: loopback
const UTIL_LOOPBACK: u8 = 0x10;

/// Minimal upper layer answering SYS ping/version and UTIL loopback
#[derive(Default)]
struct DemoHandler {
    idle_ticks: u32,
    notifications: u32,
}

impl Handler for DemoHandler {
    fn on_async(&mut self, msg: &Envelope) {
        self.idle_ticks = 0;
        self.notifications = self.notifications.wrapping_add(1);
        info!("host notification {} on {}", msg.command_id(), msg.subsystem());
    }

    fn on_sync(&mut self, msg: &mut Envelope) -> SyncReply {
        self.idle_ticks = 0;
        let reply: &[u8] = match (msg.subsystem(), msg.command_id()) {
            (Subsystem::SYS, SYS_PING) => &[0x79, 0x01],
            (Subsystem::SYS, SYS_VERSION) => &[0x02, 0x00, 0x01, 0x00],
            (Subsystem::UTIL, UTIL_LOOPBACK) => return SyncReply::Reply,
            _ => return SyncReply::NoReply,
        };
        match msg.set_payload(reply) {
            Ok(()) => SyncReply::Reply,
            Err(_) => SyncReply::NoReply,
        }
    }
}
