/// Wiring between the host board and the ESP-AT co-processor.
///
/// Each board module defines the UART and control pins used for the AT
/// link, selected at compile time via feature flags.

/// ESP-AT factory default baud rate
pub const AT_BAUD_RATE: u32 = 115_200;

/// How long the co-processor is held in reset at startup
pub const RESET_HOLD_MS: u64 = 100;

/// Boot time of the ESP-AT firmware after reset is released
pub const BOOT_WAIT_MS: u64 = 2_000;

#[cfg(feature = "board-xiao")]
mod hw {
    pub const AT_TX_PIN: u8 = 43; // D6, to co-processor RX
    pub const AT_RX_PIN: u8 = 44; // D7, from co-processor TX
    pub const AT_EN_PIN: u8 = 3; // D2, co-processor CHIP_EN
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(feature = "board-m5stickc")]
mod hw {
    // Grove port
    pub const AT_TX_PIN: u8 = 32;
    pub const AT_RX_PIN: u8 = 33;
    pub const AT_EN_PIN: u8 = 26; // Top header
    pub const BOARD_NAME: &str = "m5stickc_plus2";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;
