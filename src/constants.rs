//! Omnimeter Protocol Constants
//!
//! Wire level constants shared by the frame builders, the transport and the
//! decoders.

/// Positive acknowledgement returned by the meter after a command frame.
pub const OMNI_ACK: u8 = 0x06;

/// Length of every read response (A, B, schedules, holidays, months).
pub const OMNI_FRAME_LEN: usize = 255;

/// Start of header, leading byte of command frames and of read responses.
pub const OMNI_SOH: u8 = 0x01;

/// Start of text, separates command letter pair from the subcommand.
pub const OMNI_STX: u8 = 0x02;

/// End of text, closes the parameter block.
pub const OMNI_ETX: u8 = 0x03;

/// Fixed frame returning the meter to its idle receive state.
pub const OMNI_TERMINATOR: [u8; 5] = [0x01, b'B', b'0', 0x03, b'u'];

/// Prefix of every read query (`/?`).
pub const OMNI_QUERY_PREFIX: &[u8] = b"/?";

/// Suffix of every read query (`!` CR LF).
pub const OMNI_QUERY_SUFFIX: &[u8] = b"!\r\n";

/// Query selector for the v4 A frame.
pub const OMNI_V4_SELECT_A: &[u8] = b"00";

/// Query selector for the v4 B frame.
pub const OMNI_V4_SELECT_B: &[u8] = b"01";

/// Number of characters in a meter address.
pub const OMNI_ADDRESS_LEN: usize = 12;

/// Number of characters in a meter password.
pub const OMNI_PASSWORD_LEN: usize = 8;

/// Factory password.
pub const OMNI_DEFAULT_PASSWORD: &str = "00000000";

/// Bytes of an incoming frame covered by the checksum (`raw[1..253]`).
pub const OMNI_CHECKSUM_START: usize = 1;
pub const OMNI_CHECKSUM_END: usize = OMNI_FRAME_LEN - 2;

/// Name of the checksum field present in every response layout.
pub const OMNI_CRC_FIELD: &str = "crc16";

/// Mask keeping both checksum bytes 7-bit clean.
pub const OMNI_CHECKSUM_MASK: u16 = 0x7F7F;

/// Number of LCD slots in the display list command.
pub const OMNI_LCD_SLOTS: usize = 40;

/// Largest relay hold time in seconds (0 holds forever).
pub const OMNI_RELAY_MAX_SECONDS: u16 = 9999;

/// Largest value of a four digit ratio field.
pub const OMNI_RATIO_MAX: u16 = 9999;

/// Configurable sizes of the meter tables.
pub struct Extents;

impl Extents {
    pub const SEASONS: usize = 4;
    pub const HOLIDAYS: usize = 20;
    pub const TARIFFS: usize = 4;
    pub const SCHEDULES: usize = 8;
    pub const MONTHS: usize = 6;
}
