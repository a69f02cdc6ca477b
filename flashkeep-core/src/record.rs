//! Persisted record layout
//!
//! The record is a fixed-size block at the start of a single flash page:
//!
//! ```text
//! offset  size  field
//! 0       4     magic (little-endian u32, RECORD_MAGIC)
//! 4       40    ssid, NUL-terminated, NUL-padded
//! 44      40    password, NUL-terminated, NUL-padded
//! ```
//!
//! The rest of the page is left erased.

use flashkeep_hal::{ERASED_BYTE, PAGE_SIZE};
use heapless::String;

/// Sentinel marking a record that was written by this firmware
pub const RECORD_MAGIC: u32 = 0xA5A5_DEAA;

/// Size of the magic field in bytes
pub const MAGIC_SIZE: usize = 4;

/// Size of each text field in bytes, terminator included
pub const TEXT_FIELD_SIZE: usize = 40;

/// Longest text a field can hold
pub const MAX_TEXT_LEN: usize = TEXT_FIELD_SIZE - 1;

/// Serialized record size
pub const RECORD_SIZE: usize = MAGIC_SIZE + 2 * TEXT_FIELD_SIZE;

const SSID_START: usize = MAGIC_SIZE;
const PASSWORD_START: usize = SSID_START + TEXT_FIELD_SIZE;

// One program operation must cover the whole record
const _: () = assert!(RECORD_SIZE <= PAGE_SIZE);

/// Placeholder SSID written on first boot
pub const DEFAULT_SSID: &str = "MySSID";

/// Placeholder password written on first boot
pub const DEFAULT_PASSWORD: &str = "MyPassword";

/// Errors building or decoding a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// Fewer than `RECORD_SIZE` bytes supplied
    Truncated,
    /// Text does not fit in a field with its terminator
    TooLong,
    /// Text contains a NUL byte
    InteriorNul,
    /// Stored field has no terminator
    Unterminated,
    /// Stored field is not UTF-8
    InvalidText,
}

/// Text that fits in one record field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoundedText(String<MAX_TEXT_LEN>);

impl BoundedText {
    /// Create from a string, rejecting anything the layout cannot hold
    pub fn new(text: &str) -> Result<Self, LayoutError> {
        if text.len() > MAX_TEXT_LEN {
            return Err(LayoutError::TooLong);
        }
        if text.contains('\0') {
            return Err(LayoutError::InteriorNul);
        }

        let mut inner = String::new();
        inner.push_str(text).map_err(|_| LayoutError::TooLong)?;
        Ok(Self(inner))
    }

    /// Create from a string, keeping whole characters up to the first NUL
    /// or the field limit
    pub fn truncated(text: &str) -> Self {
        let mut inner = String::new();
        for ch in text.chars().take_while(|&c| c != '\0') {
            if inner.push(ch).is_err() {
                break;
            }
        }
        Self(inner)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn encode_into(&self, field: &mut [u8]) {
        field.fill(0);
        field[..self.len()].copy_from_slice(self.0.as_bytes());
    }

    /// Best-effort decode of a stored field
    ///
    /// Keeps bytes up to the first NUL (or the end of the field), then the
    /// longest UTF-8 prefix of those, capped at [`MAX_TEXT_LEN`].
    fn decode_lossy(field: &[u8]) -> Self {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let bytes = &field[..end];
        let text = match core::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        };
        Self::truncated(text)
    }

    fn decode(field: &[u8]) -> Result<Self, LayoutError> {
        let end = field
            .iter()
            .position(|&b| b == 0)
            .ok_or(LayoutError::Unterminated)?;
        let text = core::str::from_utf8(&field[..end]).map_err(|_| LayoutError::InvalidText)?;
        Self::new(text)
    }
}

/// Credentials record as stored in flash
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Record {
    /// Validation sentinel
    pub magic: u32,
    /// Network name
    pub ssid: BoundedText,
    /// Network passphrase
    pub password: BoundedText,
}

impl Default for Record {
    fn default() -> Self {
        Self::default_record()
    }
}

impl Record {
    /// Record written when flash holds no valid record
    pub fn default_record() -> Self {
        Self {
            magic: RECORD_MAGIC,
            ssid: BoundedText::truncated(DEFAULT_SSID),
            password: BoundedText::truncated(DEFAULT_PASSWORD),
        }
    }

    /// Build a valid record from caller-supplied credentials
    pub fn with_credentials(ssid: &str, password: &str) -> Result<Self, LayoutError> {
        Ok(Self {
            magic: RECORD_MAGIC,
            ssid: BoundedText::new(ssid)?,
            password: BoundedText::new(password)?,
        })
    }

    /// Check the sentinel
    pub fn is_valid(&self) -> bool {
        self.magic == RECORD_MAGIC
    }

    /// Serialize to the flash layout
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[..MAGIC_SIZE].copy_from_slice(&self.magic.to_le_bytes());
        self.ssid.encode_into(&mut bytes[SSID_START..PASSWORD_START]);
        self.password.encode_into(&mut bytes[PASSWORD_START..RECORD_SIZE]);
        bytes
    }

    /// Serialize into a full page, leaving the tail erased
    pub fn encode_page(&self) -> [u8; PAGE_SIZE] {
        let mut page = [ERASED_BYTE; PAGE_SIZE];
        page[..RECORD_SIZE].copy_from_slice(&self.encode());
        page
    }

    /// Deserialize a record whose sentinel already matched
    ///
    /// Never fails: a field without a terminator is cut at the field limit
    /// and invalid UTF-8 is cut at the first bad byte.
    pub fn decode_lossy(bytes: &[u8; RECORD_SIZE]) -> Self {
        Self {
            magic: read_magic(bytes),
            ssid: BoundedText::decode_lossy(&bytes[SSID_START..PASSWORD_START]),
            password: BoundedText::decode_lossy(&bytes[PASSWORD_START..RECORD_SIZE]),
        }
    }

    /// Deserialize from the flash layout, rejecting malformed fields
    ///
    /// Does not check the magic; use [`is_valid`] on the raw bytes first.
    pub fn decode(bytes: &[u8]) -> Result<Self, LayoutError> {
        if bytes.len() < RECORD_SIZE {
            return Err(LayoutError::Truncated);
        }

        Ok(Self {
            magic: read_magic(bytes),
            ssid: BoundedText::decode(&bytes[SSID_START..PASSWORD_START])?,
            password: BoundedText::decode(&bytes[PASSWORD_START..RECORD_SIZE])?,
        })
    }
}

fn read_magic(bytes: &[u8]) -> u32 {
    let mut magic = [0u8; MAGIC_SIZE];
    magic.copy_from_slice(&bytes[..MAGIC_SIZE]);
    u32::from_le_bytes(magic)
}

/// True iff `bytes` starts with the record sentinel
///
/// Anything after the first four bytes is ignored.
pub fn is_valid(bytes: &[u8]) -> bool {
    bytes.len() >= MAGIC_SIZE && read_magic(bytes) == RECORD_MAGIC
}

/// True iff every byte is in the erased state
pub fn is_erased(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == ERASED_BYTE)
}

/// Record with the sentinel and placeholder credentials
pub fn default_record() -> Record {
    Record::default_record()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_record() {
        let record = default_record();
        assert!(record.is_valid());
        assert_eq!(record.ssid.as_str(), "MySSID");
        assert_eq!(record.password.as_str(), "MyPassword");
    }

    #[test]
    fn test_encode_layout() {
        let bytes = default_record().encode();

        // Magic is little-endian
        assert_eq!(&bytes[..4], &[0xAA, 0xDE, 0xA5, 0xA5]);
        assert_eq!(&bytes[4..10], b"MySSID");
        assert!(bytes[10..44].iter().all(|&b| b == 0));
        assert_eq!(&bytes[44..54], b"MyPassword");
        assert!(bytes[54..84].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_page_leaves_tail_erased() {
        let page = default_record().encode_page();
        assert_eq!(&page[..RECORD_SIZE], &default_record().encode()[..]);
        assert!(is_erased(&page[RECORD_SIZE..]));
    }

    #[test]
    fn test_text_bounds() {
        let longest = "x".repeat(MAX_TEXT_LEN);
        assert!(BoundedText::new(&longest).is_ok());

        let too_long = "x".repeat(TEXT_FIELD_SIZE);
        assert_eq!(BoundedText::new(&too_long), Err(LayoutError::TooLong));
        assert_eq!(BoundedText::new("a\0b"), Err(LayoutError::InteriorNul));
    }

    #[test]
    fn test_truncated_stops_at_limit_and_nul() {
        let long = "y".repeat(60);
        assert_eq!(BoundedText::truncated(&long).len(), MAX_TEXT_LEN);
        assert_eq!(BoundedText::truncated("ab\0cd").as_str(), "ab");

        // Never splits a multi-byte character
        let wide = "é".repeat(30);
        let text = BoundedText::truncated(&wide);
        assert_eq!(text.len(), 38);
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = default_record().encode();
        assert_eq!(
            Record::decode(&bytes[..RECORD_SIZE - 1]),
            Err(LayoutError::Truncated)
        );
    }

    #[test]
    fn test_decode_unterminated_field() {
        let mut bytes = default_record().encode();
        bytes[SSID_START..PASSWORD_START].fill(b'a');
        assert_eq!(Record::decode(&bytes), Err(LayoutError::Unterminated));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut bytes = default_record().encode();
        bytes[PASSWORD_START] = 0xC3;
        bytes[PASSWORD_START + 1] = 0x28;
        assert_eq!(Record::decode(&bytes), Err(LayoutError::InvalidText));
    }

    #[test]
    fn test_decode_erased_flash() {
        let bytes = [ERASED_BYTE; RECORD_SIZE];
        assert!(!is_valid(&bytes));
        assert!(is_erased(&bytes));
        assert_eq!(Record::decode(&bytes), Err(LayoutError::Unterminated));
    }

    #[test]
    fn test_decode_lossy_stops_at_bad_utf8() {
        let mut bytes = default_record().encode();
        bytes[SSID_START..SSID_START + 5].copy_from_slice(b"Caf\xE9\0");

        let record = Record::decode_lossy(&bytes);
        assert_eq!(record.ssid.as_str(), "Caf");
        assert_eq!(record.password.as_str(), "MyPassword");
    }

    #[test]
    fn test_decode_lossy_unterminated_field() {
        let mut bytes = default_record().encode();
        bytes[PASSWORD_START..RECORD_SIZE].fill(b'p');

        let record = Record::decode_lossy(&bytes);
        assert_eq!(record.password.len(), MAX_TEXT_LEN);
        assert!(record.password.as_str().bytes().all(|b| b == b'p'));
    }

    #[test]
    fn test_decode_lossy_erased_fields() {
        let mut bytes = [ERASED_BYTE; RECORD_SIZE];
        bytes[..MAGIC_SIZE].copy_from_slice(&RECORD_MAGIC.to_le_bytes());

        let record = Record::decode_lossy(&bytes);
        assert!(record.is_valid());
        assert!(record.ssid.is_empty());
        assert!(record.password.is_empty());
    }

    #[test]
    fn test_is_valid_short_buffer() {
        assert!(!is_valid(&[]));
        assert!(!is_valid(&[0xAA, 0xDE, 0xA5]));
        assert!(is_valid(&[0xAA, 0xDE, 0xA5, 0xA5]));
    }

    proptest! {
        #[test]
        fn prop_magic_gates_validity(
            magic in any::<u32>(),
            tail in proptest::collection::vec(any::<u8>(), 0..300),
        ) {
            let mut bytes = magic.to_le_bytes().to_vec();
            bytes.extend_from_slice(&tail);
            prop_assert_eq!(is_valid(&bytes), magic == RECORD_MAGIC);
        }

        #[test]
        fn prop_sentinel_valid_regardless_of_tail(
            tail in proptest::collection::vec(any::<u8>(), 0..300),
        ) {
            let mut bytes = RECORD_MAGIC.to_le_bytes().to_vec();
            bytes.extend_from_slice(&tail);
            prop_assert!(is_valid(&bytes));
        }

        #[test]
        fn prop_decode_lossy_agrees_with_strict(
            bytes in proptest::collection::vec(any::<u8>(), RECORD_SIZE),
        ) {
            let mut raw = [0u8; RECORD_SIZE];
            raw.copy_from_slice(&bytes);

            let lossy = Record::decode_lossy(&raw);
            prop_assert!(lossy.ssid.len() <= MAX_TEXT_LEN);
            prop_assert!(lossy.password.len() <= MAX_TEXT_LEN);
            if let Ok(strict) = Record::decode(&raw) {
                prop_assert_eq!(lossy, strict);
            }
        }

        #[test]
        fn prop_encode_decode(ssid in "[ -~]{0,39}", password in "[ -~]{0,39}") {
            let record = Record::with_credentials(&ssid, &password).unwrap();
            let decoded = Record::decode(&record.encode()).unwrap();
            prop_assert_eq!(decoded, record);
        }
    }
}
