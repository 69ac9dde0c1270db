//! Length-hiding padding for envelope formats.
//!
//! Padded plaintext is `data || 0x80 || 0x00*`. `unpadded_size` scans the
//! trailing zeros back to the 0x80 boundary byte, which is then removed.
//! Automatic padding rounds to the next power of two (with a floor) so
//! ciphertext lengths leak only the magnitude of the plaintext.

use crate::error::CryptoError;

/// Smallest padded size the automatic policy will produce.
const MINIMAL_PADDING: u64 = 10;

/// Padding policy, chosen by the caller at encryption time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    /// Next power of two ≥ `clearSize + 1`, never below `MINIMAL_PADDING`.
    #[default]
    Auto,
    /// No length hiding; only the boundary byte is added.
    Off,
    /// Next multiple of the step ≥ `clearSize + 1`. The step must be ≥ 2.
    Step(u32),
}

impl Padding {
    pub fn step(step: u32) -> Result<Self, CryptoError> {
        if step < 2 {
            return Err(CryptoError::InvalidKey(format!(
                "padding step must be at least 2, got {step}"
            )));
        }
        Ok(Padding::Step(step))
    }
}

/// Padded length for a clear length (boundary byte included).
pub fn padded_from_clear_size(clear_size: u64, padding: Padding) -> u64 {
    let with_boundary = clear_size + 1;
    match padding {
        Padding::Off => with_boundary,
        Padding::Auto => with_boundary.next_power_of_two().max(MINIMAL_PADDING),
        Padding::Step(step) => {
            let step = u64::from(step);
            with_boundary.div_ceil(step) * step
        }
    }
}

/// Append the boundary byte and zero fill up to the padded size.
pub fn pad_clear_data(clear_data: &[u8], padding: Padding) -> Vec<u8> {
    let padded_size = padded_from_clear_size(clear_data.len() as u64, padding) as usize;
    let mut out = Vec::with_capacity(padded_size);
    out.extend_from_slice(clear_data);
    out.push(0x80);
    out.resize(padded_size, 0x00);
    out
}

/// Length of the original data inside a padded buffer.
pub fn unpadded_size(padded_data: &[u8]) -> Result<usize, CryptoError> {
    let boundary = padded_data
        .iter()
        .rposition(|b| *b != 0x00)
        .ok_or(CryptoError::InvalidPadding)?;
    if padded_data[boundary] != 0x80 {
        return Err(CryptoError::InvalidPadding);
    }
    Ok(boundary)
}
