//! Content fingerprints used as scan cache keys.
//!
//! The hash is 64-bit FNV-1a with the payload length folded in. It is fast and
//! deterministic but has no collision resistance, so it must never be used for
//! anything security-sensitive.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Default number of sample windows in [`FingerprintMode::Sampled`].
pub const DEFAULT_SAMPLE_WINDOWS: usize = 4;

/// Default width of each sample window in bytes.
pub const DEFAULT_SAMPLE_WIDTH: usize = 64;

/// How much of the payload contributes to the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintMode {
    /// Hash every byte.
    #[default]
    Full,

    /// Hash `windows` evenly spaced windows of `width` bytes each.
    ///
    /// Payloads that share all sampled windows and their length collide.
    /// Payloads no longer than `windows * width` (or any payload when that
    /// product overflows) are hashed in full.
    Sampled { windows: usize, width: usize },
}

/// Computes fingerprints according to a [`FingerprintMode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Fingerprinter {
    mode: FingerprintMode,
}

impl Fingerprinter {
    pub fn new(mode: FingerprintMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> FingerprintMode {
        self.mode
    }

    /// Fingerprint a payload as 16 lowercase hex characters.
    pub fn fingerprint(&self, payload: &[u8]) -> String {
        let mut hash = fnv1a(FNV_OFFSET_BASIS, &(payload.len() as u64).to_le_bytes());

        match self.mode {
            FingerprintMode::Sampled { windows, width }
                if width > 0
                    && windows
                        .checked_mul(width)
                        .is_some_and(|sampled| sampled > 0 && payload.len() > sampled) =>
            {
                let last_start = payload.len() - width;
                for i in 0..windows {
                    let start = if windows == 1 {
                        0
                    } else {
                        (i as u128 * last_start as u128 / (windows - 1) as u128) as usize
                    };
                    hash = fnv1a(hash, &payload[start..start + width]);
                }
            }
            _ => hash = fnv1a(hash, payload),
        }

        format!("{:016x}", hash)
    }
}

/// Fingerprint the full payload.
pub fn fingerprint(payload: &[u8]) -> String {
    Fingerprinter::new(FingerprintMode::Full).fingerprint(payload)
}

#[inline]
fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
