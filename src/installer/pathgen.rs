//! Socket path generation for managed listeners.
//!
//! Each call produces a fresh candidate path: a configured directory, a
//! fixed prefix, and a random base-36 suffix. Nothing is persisted between
//! calls; uniqueness comes from the 28-bit random suffix, and collisions are
//! handled by the installer's bind-retry loop.

use crate::options::OptionsTable;

/// Prefix used when the supervisor configured a generation directory.
pub const GENERATION_PREFIX: &str = "node";

/// Prefix used for sockets placed in the platform temporary directory.
pub const FALLBACK_PREFIX: &str = "StagehandApp";

/// Source of candidate socket paths for the installer's bind loop.
///
/// The production implementation is [`SocketAddressGenerator`]; tests
/// substitute scripted sequences to exercise the conflict-retry path.
pub trait SocketPathSource: Send + Sync {
    /// Produce the next candidate path.
    fn next_path(&self) -> String;
}

/// Candidate socket path generator.
///
/// Pure function of its configuration plus a random suffix:
/// `<directory>/<prefix>.<base36 suffix>`, hard-truncated to at most
/// `max_len` characters to respect domain-socket path-length limits.
#[derive(Debug, Clone)]
pub struct SocketAddressGenerator {
    directory: String,
    prefix: String,
    max_len: usize,
}

impl SocketAddressGenerator {
    /// Build a generator with explicit parts.
    #[must_use]
    pub fn new(directory: impl Into<String>, prefix: impl Into<String>, max_len: usize) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            max_len,
        }
    }

    /// Build a generator from handshake options.
    ///
    /// With a `generation_dir` option, sockets go under its `backends`
    /// sub-path with the [`GENERATION_PREFIX`]; otherwise they go to the
    /// platform temporary directory (trailing separators stripped) with the
    /// [`FALLBACK_PREFIX`]. The length cap comes from `UNIX_PATH_MAX`.
    #[must_use]
    pub fn from_options(options: &OptionsTable) -> Self {
        let (directory, prefix) = match options.generation_dir() {
            Some(dir) => (format!("{dir}/backends"), GENERATION_PREFIX),
            None => {
                let tmp = std::env::temp_dir();
                let tmp = tmp.to_string_lossy();
                (tmp.trim_end_matches('/').to_owned(), FALLBACK_PREFIX)
            }
        };
        Self::new(directory, prefix, options.unix_path_max())
    }

    /// Produce one candidate path.
    #[must_use]
    pub fn generate(&self) -> String {
        let suffix = to_base36(random_28bit());
        let candidate = format!("{}/{}.{}", self.directory, self.prefix, suffix);
        truncate_chars(candidate, self.max_len)
    }
}

impl SocketPathSource for SocketAddressGenerator {
    fn next_path(&self) -> String {
        self.generate()
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Draw a non-negative 28-bit random integer.
///
/// Masks the random bits of a v4 UUID; the crate already carries `uuid` for
/// random identifiers, so no separate RNG dependency is needed.
fn random_28bit() -> u32 {
    u32::try_from(uuid::Uuid::new_v4().as_u128() & 0xFFF_FFFF).unwrap_or_default()
}

/// Render `value` in base-36 using lowercase digits.
fn to_base36(mut value: u32) -> String {
    if value == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while value > 0 {
        if let Some(digit) = char::from_digit(value % 36, 36) {
            digits.push(digit);
        }
        value /= 36;
    }
    digits.iter().rev().collect()
}

/// Hard substring cut to at most `max` characters, never splitting a code
/// point.
fn truncate_chars(path: String, max: usize) -> String {
    if path.chars().count() <= max {
        path
    } else {
        path.chars().take(max).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
