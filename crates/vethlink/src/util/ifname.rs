//! Interface name validation.

/// Maximum interface name length (including null terminator).
pub const IFNAMSIZ: usize = 16;

/// Error type for interface name checks.
#[derive(Debug, thiserror::Error)]
pub enum IfError {
    #[error("invalid interface name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, IfError>;

/// Validate an interface name the way the kernel's `dev_valid_name` does.
pub fn validate(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(IfError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("empty name");
    }
    if name.len() >= IFNAMSIZ {
        return invalid("longer than 15 bytes");
    }
    if name == "." || name == ".." {
        return invalid("reserved name");
    }
    if name.contains('/') || name.contains(':') || name.contains('\0') {
        return invalid("contains '/', ':' or NUL");
    }
    if name.chars().any(char::is_whitespace) {
        return invalid("contains whitespace");
    }

    Ok(())
}

/// Copy `name` into a NUL-terminated `ifr_name` buffer for ioctls.
pub(crate) fn ifreq_name(name: &str) -> std::io::Result<[libc::c_char; IFNAMSIZ]> {
    if name.len() >= IFNAMSIZ {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("interface name too long: {}", name),
        ));
    }
    let mut buf = [0 as libc::c_char; IFNAMSIZ];
    for (dst, src) in buf.iter_mut().zip(name.bytes()) {
        *dst = src as libc::c_char;
    }
    Ok(buf)
}
