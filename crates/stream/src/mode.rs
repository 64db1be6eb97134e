use std::fs::OpenOptions;

use nix::fcntl::OFlag;

use crate::errors::StreamError;

/// Open modes whose prefix grants read access.
pub const READABLE_MODES: [&str; 6] = ["r", "r+", "w+", "a+", "x+", "c+"];

/// Open modes whose prefix grants write access.
pub const WRITABLE_MODES: [&str; 9] = ["r+", "w", "w+", "a", "a+", "x", "x+", "c", "c+"];

pub(crate) fn is_readable_mode(mode: &str) -> bool {
    READABLE_MODES.iter().any(|prefix| mode.starts_with(prefix))
}

pub(crate) fn is_writable_mode(mode: &str) -> bool {
    WRITABLE_MODES.iter().any(|prefix| mode.starts_with(prefix))
}

/// Canonical form of an fopen-style mode: base letter, `+` if present, then
/// `b` if present. `"rb+"` and `"r+b"` both become `"r+b"`; `t` is dropped.
pub(crate) fn normalize(mode: &str) -> Result<String, StreamError> {
    let invalid = || StreamError::InvalidMode(mode.to_string());

    let mut chars = mode.chars();
    let base = chars.next().ok_or_else(invalid)?;
    if !matches!(base, 'r' | 'w' | 'a' | 'x' | 'c') {
        return Err(invalid());
    }

    let (mut plus, mut binary) = (false, false);
    for flag in chars {
        match flag {
            '+' if !plus => plus = true,
            'b' if !binary => binary = true,
            't' => {},
            _ => return Err(invalid()),
        }
    }

    let mut normalized = base.to_string();
    if plus {
        normalized.push('+');
    }
    if binary {
        normalized.push('b');
    }
    Ok(normalized)
}

/// Options matching a mode already passed through [`normalize`].
pub(crate) fn open_options(mode: &str) -> OpenOptions {
    let plus = mode.contains('+');
    let mut options = OpenOptions::new();

    match mode.chars().next() {
        Some('r') => options.read(true).write(plus),
        Some('w') => options.read(plus).write(true).create(true).truncate(true),
        Some('a') => options.read(plus).append(true).create(true),
        Some('x') => options.read(plus).write(true).create_new(true),
        _ => options.read(plus).write(true).create(true),
    };

    options
}

/// Best mode string for a descriptor we did not open ourselves.
pub(crate) fn from_flags(flags: OFlag) -> &'static str {
    let append = flags.contains(OFlag::O_APPEND);

    let access = flags & OFlag::O_ACCMODE;

    if access == OFlag::O_RDONLY {
        "r"
    } else if access == OFlag::O_WRONLY {
        if append {
            "a"
        } else {
            "w"
        }
    } else if append {
        "a+"
    } else {
        "r+"
    }
}
