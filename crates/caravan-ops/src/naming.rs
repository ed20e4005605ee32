//! File name generation and validation.

/// Longest file name most filesystems accept, in bytes.
pub const MAX_NAME_LEN: usize = 255;

const COPY_TAG: &str = " (Copy)";
const COPY_N_PREFIX: &str = " (Copy ";

/// Validate a filename for cross-platform compatibility.
pub fn validate_filename(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty".into());
    }

    if name.len() > MAX_NAME_LEN {
        return Err(format!("Name is too long (max {MAX_NAME_LEN} bytes)"));
    }

    for c in ['/', '\0'] {
        if name.contains(c) {
            return Err(format!("Name cannot contain '{}'", c.escape_default()));
        }
    }

    #[cfg(target_os = "windows")]
    {
        let windows_invalid = ['\\', ':', '*', '?', '"', '<', '>', '|'];
        for c in windows_invalid {
            if name.contains(c) {
                return Err(format!("Name cannot contain '{}'", c));
            }
        }

        let reserved = [
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
            "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];
        let upper_name = name.to_uppercase();
        let base_name = upper_name.split('.').next().unwrap_or("");
        if reserved.contains(&base_name) {
            return Err("Reserved filename".into());
        }
    }

    if name == "." || name == ".." {
        return Err("'.' and '..' are reserved names".into());
    }

    if name.starts_with(' ') || name.ends_with(' ') {
        return Err("Name cannot start or end with spaces".into());
    }

    if name.ends_with('.') {
        return Err("Name cannot end with a dot".into());
    }

    Ok(())
}

/// Split `name` into base and extension (extension includes the dot).
///
/// A leading dot does not start an extension, and neither does a trailing
/// one. Extensions containing spaces are treated as part of the base.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() && !name[idx..].contains(' ') => {
            name.split_at(idx)
        }
        _ => (name, ""),
    }
}

/// `"name (n)"` variant used when a destination is occupied.
///
/// Files keep their extension last (`report (2).pdf`); directories take the
/// suffix at the very end.
pub fn numbered_name(name: &str, n: u32, is_dir: bool) -> String {
    let (base, ext) = if is_dir { (name, "") } else { split_extension(name) };
    fit_name(format!("{base} ({n}){ext}"), base)
}

/// Name for a copy placed next to its original.
///
/// `foo.txt` becomes `foo (Copy).txt`, then `foo (Copy 2).txt`, and so on.
pub fn duplicate_name(name: &str, is_dir: bool) -> String {
    let (base, ext) = if is_dir { (name, "") } else { split_extension(name) };

    let candidate = match parse_copy_tag(base) {
        Some((prefix, None)) => format!("{prefix}{COPY_N_PREFIX}2){ext}"),
        Some((prefix, Some(n))) => format!("{prefix}{COPY_N_PREFIX}{}){ext}", n + 1),
        None => format!("{base}{COPY_TAG}{ext}"),
    };
    let prefix_len = parse_copy_tag(base).map_or(base.len(), |(prefix, _)| prefix.len());
    fit_name(candidate, &base[..prefix_len])
}

/// Recognise a trailing ` (Copy)` or ` (Copy N)` tag.
fn parse_copy_tag(base: &str) -> Option<(&str, Option<u64>)> {
    if let Some(prefix) = base.strip_suffix(COPY_TAG) {
        return Some((prefix, None));
    }
    let inner = base.strip_suffix(')')?;
    let idx = inner.rfind(COPY_N_PREFIX)?;
    let digits = &inner[idx + COPY_N_PREFIX.len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u64 = digits.parse().ok()?;
    n.checked_add(1)?;
    Some((&inner[..idx], Some(n)))
}

/// Shorten the `base` prefix of `filename` so the whole fits in `max_length`
/// bytes, cutting on a character boundary.
///
/// Returns `None` when no shortening is needed or possible.
pub fn shorten_base(filename: &str, base: &str, max_length: usize) -> Option<String> {
    if max_length == 0 || filename.len() <= max_length || !filename.starts_with(base) {
        return None;
    }
    let reduce_by = filename.len() - max_length;
    if reduce_by > base.len() {
        return None;
    }

    let mut cut = base.len() - reduce_by;
    while !base.is_char_boundary(cut) {
        cut -= 1;
    }
    Some(format!("{}{}", &base[..cut], &filename[base.len()..]))
}

fn fit_name(candidate: String, base: &str) -> String {
    shorten_base(&candidate, base, MAX_NAME_LEN).unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_filename_valid() {
        assert!(validate_filename("test.txt").is_ok());
        assert!(validate_filename("my-file").is_ok());
        assert!(validate_filename(".hidden").is_ok());
        assert!(validate_filename("file with spaces").is_ok());
    }

    #[test]
    fn test_validate_filename_invalid() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename("test/file").is_err());
        assert!(validate_filename(".").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("file ").is_err());
        assert!(validate_filename(" file").is_err());
        assert!(validate_filename("file.").is_err());
        assert!(validate_filename(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("test.txt", 1, false), "test (1).txt");
        assert_eq!(numbered_name("testfile", 2, false), "testfile (2)");
        assert_eq!(numbered_name(".bashrc", 1, false), ".bashrc (1)");
        assert_eq!(numbered_name("dir.with.dots", 3, true), "dir.with.dots (3)");
    }

    #[test]
    fn test_duplicate_name() {
        let cases = [
            (" (Copy)", " (Copy 2)"),
            ("foo", "foo (Copy)"),
            (".bashrc", ".bashrc (Copy)"),
            (".foo.txt", ".foo (Copy).txt"),
            ("foo foo", "foo foo (Copy)"),
            ("foo.txt", "foo (Copy).txt"),
            ("foo foo.txt", "foo foo (Copy).txt"),
            ("foo foo.txt txt", "foo foo.txt txt (Copy)"),
            ("foo...txt", "foo.. (Copy).txt"),
            ("foo...", "foo... (Copy)"),
            ("foo. (Copy)", "foo. (Copy 2)"),
            ("foo (Copy)", "foo (Copy 2)"),
            ("foo (Copy).txt", "foo (Copy 2).txt"),
            ("foo (Copy 2)", "foo (Copy 3)"),
            ("foo (Copy 2).txt", "foo (Copy 3).txt"),
            ("foo foo (Copy 2).txt", "foo foo (Copy 3).txt"),
            ("foo (Copy 13)", "foo (Copy 14)"),
            (
                "foo foo (Copy 100000000000000).txt",
                "foo foo (Copy 100000000000001).txt",
            ),
        ];
        for (original, expected) in cases {
            assert_eq!(duplicate_name(original, false), expected, "for {original:?}");
        }

        assert_eq!(duplicate_name("dir.with.dots", true), "dir.with.dots (Copy)");
        assert_eq!(duplicate_name("dir (Copy).dir", true), "dir (Copy).dir (Copy)");
    }

    #[test]
    fn test_shorten_base() {
        let long_base = "great-text-but-sadly-too-long";
        let filename = format!("{long_base}-123456789");
        let shortened = shorten_base(&filename, long_base, 20).unwrap();
        assert_eq!(shortened, "great-text-123456789");

        let short = "great-text-123456789";
        assert_eq!(shorten_base(short, "great-text", 20), None);
    }

    #[test]
    fn test_shorten_base_respects_char_boundaries() {
        let base = "ééééé";
        let filename = format!("{base} (1)");
        let shortened = shorten_base(&filename, base, 9).unwrap();
        assert!(shortened.len() <= 9);
        assert!(shortened.ends_with(" (1)"));
    }

    #[test]
    fn test_generated_names_fit() {
        let long = "a".repeat(MAX_NAME_LEN);
        assert_eq!(numbered_name(&long, 7, true).len(), MAX_NAME_LEN);
        assert!(duplicate_name(&format!("{long}.txt"), false).len() <= MAX_NAME_LEN);
    }
}
