//! Short (8.3) and long (VFAT) name encoding.

use crate::dirent::{
    Attr, CaseFlags, DIRENT_SIZE, DosStamp, LFN_CHARS, LFN_MAX_ENTRIES, LongEntry, ShortEntry,
};
use crate::error::{Error, Result};

/// Longest long name in UTF-16 code units.
pub const MAX_LONG_NAME: usize = 255;

/// Characters never allowed in a short name.
const SHORT_FORBIDDEN: &[u8] = b"\"*+,./:;<=>?[\\]|";
/// Characters never allowed in any name.
const LONG_FORBIDDEN: &[char] = &['"', '*', '/', ':', '<', '>', '?', '\\', '|'];

/// VFAT checksum of an 11-byte short name: rotate right by one, then add.
pub fn fat_checksum(short: &[u8; 11]) -> u8 {
    short.iter().fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b))
}

/// Printable ASCII, space included, minus the short-name separators.
fn short_char_ok(c: char) -> bool {
    (' '..='~').contains(&c) && !SHORT_FORBIDDEN.contains(&(c as u8))
}

/// Split at the last `.` into base and extension.
fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    }
}

/// Case of one name part: `Some(true)` all-lowercase, `Some(false)` no
/// lowercase, `None` mixed.
fn part_case(part: &str) -> Option<bool> {
    let lower = part.chars().any(|c| c.is_ascii_lowercase());
    let upper = part.chars().any(|c| c.is_ascii_uppercase());
    match (lower, upper) {
        (true, true) => None,
        (lower, _) => Some(lower),
    }
}

fn pad_into(dst: &mut [u8], part: &str) {
    for (d, b) in dst.iter_mut().zip(part.bytes()) {
        *d = b.to_ascii_uppercase();
    }
}

/// The 11-byte short name and case flags for `name`, if it can be stored
/// without long entries.
pub fn short_fit(name: &str) -> Option<([u8; 11], CaseFlags)> {
    let (base, ext) = split_ext(name);
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return None;
    }
    if !base.chars().chain(ext.chars()).all(short_char_ok) {
        return None;
    }
    // Edge spaces would vanish into the padding.
    if [base, ext].iter().any(|part| part.starts_with(' ') || part.ends_with(' ')) {
        return None;
    }
    let base_lower = part_case(base)?;
    let ext_lower = part_case(ext)?;

    let mut short = [b' '; 11];
    pad_into(&mut short[..8], base);
    pad_into(&mut short[8..], ext);

    let mut flags = CaseFlags::empty();
    flags.set(CaseFlags::LOWER_BASE, base_lower);
    flags.set(CaseFlags::LOWER_EXT, ext_lower);
    Some((short, flags))
}

/// Upper-case `part`, drop spaces and periods and map anything else that is
/// not short-name safe to `_`. Returns the converted bytes (at most `max`) and
/// whether anything was lost.
fn convert_part(part: &str, max: usize) -> (Vec<u8>, bool) {
    let mut out = Vec::with_capacity(max);
    let mut lossy = false;
    for c in part.chars() {
        if c == ' ' || c == '.' {
            lossy = true;
            continue;
        }
        let b = if short_char_ok(c) {
            c.to_ascii_uppercase() as u8
        } else {
            lossy = true;
            b'_'
        };
        if out.len() == max {
            lossy = true;
            break;
        }
        out.push(b);
    }
    (out, lossy)
}

/// Derive the short alias for a name that needs long entries.
///
/// If the conversion loses information, the base is cut to leave room for
/// `~` and `tail` and they are appended.
pub fn basis_name(name: &str, tail: &str) -> [u8; 11] {
    let trimmed = name.trim_start_matches('.');
    let (base, ext) = split_ext(trimmed);
    let (mut base, base_lossy) = convert_part(base, 8);
    let (ext, ext_lossy) = convert_part(ext, 3);

    if base_lossy || ext_lossy || trimmed.len() != name.len() {
        base.truncate(8usize.saturating_sub(1 + tail.len()));
        base.push(b'~');
        base.extend(tail.bytes());
    }

    let mut short = [b' '; 11];
    short[..base.len()].copy_from_slice(&base);
    short[8..8 + ext.len()].copy_from_slice(&ext);
    short
}

/// What goes into the short entry besides the name.
#[derive(Debug, Clone, Copy)]
pub struct EntryTemplate<'a> {
    pub attr: Attr,
    pub cluster: u32,
    pub length: u32,
    pub stamp: DosStamp,
    /// Numeric tail for the short alias; `"1"` when absent.
    pub tail: Option<&'a str>,
}

impl Default for EntryTemplate<'_> {
    fn default() -> Self {
        EntryTemplate {
            attr: Attr::ARCHIVE,
            cluster: 0,
            length: 0,
            stamp: DosStamp::EPOCH,
            tail: None,
        }
    }
}

fn validate(name: &str, tail: &str) -> Result<()> {
    let invalid = || Error::InvalidName(name.to_string());
    if name.trim_matches(|c| c == '.' || c == ' ').is_empty() {
        return Err(invalid());
    }
    if name.encode_utf16().count() > MAX_LONG_NAME {
        return Err(invalid());
    }
    if name.chars().any(|c| c < ' ' || LONG_FORBIDDEN.contains(&c)) {
        return Err(invalid());
    }
    if tail.is_empty() || tail.len() > 6 || !tail.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidName(format!("{name} (tail {tail:?})")));
    }
    Ok(())
}

/// Build the raw directory records for `name`, in slot order.
///
/// A name that fits 8.3 yields one short entry. Anything else yields its
/// long entries (last fragment first) followed by the short alias.
pub fn make_long_dirent(name: &str, tpl: &EntryTemplate) -> Result<Vec<[u8; DIRENT_SIZE]>> {
    let tail = tpl.tail.unwrap_or("1");
    validate(name, tail)?;

    if let Some((short, case)) = short_fit(name) {
        let mut entry =
            ShortEntry::new(short, tpl.attr, tpl.cluster, tpl.length)?.stamped(tpl.stamp);
        entry.ntres = case;
        return Ok(vec![entry.to_bytes()]);
    }

    let short = basis_name(name, tail);
    let checksum = fat_checksum(&short);

    let mut units: Vec<u16> = name.encode_utf16().collect();
    if units.len() % LFN_CHARS != 0 {
        units.push(0x0000);
    }
    let fragments = units.len().div_ceil(LFN_CHARS);
    units.resize(fragments * LFN_CHARS, 0xFFFF);
    debug_assert!(fragments <= LFN_MAX_ENTRIES);

    let mut records = Vec::with_capacity(fragments + 1);
    for seq in (1..=fragments).rev() {
        let mut chunk = [0u16; LFN_CHARS];
        chunk.copy_from_slice(&units[(seq - 1) * LFN_CHARS..seq * LFN_CHARS]);
        let entry = LongEntry::new(seq as u8, seq == fragments, chunk, checksum)?;
        records.push(entry.to_bytes());
    }
    let entry = ShortEntry::new(short, tpl.attr, tpl.cluster, tpl.length)?.stamped(tpl.stamp);
    records.push(entry.to_bytes());
    Ok(records)
}

/// Reassemble a long name from entries in slot order (last fragment first).
///
/// `None` if the run is not a complete, consistently numbered set belonging
/// to the short name with checksum `checksum`.
pub fn join_long_name(entries: &[LongEntry], checksum: u8) -> Option<String> {
    let first = entries.first()?;
    if !first.is_last() || first.sequence() as usize != entries.len() {
        return None;
    }
    let mut units = Vec::with_capacity(entries.len() * LFN_CHARS);
    for (i, entry) in entries.iter().rev().enumerate() {
        if entry.sequence() as usize != i + 1 || entry.checksum != checksum {
            return None;
        }
        units.extend_from_slice(entry.name_units());
    }
    Some(String::from_utf16_lossy(&units))
}
