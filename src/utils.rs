use ansi_term::Colour;

use crate::isa::{reg_name, RegFile};

pub const GRN: Colour = Colour::Green;
pub const RED: Colour = Colour::Red;
pub const GRAY: Colour = Colour::Fixed(244);

/// Parse a numeric literal (decimal or `0x` hex, optionally negative).
/// Hex literals may use the full 64-bit range.
pub fn parse_literal(s: &str) -> Option<i64> {
    let (neg, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let v = if let Some(hex) = body.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()? as i64
    } else {
        body.parse::<u64>().ok()? as i64
    };
    Some(if neg { v.wrapping_neg() } else { v })
}

// little endian
pub fn get_i64(binary: &[u8]) -> i64 {
    let mut res = 0u64;
    for (i, byte) in binary.iter().enumerate().take(8) {
        res |= (*byte as u64) << (i * 8);
    }
    res as i64
}

pub fn put_i64(binary: &mut [u8], val: i64) {
    for (i, byte) in binary.iter_mut().enumerate().take(8) {
        *byte = (val as u64 >> (i * 8)) as u8;
    }
}

/// Print every 8-byte group that differs between two memory snapshots.
pub fn mem_diff(left: &[u8], right: &[u8]) {
    let len = left.len().min(right.len());
    for addr in (0..len).step_by(8) {
        let (l, r) = (&left[addr..len.min(addr + 8)], &right[addr..len.min(addr + 8)]);
        if l != r {
            print!("{:#06x}: ", addr);
            for byte in l {
                print!("{:02x}", byte)
            }
            print!(" -> ");
            for byte in r {
                print!("{}", GRN.paint(format!("{:02x}", byte)))
            }
            println!()
        }
    }
}

/// Print every register that differs between two register files.
pub fn reg_diff(left: &RegFile, right: &RegFile) {
    for (code, (l, r)) in left.iter().zip(right.iter()).enumerate() {
        if l != r {
            let name = reg_name(code as u8).unwrap_or("%r?");
            println!(
                "{: <5} {:#018x} -> {}",
                name,
                l,
                GRN.paint(format!("{:#018x}", r))
            );
        }
    }
}
