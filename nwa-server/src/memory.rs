//! Bounds-checked access to emulator memory.
//!
//! Offsets and sizes arrive as client-controlled text tokens, so every pair is
//! parsed and checked against the region's exposed size before any byte moves.
//! Both reads and writes run under the emulator's execution lock, and a write
//! only commits once every pair (and the payload length) has been validated.

use crate::{
    emulator::{Emulator, MemorySpace},
    error::CommandError,
    region::MemoryRegion,
};

/// Upper bound on the bytes a single read may return.
pub const MAX_READ_LEN: usize = 64 * 1024 * 1024;

/// A validated `offset;size` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    offset: usize,
    len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn verb(self) -> &'static str {
        match self {
            Access::Read => "CORE_READ",
            Access::Write => "bCORE_WRITE",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
        }
    }
}

/// Parses a decimal token, or a hexadecimal one when prefixed with `$`.
fn parse_number(token: &str) -> Option<usize> {
    let parsed = match token.strip_prefix('$') {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => token.parse(),
    };
    parsed.ok()
}

/// Turns a flat `offset;size;offset;size...` list into checked spans.
///
/// An empty size means "up to the end of the region".
fn parse_spans(
    tokens: &[String],
    exposed_size: usize,
    access: Access,
) -> Result<Vec<Span>, CommandError> {
    tokens
        .chunks_exact(2)
        .map(|pair| {
            let (offset_token, size_token) = (&pair[0], &pair[1]);
            let offset = parse_number(offset_token)
                .ok_or_else(|| CommandError::InvalidOffset(offset_token.clone()))?;
            let len = if size_token.is_empty() {
                exposed_size.saturating_sub(offset)
            } else {
                parse_number(size_token)
                    .ok_or_else(|| CommandError::InvalidSize(size_token.clone()))?
            };

            let in_bounds = offset < exposed_size
                && offset
                    .checked_add(len)
                    .is_some_and(|end| end <= exposed_size);
            if !in_bounds {
                return Err(CommandError::OutOfBounds {
                    access: access.noun(),
                });
            }
            Ok(Span { offset, len })
        })
        .collect()
}

fn check_arity(tokens: &[String], access: Access) -> Result<(), CommandError> {
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(CommandError::Arity {
            verb: access.verb(),
        });
    }
    Ok(())
}

fn lookup(name: &str) -> Result<MemoryRegion, CommandError> {
    MemoryRegion::from_name(name).ok_or_else(|| CommandError::UnknownRegion(name.to_string()))
}

/// Size reported to clients for `region` under the current memory map.
pub fn exposed_size(memory: &dyn MemorySpace, region: MemoryRegion) -> usize {
    region.exposed_size(memory.region(region).len())
}

/// Reads every span of `region` and concatenates them in argument order.
pub fn read(
    emulator: &dyn Emulator,
    region_name: &str,
    tokens: &[String],
) -> Result<Vec<u8>, CommandError> {
    check_arity(tokens, Access::Read)?;
    let region = lookup(region_name)?;

    let memory = emulator.lock();
    let spans = parse_spans(tokens, exposed_size(&*memory, region), Access::Read)?;

    let total = spans.iter().map(|span| span.len).sum::<usize>();
    if total > MAX_READ_LEN {
        return Err(CommandError::ReadTooLarge {
            limit: MAX_READ_LEN,
        });
    }

    let backing = memory.region(region);
    let mut output = Vec::with_capacity(total);
    for span in spans {
        copy_out(backing, span, &mut output);
    }
    Ok(output)
}

/// Applies `payload` to `region`, consuming it span by span.
///
/// `args` is the full `bcore_write` argument list, region name first.
pub fn write(emulator: &dyn Emulator, args: &[String], payload: &[u8]) -> Result<(), CommandError> {
    let Some((region_name, tokens)) = args.split_first() else {
        return Err(CommandError::Arity {
            verb: Access::Write.verb(),
        });
    };
    check_arity(tokens, Access::Write)?;
    let region = lookup(region_name)?;

    let mut memory = emulator.lock();
    let spans = parse_spans(tokens, exposed_size(&*memory, region), Access::Write)?;

    let mut consumed = 0usize;
    for span in &spans {
        consumed = consumed
            .checked_add(span.len)
            .filter(|&end| end <= payload.len())
            .ok_or(CommandError::PayloadTooShort)?;
    }

    let backing = memory.region_mut(region);
    let mut cursor = 0;
    for span in spans {
        copy_in(backing, span, &payload[cursor..cursor + span.len]);
        cursor += span.len;
    }
    Ok(())
}

// Bus backing stores can be shorter than the bus; the unmapped tail reads as zero.
fn copy_out(backing: &[u8], span: Span, output: &mut Vec<u8>) {
    let start = output.len();
    output.resize(start + span.len, 0);
    let mapped_end = (span.offset + span.len).min(backing.len());
    if span.offset < mapped_end {
        let mapped = mapped_end - span.offset;
        output[start..start + mapped].copy_from_slice(&backing[span.offset..mapped_end]);
    }
}

// Writes to the unmapped tail of a bus are dropped.
fn copy_in(backing: &mut [u8], span: Span, data: &[u8]) {
    let mapped_end = (span.offset + span.len).min(backing.len());
    if span.offset < mapped_end {
        let mapped = mapped_end - span.offset;
        backing[span.offset..mapped_end].copy_from_slice(&data[..mapped]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, headless::HeadlessEmulator};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    fn emulator_with_wram(size: usize) -> HeadlessEmulator {
        let wram = (0..size).map(|i| i as u8).collect();
        HeadlessEmulator::snes().with_region(MemoryRegion::Wram, wram)
    }

    #[test]
    fn numbers_are_decimal_or_dollar_hex() {
        assert_eq!(parse_number("10"), Some(10));
        assert_eq!(parse_number("$10"), Some(16));
        assert_eq!(parse_number("$7E0010"), Some(0x7E_0010));
        assert_eq!(parse_number("$"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("0x10"), None);
        assert_eq!(parse_number("12abc"), None);
    }

    #[test]
    fn empty_size_reads_to_end_of_region() {
        let spans = parse_spans(&args(&["$10", ""]), 0x100, Access::Read).expect("valid spans");
        assert_eq!(
            spans,
            vec![Span {
                offset: 0x10,
                len: 0xF0
            }]
        );
    }

    #[test]
    fn bounds_edges() {
        let size = 0x40;
        assert!(parse_spans(&args(&["63", "1"]), size, Access::Read).is_ok());

        let past_end = parse_spans(&args(&["64", "1"]), size, Access::Read).unwrap_err();
        assert_eq!(past_end.kind(), ErrorKind::NotAllowed);

        let overrun = parse_spans(&args(&["63", "2"]), size, Access::Write).unwrap_err();
        assert_eq!(overrun.kind(), ErrorKind::NotAllowed);
        assert_eq!(overrun.to_string(), "Memory write out of bounds");

        let wrapping = parse_spans(&args(&["1", &usize::MAX.to_string()]), size, Access::Read).unwrap_err();
        assert_eq!(wrapping.kind(), ErrorKind::NotAllowed);
    }

    #[test]
    fn read_concatenates_pairs_in_order() {
        let emulator = emulator_with_wram(0x100);
        let data = read(&emulator, "WRAM", &args(&["$20", "2", "4", "3"])).expect("read");
        assert_eq!(data, vec![0x20, 0x21, 4, 5, 6]);
    }

    #[test]
    fn read_rejects_odd_arity_and_unknown_regions() {
        let emulator = emulator_with_wram(0x100);

        let odd = read(&emulator, "WRAM", &args(&["10"])).unwrap_err();
        assert_eq!(odd.kind(), ErrorKind::InvalidArgument);

        let empty = read(&emulator, "WRAM", &[]).unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::InvalidArgument);

        let unknown = read(&emulator, "ROM", &args(&["0", "1"])).unwrap_err();
        assert_eq!(unknown, CommandError::UnknownRegion("ROM".into()));
    }

    #[test]
    fn read_reports_the_bad_token() {
        let emulator = emulator_with_wram(0x100);
        let err = read(&emulator, "WRAM", &args(&["0", "1", "$zz", "1"])).unwrap_err();
        assert_eq!(err, CommandError::InvalidOffset("$zz".into()));

        let err = read(&emulator, "WRAM", &args(&["0", "one"])).unwrap_err();
        assert_eq!(err, CommandError::InvalidSize("one".into()));
    }

    #[test]
    fn bus_reads_past_backing_store_are_zero() {
        let emulator = HeadlessEmulator::snes().with_region(MemoryRegion::ApuBus, vec![0xFF; 4]);
        let data = read(&emulator, "APUBUS", &args(&["2", "4"])).expect("read");
        assert_eq!(data, vec![0xFF, 0xFF, 0, 0]);

        let err = read(&emulator, "APUBUS", &args(&["$10000", "1"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAllowed);
    }

    #[test]
    fn oversized_reads_are_refused() {
        let emulator = HeadlessEmulator::snes();
        let tokens: Vec<String> = (0..5).flat_map(|_| ["0".to_string(), String::new()]).collect();
        let err = read(&emulator, "CPUBUS", &tokens).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAllowed);
    }

    #[test]
    fn write_then_read_round_trips() {
        let emulator = emulator_with_wram(0x40);
        write(
            &emulator,
            &args(&["WRAM", "10", "4"]),
            &[0xAA, 0xBB, 0xCC, 0xDD],
        )
        .expect("write");
        let data = read(&emulator, "WRAM", &args(&["10", "4"])).expect("read");
        assert_eq!(data, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn write_consumes_payload_across_pairs() {
        let emulator = emulator_with_wram(0x40);
        write(
            &emulator,
            &args(&["WRAM", "0", "2", "$20", "1"]),
            &[1, 2, 3, 0xEE],
        )
        .expect("write");
        let data = read(&emulator, "WRAM", &args(&["0", "2", "$20", "1"])).expect("read");
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn failed_write_commits_nothing() {
        let emulator = emulator_with_wram(0x40);
        let err = write(
            &emulator,
            &args(&["WRAM", "0", "2", "4", "4"]),
            &[9, 9, 9],
        )
        .unwrap_err();
        assert_eq!(err, CommandError::PayloadTooShort);
        assert_eq!(
            read(&emulator, "WRAM", &args(&["0", "2"])).expect("read"),
            vec![0, 1]
        );

        let err = write(
            &emulator,
            &args(&["WRAM", "0", "1", "$40", "1"]),
            &[9, 9],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAllowed);
        assert_eq!(
            read(&emulator, "WRAM", &args(&["0", "1"])).expect("read"),
            vec![0]
        );
    }

    #[test]
    fn write_requires_region_and_pairs() {
        let emulator = emulator_with_wram(0x40);
        assert_eq!(
            write(&emulator, &args(&["WRAM", "10"]), &[0]).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            write(&emulator, &[], &[0]).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn bus_writes_past_backing_store_are_dropped() {
        let emulator = HeadlessEmulator::snes().with_region(MemoryRegion::CpuBus, vec![0; 2]);
        write(&emulator, &args(&["CPUBUS", "1", "3"]), &[7, 8, 9]).expect("write");
        let data = read(&emulator, "CPUBUS", &args(&["0", "4"])).expect("read");
        assert_eq!(data, vec![0, 7, 0, 0]);
    }
}
