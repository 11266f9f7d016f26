//! Statistics export (SPEC_FULL.md supplement): serializes per-task
//! counters into a caller-provided buffer without allocating, in one of
//! three formats. Grounded on the same "no heap, fixed buffers" style as
//! `eqos::task::TaskControlBlock`'s plain counters; the binary record
//! layout is new; there is no comparable export surface to draw from.

use core::fmt::Write as _;

use dsrtos_core::error::{Error, Kind};

use crate::task::{TaskState, Tasks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFormat {
    Csv,
    Json,
    Binary,
}

/// Fixed-width binary record: slot(u16) + state(u8) + base_priority(u16)
/// + effective_priority(u16) + time_slice_remaining(u32), little-endian.
const BINARY_RECORD_LEN: usize = 2 + 1 + 2 + 2 + 4;

fn state_code(state: TaskState) -> u8 {
    match state {
        TaskState::Dormant => 0,
        TaskState::Ready => 1,
        TaskState::Running => 2,
        TaskState::Blocked => 3,
        TaskState::Suspended => 4,
        TaskState::Terminated => 5,
    }
}

/// A bounded writer over a caller-supplied byte buffer, used so the CSV
/// and JSON paths can share ordinary `core::fmt::Write` formatting
/// without allocating.
struct BufWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> core::fmt::Write for BufWriter<'a> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > self.buf.len() {
            return Err(core::fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Writes every occupied task's stats into `buf` in `format`, returning
/// the number of bytes written.
pub fn export(tasks: &Tasks, format: StatsFormat, buf: &mut [u8]) -> Result<usize, Error> {
    match format {
        StatsFormat::Binary => export_binary(tasks, buf),
        StatsFormat::Csv => export_text(tasks, buf, true),
        StatsFormat::Json => export_text(tasks, buf, false),
    }
}

fn export_binary(tasks: &Tasks, buf: &mut [u8]) -> Result<usize, Error> {
    let mut offset = 0;
    for slot in 0..tasks.capacity() as u16 {
        let Some(tcb) = tasks.get_by_slot(slot) else {
            continue;
        };
        if offset + BINARY_RECORD_LEN > buf.len() {
            return Err(Error::new(Kind::QueueOverflow));
        }
        buf[offset..offset + 2].copy_from_slice(&slot.to_le_bytes());
        buf[offset + 2] = state_code(tcb.state());
        buf[offset + 3..offset + 5].copy_from_slice(&tcb.base_priority().to_le_bytes());
        buf[offset + 5..offset + 7].copy_from_slice(&tcb.effective_priority().to_le_bytes());
        buf[offset + 7..offset + 11].copy_from_slice(&tcb.time_slice_remaining().to_le_bytes());
        offset += BINARY_RECORD_LEN;
    }
    Ok(offset)
}

fn export_text(tasks: &Tasks, buf: &mut [u8], csv: bool) -> Result<usize, Error> {
    let mut writer = BufWriter { buf, len: 0 };
    if csv {
        writer
            .write_str("slot,state,base_priority,effective_priority,time_slice_remaining\n")
            .map_err(|_| Error::new(Kind::QueueOverflow))?;
    } else {
        writer.write_str("[").map_err(|_| Error::new(Kind::QueueOverflow))?;
    }

    let mut first = true;
    for slot in 0..tasks.capacity() as u16 {
        let Some(tcb) = tasks.get_by_slot(slot) else {
            continue;
        };
        let result = if csv {
            writeln!(
                writer,
                "{},{},{},{},{}",
                slot,
                state_code(tcb.state()),
                tcb.base_priority(),
                tcb.effective_priority(),
                tcb.time_slice_remaining()
            )
        } else {
            let prefix = if first { "" } else { "," };
            write!(
                writer,
                "{}{{\"slot\":{},\"state\":{},\"base_priority\":{},\"effective_priority\":{},\"time_slice_remaining\":{}}}",
                prefix,
                slot,
                state_code(tcb.state()),
                tcb.base_priority(),
                tcb.effective_priority(),
                tcb.time_slice_remaining()
            )
        };
        result.map_err(|_| Error::new(Kind::QueueOverflow))?;
        first = false;
    }

    if !csv {
        writer.write_str("]").map_err(|_| Error::new(Kind::QueueOverflow))?;
    }
    Ok(writer.len)
}
