//! Container header: a 32-bit sequence count followed by one
//! zero-terminated UTF-8 name per sequence. A count of zero means a single
//! anonymous sequence.

use std::io::{Read, Write};

use crate::bitio::{BitReader, BitWriter};
use crate::error::{Error, Result};

/// Longest supported sequence name, terminator included.
pub const MAX_NAME: usize = 4096;

pub fn write_header<W: Write>(out: &mut BitWriter<W>, names: &[String]) -> Result<()> {
    out.write(names.len() as u64, 32)?;
    for name in names {
        out.write_str(name.as_bytes())?;
    }
    Ok(())
}

pub fn read_header<R: Read>(input: &mut BitReader<R>) -> Result<Vec<String>> {
    let (count, n) = input.read(32)?;
    if n < 32 {
        return Err(Error::format("truncated container header"));
    }
    if (count as u32 as i32) < 0 {
        return Err(Error::format("negative number of sequences"));
    }

    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let bytes = input.read_str(MAX_NAME)?;
        let name = String::from_utf8(bytes)
            .map_err(|_| Error::format("sequence name is not valid UTF-8"))?;
        names.push(name);
    }
    Ok(names)
}
