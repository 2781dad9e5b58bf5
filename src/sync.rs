//! Adaptive synchronisation schedules.
//!
//! The change vector marks every reference position that differs from at
//! least one target across the whole alignment set; the sync map lists the
//! lengths of the unchanged runs between changes. Both endpoints derive
//! the same schedule from the same alignments, so nothing is transmitted.

use bitvec::prelude::*;

use crate::alphabet::{gapless_len, GAP};
use crate::error::{Error, Result};
use crate::io::Alignment;

/// One bit per non-gap reference position (plus a trailing slot for
/// insertions at the end), set where any target deviates.
pub fn change_vector(alignments: &[Alignment]) -> Result<BitVec<u32, Lsb0>> {
    let mut changes: BitVec<u32, Lsb0> = BitVec::new();

    for a in alignments {
        let rseq = &a[0];
        let aseq = &a[1];

        if changes.is_empty() {
            changes.resize(gapless_len(rseq) + 1, false);
        } else if changes.len() != gapless_len(rseq) + 1 {
            return Err(Error::parse(
                "alignments refer to references of different lengths",
            ));
        }

        let mut roffset = 0usize;
        for (&c1, &c2) in rseq.iter().zip(aseq.iter()) {
            if c1 == GAP && roffset > 0 {
                changes.set(roffset - 1, true);
            } else if c1 != c2 {
                // also covers an insertion in the very first column, which
                // lands on position 0
                changes.set(roffset, true);
            }
            if c1 != GAP {
                roffset += 1;
            }
        }
    }

    Ok(changes)
}

/// Lengths of the unchanged runs following each change region. The encoder
/// consumes these greedily until the minimum period is covered.
pub fn sync_map(alignments: &[Alignment]) -> Result<Vec<u32>> {
    let changes = change_vector(alignments)?;
    let mut map = Vec::new();
    let mut sync_needed = false;
    let mut period = 0u32;

    for changed in changes.iter().by_vals() {
        if changed {
            sync_needed = true;
        } else if sync_needed {
            map.push(period);
            sync_needed = false;
            period = 0;
        }
        period += 1;
    }

    Ok(map)
}
