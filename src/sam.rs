//! SAM text adapter: rebuild a reference-padded pairwise alignment from
//! mapped reads.
//!
//! CIGAR `M` consumes reference and query, `I` records an insertion keyed
//! by reference position (highest MAPQ wins), `D` writes a gap, `N` skips
//! reference, `S` skips query. Where reads overlap, the first placed base
//! is only overwritten by a strictly higher MAPQ, and MAPQ 255 (missing)
//! never overwrites anything.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::alphabet::GAP;
use crate::error::{Error, Result};
use crate::io::Alignment;

// unmapped | secondary | QC fail | supplementary
const SKIP_FLAGS: u16 = 0x4 | 0x100 | 0x200 | 0x800;

struct Insertion {
    seq: Vec<u8>,
    mapq: u8,
}

/// Load a SAM text file against a gap-free reference and reconstruct the
/// `(reference row, aligned row)` pair the encoder consumes.
pub fn load_alignment(rseq: &[u8], path: &Path) -> Result<Alignment> {
    let file = File::open(path)
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))))?;
    let reader = BufReader::new(file);

    // per-position winner; positions never touched stay N
    let mut placed: Vec<Option<(u8, u8)>> = vec![None; rseq.len()];
    let mut inserts: FxHashMap<usize, Insertion> = FxHashMap::default();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('@') {
            continue;
        }
        process_read(&line, rseq.len(), &mut placed, &mut inserts).map_err(|e| {
            Error::parse(format!("{}:{}: {e}", path.display(), lineno + 1))
        })?;
    }

    let mut sorted: Vec<(usize, Insertion)> = inserts.into_iter().collect();
    sorted.sort_unstable_by_key(|(pos, _)| *pos);

    let aseq: Vec<u8> = placed
        .iter()
        .map(|slot| slot.map_or(b'N', |(c, _)| c))
        .collect();

    Ok(Alignment::new(vec![
        pad_reference(rseq, &sorted),
        splice_insertions(&aseq, &sorted),
    ]))
}

fn process_read(
    line: &str,
    rlen: usize,
    placed: &mut [Option<(u8, u8)>],
    inserts: &mut FxHashMap<usize, Insertion>,
) -> std::result::Result<(), String> {
    let mut fields = line.split('\t');
    let mut field = |name: &str| fields.next().ok_or_else(|| format!("missing {name} field"));

    field("QNAME")?;
    let flag: u16 = field("FLAG")?
        .parse()
        .map_err(|_| "invalid FLAG field".to_string())?;
    field("RNAME")?;
    let pos: usize = field("POS")?
        .parse()
        .map_err(|_| "invalid POS field".to_string())?;
    let mapq: u8 = field("MAPQ")?
        .parse()
        .map_err(|_| "invalid MAPQ field".to_string())?;
    let cigar = field("CIGAR")?.to_string();
    field("RNEXT")?;
    field("PNEXT")?;
    field("TLEN")?;
    let seq = field("SEQ")?.as_bytes().to_vec();

    if flag & SKIP_FLAGS != 0 || cigar == "*" || seq == b"*" {
        return Ok(());
    }
    if pos == 0 {
        return Err("mapped read has position 0".to_string());
    }

    let mut rpos = pos - 1; // SAM positions are 1-based
    let mut spos = 0usize;

    for (len, op) in CigarOps::new(&cigar) {
        let len = len?;
        match op {
            b'M' => {
                for j in 0..len {
                    let c = *seq
                        .get(spos + j)
                        .ok_or("CIGAR consumes more query than SEQ provides")?;
                    place(placed, rlen, rpos + j, normalize_base(c), mapq)?;
                }
                rpos += len;
                spos += len;
            }
            b'I' => {
                let end = spos + len;
                if end > seq.len() {
                    return Err("CIGAR consumes more query than SEQ provides".to_string());
                }
                let ins: Vec<u8> = seq[spos..end].iter().map(|&c| normalize_base(c)).collect();
                let replace = inserts
                    .get(&rpos)
                    .map_or(true, |prev| mapq > prev.mapq);
                if replace {
                    inserts.insert(rpos, Insertion { seq: ins, mapq });
                }
                spos = end;
            }
            b'D' => {
                for j in 0..len {
                    place(placed, rlen, rpos + j, GAP, mapq)?;
                }
                rpos += len;
            }
            b'N' => rpos += len,
            b'S' => spos += len,
            other => return Err(format!("unsupported CIGAR operation: {}", other as char)),
        }
    }

    Ok(())
}

fn place(
    placed: &mut [Option<(u8, u8)>],
    rlen: usize,
    pos: usize,
    c: u8,
    mapq: u8,
) -> std::result::Result<(), String> {
    if pos >= rlen {
        return Err("read extends past the end of the reference".to_string());
    }
    match placed[pos] {
        Some((_, prev)) if mapq == 255 || mapq <= prev => {}
        _ => placed[pos] = Some((c, mapq)),
    }
    Ok(())
}

fn normalize_base(c: u8) -> u8 {
    match c.to_ascii_uppercase() {
        b'A' | b'C' | b'G' | b'T' | b'N' => c.to_ascii_uppercase(),
        _ => b'N', // ambiguity codes fold into N
    }
}

/// Reference row: the reference with a gap run at every insertion site.
fn pad_reference(rseq: &[u8], inserts: &[(usize, Insertion)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rseq.len() + inserts.len());
    let mut prev = 0usize;
    for (pos, ins) in inserts {
        out.extend_from_slice(&rseq[prev..*pos]);
        out.extend(std::iter::repeat(GAP).take(ins.seq.len()));
        prev = *pos;
    }
    out.extend_from_slice(&rseq[prev..]);
    out
}

/// Aligned row: the reconstructed query with insertions spliced in.
fn splice_insertions(aseq: &[u8], inserts: &[(usize, Insertion)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(aseq.len() + inserts.len());
    let mut prev = 0usize;
    for (pos, ins) in inserts {
        out.extend_from_slice(&aseq[prev..*pos]);
        out.extend_from_slice(&ins.seq);
        prev = *pos;
    }
    out.extend_from_slice(&aseq[prev..]);
    out
}

/// CIGAR `<len><op>` pairs.
struct CigarOps<'a> {
    rest: &'a [u8],
}

impl<'a> CigarOps<'a> {
    fn new(cigar: &'a str) -> Self {
        CigarOps {
            rest: cigar.as_bytes(),
        }
    }
}

impl Iterator for CigarOps<'_> {
    type Item = (std::result::Result<usize, String>, u8);

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let digits = self.rest.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 || digits == self.rest.len() {
            self.rest = &[];
            return Some((Err("malformed CIGAR string".to_string()), 0));
        }
        let len = self.rest[..digits]
            .iter()
            .try_fold(0usize, |acc, &d| {
                acc.checked_mul(10)?.checked_add((d - b'0') as usize)
            })
            .ok_or_else(|| "CIGAR length overflow".to_string());
        let op = self.rest[digits];
        self.rest = &self.rest[digits + 1..];
        Some((len, op))
    }
}
