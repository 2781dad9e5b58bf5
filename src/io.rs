//! FASTA input: the reference sequence and pairwise alignments.
//!
//! Plain and gzip-compressed files are supported. Sequences are normalised
//! to upper case; anything outside {A,C,G,T,N} (plus `-` in alignments)
//! aborts parsing.

use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Index;
use std::path::Path;

use flate2::read::MultiGzDecoder;
use seq_io::fasta::{Reader as FastaReader, Record};

use crate::alphabet::normalize;
use crate::error::{Error, Result};

/// A pairwise (or multi-way) alignment: equal-length sequences over the
/// alphabet plus the gap marker. Index 0 is the reference row, index 1 the
/// aligned target.
pub struct Alignment {
    seqs: Vec<Vec<u8>>,
}

impl Alignment {
    pub fn new(seqs: Vec<Vec<u8>>) -> Self {
        Alignment { seqs }
    }

    pub fn count(&self) -> usize {
        self.seqs.len()
    }
}

impl Index<usize> for Alignment {
    type Output = [u8];

    fn index(&self, index: usize) -> &[u8] {
        &self.seqs[index]
    }
}

fn open(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))))?;
    let reader = BufReader::new(file);
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("gz")) {
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Load a reference sequence: the first record of a FASTA file, gap-free.
pub fn load_reference(path: &Path) -> Result<Vec<u8>> {
    let mut reader = FastaReader::new(open(path)?);
    let record = reader
        .next()
        .ok_or_else(|| Error::parse(format!("{}: no FASTA record found", path.display())))?
        .map_err(|e| Error::parse(format!("{}: {e}", path.display())))?;

    let seq = normalize(&record.full_seq(), false)?;
    if seq.is_empty() {
        return Err(Error::parse(format!(
            "{}: reference sequence is empty",
            path.display()
        )));
    }
    Ok(seq)
}

/// Load a pairwise alignment: at least two equal-length FASTA records over
/// the alphabet plus `-`.
pub fn load_alignment(path: &Path) -> Result<Alignment> {
    let mut reader = FastaReader::new(open(path)?);
    let mut seqs = Vec::new();

    while let Some(record) = reader.next() {
        let record = record.map_err(|e| Error::parse(format!("{}: {e}", path.display())))?;
        seqs.push(normalize(&record.full_seq(), true)?);
    }

    if seqs.len() < 2 {
        return Err(Error::parse(format!(
            "{}: a FASTA alignment needs at least two sequences",
            path.display()
        )));
    }
    if seqs[0].len() != seqs[1].len() {
        return Err(Error::parse(format!(
            "{}: aligned sequences differ in length",
            path.display()
        )));
    }
    for (&c1, &c2) in seqs[0].iter().zip(seqs[1].iter()) {
        if c1 == crate::alphabet::GAP && c2 == crate::alphabet::GAP {
            return Err(Error::parse(format!(
                "{}: both sequences have a gap at the same position",
                path.display()
            )));
        }
    }

    Ok(Alignment::new(seqs))
}
