//! ALZW decoder: replays the token stream against the reference, keeping a
//! dictionary in lock-step with the encoder.
//!
//! Known codewords are materialised by walking the owning node up to the
//! root; a codeword that has not been minted yet is a match-phrase copy and
//! is rebuilt by consuming reference symbols until the cursor reaches it.

use std::io::Read;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::alphabet::char_of;
use crate::bitio::BitReader;
use crate::dict::{Dictionary, DNODE_ID, INODE_ID, WNODE_ID};
use crate::error::{Error, Result};
use crate::node::NodeId;

pub struct Decoder {
    dict: Dictionary,
    rseq: Vec<u8>,
    width: u32,

    /// When enabled, every emitted codeword is recorded and resolved to its
    /// owning node by `freeze`, giving search tasks O(1) phrase lookups.
    hash_index: bool,
    seen: FxHashSet<u64>,
    phrases: FxHashMap<u64, NodeId>,
    frozen: bool,

    scratch: Vec<u8>,
}

impl Decoder {
    /// `rseq` is the gap-free reference. Enable `hash_index` for search
    /// workloads and call [`freeze`](Self::freeze) after the last sequence.
    pub fn new(rseq: Vec<u8>, hash_index: bool) -> Self {
        let dict = Dictionary::new();
        Decoder {
            width: Dictionary::initial_width(),
            dict,
            rseq,
            hash_index,
            seen: FxHashSet::default(),
            phrases: FxHashMap::default(),
            frozen: false,
            scratch: Vec::new(),
        }
    }

    pub fn reference_len(&self) -> usize {
        self.rseq.len()
    }

    pub fn used_nodes(&self) -> u64 {
        self.dict.used_nodes()
    }

    pub fn real_nodes(&self) -> usize {
        self.dict.real_nodes()
    }

    pub(crate) fn dict(&self) -> &Dictionary {
        &self.dict
    }

    /// Owning node of an emitted codeword; only available once frozen.
    pub(crate) fn phrase_node(&self, cw: u64) -> Option<NodeId> {
        debug_assert!(self.frozen);
        self.phrases.get(&cw).copied()
    }

    /// Decode the next sequence, discarding the symbols (the dictionary is
    /// still updated, which is all search index construction needs).
    pub fn decode<R: Read>(&mut self, input: &mut BitReader<R>) -> Result<()> {
        self.decode_inner(input, None)
    }

    /// Decode the next sequence, appending its symbols to `out`.
    pub fn decode_into<R: Read>(&mut self, input: &mut BitReader<R>, out: &mut Vec<u8>) -> Result<()> {
        self.decode_inner(input, Some(out))
    }

    fn decode_inner<R: Read>(
        &mut self,
        input: &mut BitReader<R>,
        mut out: Option<&mut Vec<u8>>,
    ) -> Result<()> {
        assert!(!self.frozen, "decode after freeze");
        let mut roffset = 0usize;

        while roffset < self.rseq.len() {
            let (cw, n) = input.read(self.width)?;
            if n < self.width {
                // trailing partial codeword: end of stream
                break;
            }

            if cw == INODE_ID {
                self.decode_ins(input, out.as_mut().map(|o| &mut **o))?;
            } else if cw == DNODE_ID {
                roffset += input.read_delta()? as usize;
            } else if cw == WNODE_ID {
                if self.width == 64 {
                    return Err(Error::format("codeword width overflow"));
                }
                self.width += 1;
            } else {
                roffset += self.decode_mr(cw, roffset, out.as_mut().map(|o| &mut **o))?;
            }
        }

        Ok(())
    }

    /// One match/mismatch token: emit a known phrase, or copy reference
    /// symbols forward until the dictionary mints the codeword.
    fn decode_mr(&mut self, cw: u64, roffset: usize, out: Option<&mut Vec<u8>>) -> Result<usize> {
        if let Some(nid) = self.dict.get(cw) {
            let noffset = (cw - self.dict.node(nid).id()) as u32;
            Ok(self.emit_node(nid, noffset, out))
        } else {
            self.copy_match(cw, roffset, out)
        }
    }

    fn decode_ins<R: Read>(
        &mut self,
        input: &mut BitReader<R>,
        mut out: Option<&mut Vec<u8>>,
    ) -> Result<()> {
        let count = input.read_delta()?;

        for _ in 0..count {
            let (cw, n) = input.read(self.width)?;
            if n < self.width {
                return Err(Error::format("unexpected end of stream in insertion burst"));
            }
            let nid = self
                .dict
                .get(cw)
                .ok_or_else(|| Error::format(format!("unknown codeword: {cw:#x}")))?;
            let noffset = (cw - self.dict.node(nid).id()) as u32;
            self.emit_node(nid, noffset, out.as_mut().map(|o| &mut **o));
        }

        Ok(())
    }

    /// Emit the phrase ending at `(node, noffset)`, bottom-up through a
    /// scratch buffer. Returns the phrase length.
    fn emit_node(&mut self, nid: NodeId, noffset: u32, out: Option<&mut Vec<u8>>) -> usize {
        let n = self.dict.node(nid);
        if self.hash_index {
            self.seen.insert(n.id() + noffset as u64);
        }
        let plen = (n.phrase_length() + noffset - n.length()) as usize;

        let Some(out) = out else {
            return plen;
        };

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        let mut nid = nid;
        let mut noffset = noffset;
        loop {
            let n = self.dict.node(nid);
            let Some(parent) = n.parent else { break };
            if noffset > 0 {
                noffset -= 1;
                scratch.push(char_of(n.get_base(noffset)));
            } else {
                scratch.push(char_of(n.symbol()));
                nid = parent;
                noffset = self.dict.node(parent).length();
            }
        }

        out.extend(scratch.iter().rev());
        self.scratch = scratch;
        plen
    }

    /// Grow the dictionary along the reference until `cw` exists, emitting
    /// the copied symbols. Mirrors the encoder's match-run growth exactly.
    fn copy_match(&mut self, cw: u64, roffset: usize, mut out: Option<&mut Vec<u8>>) -> Result<usize> {
        let mut i = roffset;
        self.dict.new_phrase();

        while cw > self.dict.current_id() {
            let Some(&c) = self.rseq.get(i) else {
                return Err(Error::format(format!(
                    "codeword {cw:#x} runs past the end of the reference"
                )));
            };
            i += 1;
            self.dict.add(c);
            if let Some(out) = out.as_mut() {
                out.push(c);
            }
        }

        self.dict.commit_phrase();

        if self.hash_index {
            self.seen.insert(cw);
        }

        Ok(i - roffset)
    }

    /// Resolve every recorded codeword to its owning node. No further
    /// sequences may be decoded afterwards.
    pub fn freeze(&mut self) -> Result<()> {
        if self.hash_index {
            for &cw in &self.seen {
                let nid = self
                    .dict
                    .get(cw)
                    .ok_or_else(|| Error::format(format!("unknown codeword: {cw:#x}")))?;
                self.phrases.insert(cw, nid);
            }
        }
        self.frozen = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::BitWriter;
    use crate::encoder::Encoder;

    fn round_trip(rseq: &[u8], alignments: &[(&[u8], &[u8])], sync_period: u64) -> Vec<Vec<u8>> {
        let mut buf = Vec::new();
        let mut bw = BitWriter::new(&mut buf);
        let mut enc = Encoder::new(sync_period);
        for (r, a) in alignments {
            enc.encode(r, a, &mut bw, None).unwrap();
        }
        bw.flush().unwrap();

        let mut dec = Decoder::new(rseq.to_vec(), false);
        let mut br = BitReader::new(&buf[..]);
        let mut outs = Vec::new();
        for _ in alignments {
            let mut out = Vec::new();
            dec.decode_into(&mut br, &mut out).unwrap();
            outs.push(out);
        }
        outs
    }

    #[test]
    fn pure_match_round_trip() {
        let outs = round_trip(b"ACGTACGT", &[(b"ACGTACGT", b"ACGTACGT")], 0);
        assert_eq!(outs, vec![b"ACGTACGT".to_vec()]);
    }

    #[test]
    fn mismatch_round_trip() {
        let outs = round_trip(b"ACGT", &[(b"ACGT", b"ACNT")], 0);
        assert_eq!(outs, vec![b"ACNT".to_vec()]);
    }

    #[test]
    fn deletion_round_trip() {
        let outs = round_trip(b"ACGT", &[(b"ACGT", b"AC-T")], 0);
        assert_eq!(outs, vec![b"ACT".to_vec()]);
    }

    #[test]
    fn insertion_round_trip() {
        let outs = round_trip(b"ACGT", &[(b"AC-GT", b"ACTGT")], 0);
        assert_eq!(outs, vec![b"ACTGT".to_vec()]);
    }

    #[test]
    fn multiple_sequences_share_the_dictionary() {
        let outs = round_trip(
            b"ACGTACGTAC",
            &[
                (b"ACGTACGTAC", b"ACGTACGTAC"),
                (b"ACGTACGTAC", b"ACGAACGTAC"),
                (b"ACGTACGT-AC", b"ACG-ACGTTAC"),
            ],
            0,
        );
        assert_eq!(outs[0], b"ACGTACGTAC");
        assert_eq!(outs[1], b"ACGAACGTAC");
        assert_eq!(outs[2], b"ACGACGTTAC");
    }

    #[test]
    fn long_input_crosses_width_boundaries() {
        // enough distinct phrases to push the codeword space past several
        // powers of two, exercising WNODE handling on both endpoints
        let mut rseq = Vec::new();
        let mut aseq = Vec::new();
        let bases = b"ACGTN";
        for i in 0..400usize {
            for j in 0..5 {
                rseq.push(bases[(i * 7 + j * 3 + i / 13) % 5]);
            }
            // sprinkle mismatches so phrases keep breaking
            aseq.extend_from_slice(&rseq[rseq.len() - 5..]);
            let k = aseq.len() - 1 - (i % 4);
            aseq[k] = bases[(i * 11 + 2) % 5];
        }
        let outs = round_trip(&rseq, &[(&rseq, &aseq)], 0);
        assert_eq!(outs, vec![aseq]);
    }

    #[test]
    fn sync_period_does_not_change_the_output() {
        let rseq = b"ACGTACGTACGTACGTACGTACGT".to_vec();
        let aseq = b"ACGTACTTACGTACGAACGTACGT".to_vec();
        for period in [0u64, 1, 3, 7, 200] {
            let outs = round_trip(&rseq, &[(&rseq, &aseq)], period);
            assert_eq!(outs, vec![aseq.clone()], "sync period {period}");
        }
    }

    #[test]
    fn truncated_stream_ends_decoding() {
        let mut buf = Vec::new();
        let mut bw = BitWriter::new(&mut buf);
        let mut enc = Encoder::new(0);
        enc.encode(b"ACGTACGT", b"ACGTACGT", &mut bw, None).unwrap();
        bw.flush().unwrap();

        // an empty stream decodes to an empty sequence
        let mut dec = Decoder::new(b"ACGTACGT".to_vec(), false);
        let mut out = Vec::new();
        dec.decode_into(&mut BitReader::new(&[][..]), &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn freeze_resolves_every_emitted_codeword() {
        let mut buf = Vec::new();
        let mut bw = BitWriter::new(&mut buf);
        let mut enc = Encoder::new(0);
        enc.encode(b"ACGTACGT", b"ACGAACGT", &mut bw, None).unwrap();
        bw.flush().unwrap();

        let mut dec = Decoder::new(b"ACGTACGT".to_vec(), true);
        let mut out = Vec::new();
        dec.decode_into(&mut BitReader::new(&buf[..]), &mut out).unwrap();
        dec.freeze().unwrap();
        assert_eq!(out, b"ACGAACGT");
        assert!(!dec.seen.is_empty());
        for &cw in &dec.seen {
            let nid = dec.phrase_node(cw).unwrap();
            let n = dec.dict().node(nid);
            assert!(n.id() <= cw && cw <= n.id() + n.length() as u64);
        }
    }
}
