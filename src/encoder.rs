//! ALZW encoder: turns a pairwise alignment into the token stream.
//!
//! Events are aggregated into match/mismatch runs, insertion bursts and
//! deletion runs; a run flushes when another kind begins or a sync point is
//! reached. Codewords are written with an adaptive width that grows by one
//! bit whenever the codeword space is about to cross a power of two, with
//! the WNODE sentinel keeping the decoder in lock-step.

use std::collections::VecDeque;
use std::io::Write;

use crate::alphabet::GAP;
use crate::bitio::BitWriter;
use crate::dict::{Dictionary, WNODE_ID};
use crate::error::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Match,
    Mismatch,
    Ins,
    Del,
}

/// Observability counters; not part of the wire format.
#[derive(Default)]
pub struct EncoderStats {
    pub matches: u64,
    pub mismatches: u64,
    pub inserts: u64,
    pub deletes: u64,

    /// Runs seen on the input, per kind (match/mismatch runs are counted
    /// together and matches separately, as overlapping classifications).
    pub mm_runs: u64,
    pub match_runs: u64,
    pub ins_runs: u64,
    pub del_runs: u64,

    /// Tokens emitted per kind.
    pub mm_outs: u64,
    pub ins_outs: u64,
    pub del_outs: u64,

    /// Bits emitted per kind.
    pub mm_bits: u64,
    pub ins_bits: u64,
    pub del_bits: u64,
}

pub struct Encoder {
    dict: Dictionary,
    ins_queue: VecDeque<u64>,
    sync_period: u64,
    width: u32,

    // open-run state
    nmm: u64,
    nins: u64,
    ndel: u64,
    last_op: Option<Op>,

    fmismatch: bool,
    fnew_node: bool,
    fwidth_inc: bool,

    stats: EncoderStats,
}

impl Encoder {
    /// `sync_period` is the fixed sync distance, or the minimum unchanged
    /// run length when an adaptive sync map is supplied; 0 disables
    /// periodic synchronisation.
    pub fn new(sync_period: u64) -> Self {
        let dict = Dictionary::new();
        Encoder {
            width: Dictionary::initial_width(),
            dict,
            ins_queue: VecDeque::new(),
            sync_period,
            nmm: 0,
            nins: 0,
            ndel: 0,
            last_op: None,
            fmismatch: false,
            fnew_node: false,
            fwidth_inc: false,
            stats: EncoderStats::default(),
        }
    }

    pub fn stats(&self) -> &EncoderStats {
        &self.stats
    }

    pub fn used_nodes(&self) -> u64 {
        self.dict.used_nodes()
    }

    pub fn real_nodes(&self) -> usize {
        self.dict.real_nodes()
    }

    /// Total bits emitted so far.
    pub fn bits(&self) -> u64 {
        self.stats.mm_bits + self.stats.ins_bits + self.stats.del_bits
    }

    /// Encode one pairwise alignment. The dictionary and the codeword width
    /// carry over between calls, so every alignment of a container must go
    /// through the same encoder in order.
    pub fn encode<W: Write>(
        &mut self,
        rseq: &[u8],
        aseq: &[u8],
        out: &mut BitWriter<W>,
        sync_map: Option<&[u32]>,
    ) -> Result<()> {
        assert_eq!(rseq.len(), aseq.len(), "aligned sequences differ in length");

        let mut roffset = 0u64;
        let mut next_sp = 0u64;
        let mut smi = 0usize;
        self.next_sync_point(&mut next_sp, &mut smi, sync_map);

        for (&c1, &c2) in rseq.iter().zip(aseq.iter()) {
            if c1 != GAP {
                if next_sp > 0 && next_sp == roffset {
                    self.next_sync_point(&mut next_sp, &mut smi, sync_map);
                    self.flush(out)?;
                }
                roffset += 1;
            }

            if c1 == GAP {
                self.ins_sym(c2, out)?;
            } else if c2 == GAP {
                self.del_sym(out)?;
            } else if c1 == c2 {
                self.match_sym(c2, out)?;
            } else {
                self.mismatch_sym(c2, out)?;
            }
        }

        self.flush(out)
    }

    /// Advance the sync milestone: the next fixed multiple, or the length
    /// of the next adaptive unchanged run of at least `sync_period`.
    fn next_sync_point(&self, current: &mut u64, index: &mut usize, sync_map: Option<&[u32]>) {
        match sync_map {
            Some(map) if self.sync_period > 0 => {
                let mut soffset = 0u64;
                while soffset < self.sync_period && *index < map.len() {
                    soffset += map[*index] as u64;
                    *index += 1;
                }
                *current += soffset;
            }
            _ => *current += self.sync_period,
        }
    }

    fn match_sym<W: Write>(&mut self, c: u8, out: &mut BitWriter<W>) -> Result<()> {
        self.flush_ins(out)?;
        self.flush_del(out)?;

        if self.last_op != Some(Op::Match) {
            self.stats.match_runs += 1;
        }
        if self.last_op != Some(Op::Match) && self.last_op != Some(Op::Mismatch) {
            self.stats.mm_runs += 1;
        }
        self.last_op = Some(Op::Match);

        if !self.fmismatch {
            let id = self.dict.current_id();
            let can_follow = self.dict.can_follow(c);
            let next = self.dict.next_codeword();
            if next & (next - 1) != 0 {
                // the nascent codeword stays below the width boundary
                self.dict.add(c);
                self.fnew_node = !can_follow;
            } else if can_follow {
                self.dict.follow(c);
            } else if self.fwidth_inc {
                // the boundary codeword itself, minted right after widening
                self.dict.add(c);
                self.fnew_node = true;
                self.fwidth_inc = false;
            } else {
                if self.width == 64 {
                    return Err(Error::format("codeword width overflow"));
                }

                self.out_mm(id, out)?;
                self.dict.new_phrase();

                self.out_mm(WNODE_ID, out)?;
                self.dict.follow(c);

                self.width += 1;
                self.nmm = 0;
                self.fnew_node = false;
                self.fmismatch = false;
                self.fwidth_inc = true;
            }
        } else if !self.dict.follow(c) {
            self.out_mm(self.dict.current_id(), out)?;
            self.dict.new_phrase();
            self.dict.follow(c);
            self.nmm = 0;
            self.fnew_node = false;
            self.fmismatch = false;
        }

        self.nmm += 1;
        self.stats.matches += 1;
        Ok(())
    }

    fn mismatch_sym<W: Write>(&mut self, c: u8, out: &mut BitWriter<W>) -> Result<()> {
        self.flush_ins(out)?;
        self.flush_del(out)?;

        if self.last_op != Some(Op::Match) && self.last_op != Some(Op::Mismatch) {
            self.stats.mm_runs += 1;
        }
        self.last_op = Some(Op::Mismatch);

        self.fmismatch = true;

        if self.fnew_node || !self.dict.follow(c) {
            self.out_mm(self.dict.current_id(), out)?;
            self.dict.new_phrase();
            self.dict.follow(c);
            self.nmm = 0;
            self.fnew_node = false;
        }

        self.nmm += 1;
        self.stats.mismatches += 1;
        Ok(())
    }

    fn ins_sym<W: Write>(&mut self, c: u8, out: &mut BitWriter<W>) -> Result<()> {
        self.flush_mm(out)?;
        self.flush_del(out)?;

        if self.last_op != Some(Op::Ins) {
            self.stats.ins_runs += 1;
        }
        self.last_op = Some(Op::Ins);

        // insertion phrases only ever reuse existing nodes
        if self.dict.follow(c) {
            self.nins += 1;
        } else {
            self.ins_queue.push_back(self.dict.current_id());
            self.stats.ins_outs += 1;
            self.dict.new_phrase();
            self.dict.follow(c);
            self.nins = 1;
        }

        self.stats.inserts += 1;
        Ok(())
    }

    fn del_sym<W: Write>(&mut self, out: &mut BitWriter<W>) -> Result<()> {
        self.flush_mm(out)?;
        self.flush_ins(out)?;

        if self.last_op != Some(Op::Del) {
            self.stats.del_runs += 1;
        }
        self.last_op = Some(Op::Del);

        self.ndel += 1;
        self.stats.deletes += 1;
        Ok(())
    }

    fn out_mm<W: Write>(&mut self, id: u64, out: &mut BitWriter<W>) -> Result<()> {
        out.write(id, self.width)?;
        self.stats.mm_bits += self.width as u64;
        self.stats.mm_outs += 1;
        Ok(())
    }

    fn flush_mm<W: Write>(&mut self, out: &mut BitWriter<W>) -> Result<()> {
        self.fmismatch = false;
        self.fnew_node = false;

        if self.nmm == 0 {
            return Ok(());
        }

        self.out_mm(self.dict.current_id(), out)?;
        self.dict.new_phrase();
        self.nmm = 0;
        Ok(())
    }

    fn flush_ins<W: Write>(&mut self, out: &mut BitWriter<W>) -> Result<()> {
        if self.nins > 0 {
            self.ins_queue.push_back(self.dict.current_id());
            self.stats.ins_outs += 1;
            self.dict.new_phrase();
            self.nins = 0;
        }

        if self.ins_queue.is_empty() {
            return Ok(());
        }

        out.write(crate::dict::INODE_ID, self.width)?;
        self.stats.ins_bits += self.width as u64;
        self.stats.ins_bits += out.write_delta(self.ins_queue.len() as u64)? as u64;

        while let Some(id) = self.ins_queue.pop_front() {
            out.write(id, self.width)?;
            self.stats.ins_bits += self.width as u64;
        }
        Ok(())
    }

    fn flush_del<W: Write>(&mut self, out: &mut BitWriter<W>) -> Result<()> {
        if self.ndel == 0 {
            return Ok(());
        }

        out.write(crate::dict::DNODE_ID, self.width)?;
        self.stats.del_bits += self.width as u64;
        self.stats.del_bits += out.write_delta(self.ndel)? as u64;
        self.stats.del_outs += 1;
        self.ndel = 0;
        Ok(())
    }

    /// Flush all three run kinds; used at sync points and at end of input.
    fn flush<W: Write>(&mut self, out: &mut BitWriter<W>) -> Result<()> {
        self.flush_mm(out)?;
        self.flush_ins(out)?;
        self.flush_del(out)
    }
}
