//! Compressed-domain search over ALZW containers.
//!
//! The engine decodes the container once (dictionary only), freezes the
//! codeword index, and then walks the raw token stream per query. Stream
//! searchers materialise every phrase; the Lahoda-Melichar task instead
//! steps a signature per codeword and only falls back to byte-level
//! scanning when a match might end inside the current phrase.

use std::collections::VecDeque;

use clap::ValueEnum;
use rustc_hash::FxHashMap;

use crate::alphabet::normalize;
use crate::bitio::BitReader;
use crate::container;
use crate::decoder::Decoder;
use crate::dfa::pattern_dfa;
use crate::dict::{Dictionary, DNODE_ID, INODE_ID, WNODE_ID};
use crate::error::{Error, Result};
use crate::search::{MatchHandler, StreamSearcher};
use crate::signature::{ReprId, ReprTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    /// Lahoda-Melichar codeword skipping
    Lm,
    /// Byte-level DFA over decoded phrases
    Dfa,
    /// Boyer-Moore-Horspool
    Bmh,
    /// Naive window comparison
    #[value(name = "s")]
    Naive,
}

/// Per-codeword processor driven by the container walk.
trait CwProcessor {
    fn begin_sequence(&mut self, seq: u64);
    fn process_cw(&mut self, cw: u64, on_match: MatchHandler) -> Result<u64>;
}

pub struct SearchEngine {
    dec: Decoder,
    container: Vec<u8>,
    names: Vec<String>,
}

impl SearchEngine {
    /// Decode every sequence of `container` against `rseq` to rebuild the
    /// dictionary, then freeze it for searching.
    pub fn new(rseq: Vec<u8>, container: Vec<u8>) -> Result<Self> {
        let mut dec = Decoder::new(rseq, true);
        let names;
        {
            let mut input = BitReader::new(&container[..]);
            names = container::read_header(&mut input)?;
            for _ in 0..names.len().max(1) {
                dec.decode(&mut input)?;
            }
        }
        dec.freeze()?;

        Ok(SearchEngine {
            dec,
            container,
            names,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn sequence_count(&self) -> usize {
        self.names.len().max(1)
    }

    /// Run one query; matches are reported as `(sequence, offset)` with
    /// 1-based sequence numbers, in stream order.
    pub fn search(&self, alg: Algorithm, query: &str, on_match: MatchHandler) -> Result<()> {
        let pattern: Vec<u8> = normalize(query.as_bytes(), false)?
            .iter()
            .map(|&c| crate::alphabet::base_of(c))
            .collect();
        if pattern.is_empty() {
            return Err(Error::parse("empty query"));
        }

        match alg {
            Algorithm::Naive => {
                let ss = StreamSearcher::naive(&self.dec, &pattern);
                self.walk(&mut SsProcessor { ss }, on_match)
            }
            Algorithm::Bmh => {
                let ss = StreamSearcher::bmh(&self.dec, &pattern);
                self.walk(&mut SsProcessor { ss }, on_match)
            }
            Algorithm::Dfa => {
                let dfa = pattern_dfa(&pattern);
                let ss = StreamSearcher::dfa(&self.dec, &pattern, dfa);
                self.walk(&mut SsProcessor { ss }, on_match)
            }
            Algorithm::Lm => {
                let mut lm = LmProcessor::new(&self.dec, &pattern);
                self.walk(&mut lm, on_match)
            }
        }
    }

    /// Re-read the raw token stream, dispatching codewords to `proc` and
    /// tracking sequence boundaries on the reference axis.
    fn walk(&self, proc: &mut dyn CwProcessor, on_match: MatchHandler) -> Result<()> {
        let mut input = BitReader::new(&self.container[..]);
        container::read_header(&mut input)?;

        let seqc = self.sequence_count();
        let rlen = self.dec.reference_len() as u64;
        let mut width = Dictionary::initial_width();
        let mut rseq_offset = 0u64;
        let mut seq = 1u64;
        let mut done = 0usize;

        proc.begin_sequence(seq);

        while done < seqc {
            let (cw, n) = input.read(width)?;
            if n < width {
                return Err(Error::format("unexpected end of stream"));
            }

            if cw == DNODE_ID {
                rseq_offset += input.read_delta()?;
            } else if cw == INODE_ID {
                let count = input.read_delta()?;
                for _ in 0..count {
                    let (cwi, n) = input.read(width)?;
                    if n < width {
                        return Err(Error::format("unexpected end of stream"));
                    }
                    proc.process_cw(cwi, on_match)?;
                }
            } else if cw == WNODE_ID {
                if width == 64 {
                    return Err(Error::format("codeword width overflow"));
                }
                width += 1;
            } else {
                rseq_offset += proc.process_cw(cw, on_match)?;
            }

            if rseq_offset >= rlen {
                rseq_offset = 0;
                seq += 1;
                done += 1;
                proc.begin_sequence(seq);
            }
        }

        Ok(())
    }
}

struct SsProcessor<'d> {
    ss: StreamSearcher<'d>,
}

impl CwProcessor for SsProcessor<'_> {
    fn begin_sequence(&mut self, seq: u64) {
        self.ss.reset(seq, 0);
    }

    fn process_cw(&mut self, cw: u64, on_match: MatchHandler) -> Result<u64> {
        self.ss.process_cw(cw, on_match)
    }
}

/// LM state: the DFA state after the consumed part of the target, a
/// trailing codeword window long enough to bracket any match, and the
/// monotone duplicate filter for fallback rescans.
struct LmProcessor<'d> {
    dec: &'d Decoder,
    table: ReprTable,
    state_count: u64,
    fallback: StreamSearcher<'d>,

    /// Codeword -> representative memo, shared across the whole stream.
    rmap: FxHashMap<u64, ReprId>,
    suffix_stack: Vec<u8>,

    state: u32,
    seq: u64,
    window: VecDeque<(u64, u64)>,
    window_offset: u64,
    window_size: u64,
    last_match: Option<u64>,
}

impl<'d> LmProcessor<'d> {
    fn new(dec: &'d Decoder, pattern: &[u8]) -> Self {
        let dfa = pattern_dfa(pattern);
        let table = ReprTable::build(&dfa);
        let state_count = dfa.state_count() as u64;
        let fallback = StreamSearcher::dfa(dec, pattern, dfa);
        LmProcessor {
            dec,
            table,
            state_count,
            fallback,
            rmap: FxHashMap::default(),
            suffix_stack: Vec::new(),
            state: 0,
            seq: 1,
            window: VecDeque::new(),
            window_offset: 0,
            window_size: 0,
            last_match: None,
        }
    }

    /// Representative of the phrase behind `cw`, memoised per codeword.
    /// On a miss the owning node's path is walked until a memoised
    /// ancestor codeword (or the root), then the collected suffix is
    /// replayed through the representative trie.
    fn representative(&mut self, cw: u64) -> Result<ReprId> {
        if let Some(&r) = self.rmap.get(&cw) {
            return Ok(r);
        }

        let orig = cw;
        let mut cw = cw;
        let mut nid = self
            .dec
            .phrase_node(cw)
            .ok_or_else(|| Error::format(format!("unknown codeword: {cw:#x}")))?;

        loop {
            if self.rmap.contains_key(&cw) {
                break;
            }
            let n = self.dec.dict().node(nid);
            let Some(parent) = n.parent else { break };
            if cw > n.id() {
                cw -= 1;
                self.suffix_stack.push(n.get_base((cw - n.id()) as u32));
            } else {
                self.suffix_stack.push(n.symbol());
                nid = parent;
                let p = self.dec.dict().node(parent);
                cw = p.id() + p.length() as u64;
            }
        }

        let mut r = if self.dec.dict().node(nid).parent.is_some() {
            self.rmap[&cw]
        } else {
            self.table.epsilon()
        };
        while let Some(sym) = self.suffix_stack.pop() {
            r = self.table.transition(r, sym);
        }

        self.rmap.insert(orig, r);
        Ok(r)
    }

    fn phrase_length(&self, cw: u64) -> u64 {
        let Some(nid) = self.dec.phrase_node(cw) else {
            return 0;
        };
        let n = self.dec.dict().node(nid);
        n.phrase_length() as u64 - (n.id() + n.length() as u64 - cw)
    }
}

impl CwProcessor for LmProcessor<'_> {
    fn begin_sequence(&mut self, seq: u64) {
        self.seq = seq;
        self.state = 0;
        self.window.clear();
        self.window_offset = 0;
        self.window_size = 0;
        self.last_match = None;
    }

    fn process_cw(&mut self, cw: u64, on_match: MatchHandler) -> Result<u64> {
        let repr = self.representative(cw)?;

        if self.table.signature(repr).is_final(self.state) {
            // a match may end inside this phrase: rescan the window plus
            // this codeword at byte level, dropping already-seen offsets
            let mut last = self.last_match;
            self.fallback.reset(self.seq, self.window_offset);
            {
                let mut filtered = |seq: u64, offset: u64| {
                    if last.map_or(true, |l| offset > l) {
                        last = Some(offset);
                        on_match(seq, offset);
                    }
                };
                for &(wcw, _) in &self.window {
                    self.fallback.process_cw(wcw, &mut filtered)?;
                }
                self.fallback.process_cw(cw, &mut filtered)?;
            }
            self.last_match = last;
        }

        self.state = self.table.signature(repr).destination(self.state);

        let plen = self.phrase_length(cw);
        self.window.push_back((cw, plen));
        self.window_size += plen;

        while let Some(&(_, oldest)) = self.window.front() {
            if self.window_size - oldest < self.state_count {
                break;
            }
            self.window.pop_front();
            self.window_size -= oldest;
            self.window_offset += oldest;
        }

        Ok(plen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::BitWriter;
    use crate::encoder::Encoder;

    /// Compress a set of alignments into a full container and return it
    /// together with the decoded targets.
    fn build(
        rseq: &[u8],
        alignments: &[(&[u8], &[u8])],
        sync: u64,
        names: &[String],
    ) -> (Vec<u8>, Vec<Vec<u8>>) {
        let mut buf = Vec::new();
        let mut bw = BitWriter::new(&mut buf);
        container::write_header(&mut bw, names).unwrap();
        let mut enc = Encoder::new(sync);
        for (r, a) in alignments {
            enc.encode(r, a, &mut bw, None).unwrap();
        }
        bw.flush().unwrap();

        let mut dec = Decoder::new(rseq.to_vec(), false);
        let mut br = BitReader::new(&buf[..]);
        container::read_header(&mut br).unwrap();
        let mut targets = Vec::new();
        for _ in alignments {
            let mut out = Vec::new();
            dec.decode_into(&mut br, &mut out).unwrap();
            targets.push(out);
        }
        (buf, targets)
    }

    fn brute(targets: &[Vec<u8>], pattern: &[u8]) -> Vec<(u64, u64)> {
        let m = pattern.len();
        let mut hits = Vec::new();
        for (s, t) in targets.iter().enumerate() {
            for i in 0..=t.len().saturating_sub(m) {
                if &t[i..i + m] == pattern {
                    hits.push((s as u64 + 1, i as u64));
                }
            }
        }
        hits
    }

    fn engine_hits(
        engine: &SearchEngine,
        alg: Algorithm,
        query: &str,
    ) -> Vec<(u64, u64)> {
        let mut hits = Vec::new();
        engine
            .search(alg, query, &mut |seq, off| hits.push((seq, off)))
            .unwrap();
        hits
    }

    #[test]
    fn anonymous_container_reports_sequence_one() {
        let (buf, targets) = build(b"ACACACG", &[(b"ACACACG", b"ACACACG")], 0, &[]);
        let engine = SearchEngine::new(b"ACACACG".to_vec(), buf).unwrap();
        assert_eq!(engine.sequence_count(), 1);
        assert_eq!(brute(&targets, b"ACG"), vec![(1, 4)]);
        for alg in [Algorithm::Lm, Algorithm::Dfa, Algorithm::Bmh, Algorithm::Naive] {
            assert_eq!(engine_hits(&engine, alg, "ACG"), vec![(1, 4)], "{alg:?}");
        }
    }

    #[test]
    fn all_algorithms_agree_on_a_mixed_container() {
        let rseq = b"ACGTACGTACGTACGTACGTNNACGT".to_vec();
        let alignments: &[(&[u8], &[u8])] = &[
            (&rseq, b"ACGTACGTACGTACGTACGTNNACGT"),
            (&rseq, b"ACGAACGTACGTACTTACGTNNACGA"),
            (b"ACGTACGTACGT-ACGTACGTNNACGT", b"ACGTACGTACGTTACG-ACGTNNACGT"),
        ];
        let names: Vec<String> = (0..alignments.len()).map(|i| format!("seq{i}")).collect();
        let (buf, targets) = build(&rseq, alignments, 200, &names);
        let engine = SearchEngine::new(rseq.clone(), buf).unwrap();
        assert_eq!(engine.names().len(), 3);

        for query in ["ACGT", "ACG", "NN", "TACG", "ACGTACGT", "N", "GTAC"] {
            let want = brute(&targets, query.as_bytes());
            for alg in [Algorithm::Lm, Algorithm::Dfa, Algorithm::Bmh, Algorithm::Naive] {
                assert_eq!(
                    engine_hits(&engine, alg, query),
                    want,
                    "algorithm {alg:?}, query {query}"
                );
            }
        }
    }

    #[test]
    fn lm_reports_no_duplicates_for_periodic_patterns() {
        // short sync period forces many small codewords, so the fallback
        // rescans overlapping windows repeatedly
        let rseq = b"ACACACACACACACACACACAC".to_vec();
        let (buf, targets) = build(&rseq, &[(&rseq, &rseq)], 3, &[]);
        let engine = SearchEngine::new(rseq.clone(), buf).unwrap();

        let want = brute(&targets, b"ACAC");
        assert!(want.len() > 5);
        let got = engine_hits(&engine, Algorithm::Lm, "ACAC");
        assert_eq!(got, want);
    }

    #[test]
    fn queries_with_illegal_characters_are_rejected() {
        let (buf, _) = build(b"ACGT", &[(b"ACGT", b"ACGT")], 0, &[]);
        let engine = SearchEngine::new(b"ACGT".to_vec(), buf).unwrap();
        assert!(engine.search(Algorithm::Lm, "AXGT", &mut |_, _| {}).is_err());
    }
}
