//! Byte-level stream searchers over a ring buffer of decoded symbols.
//!
//! A searcher accepts codewords, materialises their phrases through the
//! decoder's frozen codeword index and scans the ring with one of three
//! algorithms. Reported offsets are absolute positions in the target.

use crate::alphabet::ALPHABET_SIZE;
use crate::decoder::Decoder;
use crate::dfa::Dfa;
use crate::error::{Error, Result};

/// Match callback: `(sequence number, target offset)`.
pub type MatchHandler<'h> = &'h mut dyn FnMut(u64, u64);

enum Algo {
    Naive,
    Bmh { bcs: [u64; ALPHABET_SIZE] },
    Dfa { dfa: Dfa, state: u32 },
}

pub struct StreamSearcher<'d> {
    dec: &'d Decoder,
    pattern: Vec<u8>,

    ring: Vec<u8>,
    cap: u64,
    offset: u64,
    size: u64,
    seq: u64,

    /// Phrase scratch, filled suffix-first and drained from the back.
    phrase: Vec<u8>,

    algo: Algo,
}

impl<'d> StreamSearcher<'d> {
    pub fn naive(dec: &'d Decoder, pattern: &[u8]) -> Self {
        Self::with_algo(dec, pattern, Algo::Naive)
    }

    /// Boyer-Moore-Horspool: shift by the bad-character distance of the
    /// window's last symbol.
    pub fn bmh(dec: &'d Decoder, pattern: &[u8]) -> Self {
        let m = pattern.len() as u64;
        let mut bcs = [m; ALPHABET_SIZE];
        for (i, &sym) in pattern[..pattern.len() - 1].iter().enumerate() {
            bcs[sym as usize] = m - 1 - i as u64;
        }
        Self::with_algo(dec, pattern, Algo::Bmh { bcs })
    }

    pub fn dfa(dec: &'d Decoder, pattern: &[u8], dfa: Dfa) -> Self {
        Self::with_algo(dec, pattern, Algo::Dfa { dfa, state: 0 })
    }

    fn with_algo(dec: &'d Decoder, pattern: &[u8], algo: Algo) -> Self {
        assert!(!pattern.is_empty(), "empty pattern");
        let cap = ((pattern.len() as u64 * 2) + 4095) & !4095;
        StreamSearcher {
            dec,
            pattern: pattern.to_vec(),
            ring: vec![0u8; cap as usize],
            cap,
            offset: 0,
            size: 0,
            seq: 0,
            phrase: Vec::new(),
            algo,
        }
    }

    /// Restart the searcher at an absolute target offset.
    pub fn reset(&mut self, seq: u64, offset: u64) {
        self.size = 0;
        self.offset = offset;
        self.seq = seq;
        self.phrase.clear();
        if let Algo::Dfa { state, .. } = &mut self.algo {
            *state = 0;
        }
    }

    /// Feed one codeword: materialise its phrase into the ring and scan.
    /// Returns the phrase length.
    pub fn process_cw(&mut self, cw: u64, on_match: MatchHandler) -> Result<u64> {
        self.load_phrase(cw)?;
        let res = self.phrase.len() as u64;

        while let Some(sym) = self.phrase.pop() {
            if self.size >= self.cap {
                self.search_step(on_match);
            }
            let i = ((self.offset + self.size) % self.cap) as usize;
            self.ring[i] = sym;
            self.size += 1;
        }
        self.search_step(on_match);

        Ok(res)
    }

    /// Collect the phrase of `cw` suffix-first by walking towards the root.
    fn load_phrase(&mut self, mut cw: u64) -> Result<()> {
        let mut nid = self
            .dec
            .phrase_node(cw)
            .ok_or_else(|| Error::format(format!("unknown codeword: {cw:#x}")))?;

        loop {
            let n = self.dec.dict().node(nid);
            let Some(parent) = n.parent else { break };
            if cw > n.id() {
                cw -= 1;
                self.phrase.push(n.get_base((cw - n.id()) as u32));
            } else {
                self.phrase.push(n.symbol());
                nid = parent;
                let p = self.dec.dict().node(parent);
                cw = p.id() + p.length() as u64;
            }
        }

        Ok(())
    }

    fn search_step(&mut self, on_match: MatchHandler) {
        let m = self.pattern.len() as u64;
        match &mut self.algo {
            Algo::Naive => {
                while self.size >= m {
                    let hit = (0..m).all(|i| {
                        self.ring[((self.offset + i) % self.cap) as usize]
                            == self.pattern[i as usize]
                    });
                    if hit {
                        on_match(self.seq, self.offset);
                    }
                    self.offset += 1;
                    self.size -= 1;
                }
            }
            Algo::Bmh { bcs } => {
                let end = m - 1;
                while self.size >= m {
                    let hit = (0..m).rev().all(|i| {
                        self.ring[((self.offset + i) % self.cap) as usize]
                            == self.pattern[i as usize]
                    });
                    if hit {
                        on_match(self.seq, self.offset);
                    }
                    let last = self.ring[((self.offset + end) % self.cap) as usize];
                    let shift = bcs[last as usize];
                    self.offset += shift;
                    self.size -= shift;
                }
            }
            Algo::Dfa { dfa, state } => {
                let accept = (dfa.state_count() - 1) as u32;
                while self.size > 0 {
                    let sym = self.ring[(self.offset % self.cap) as usize];
                    self.offset += 1;
                    *state = dfa.next(*state, sym);
                    if *state == accept {
                        on_match(self.seq, self.offset - m);
                    }
                    self.size -= 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::base_of;
    use crate::bitio::{BitReader, BitWriter};
    use crate::dfa::pattern_dfa;
    use crate::encoder::Encoder;

    fn bases(s: &[u8]) -> Vec<u8> {
        s.iter().map(|&c| base_of(c)).collect()
    }

    /// Build a frozen decoder for an identity alignment of `target` and
    /// return it with the emitted codewords in stream order.
    fn frozen(target: &[u8]) -> (Decoder, Vec<u64>) {
        let mut buf = Vec::new();
        let mut bw = BitWriter::new(&mut buf);
        let mut enc = Encoder::new(7); // small period: many codewords
        enc.encode(target, target, &mut bw, None).unwrap();
        bw.flush().unwrap();

        let mut dec = Decoder::new(target.to_vec(), true);
        let mut out = Vec::new();
        dec.decode_into(&mut BitReader::new(&buf[..]), &mut out).unwrap();
        assert_eq!(out, target);
        dec.freeze().unwrap();

        // re-walk the stream to recover the codeword order
        let mut cws = Vec::new();
        let mut br = BitReader::new(&buf[..]);
        let mut width = crate::dict::Dictionary::initial_width();
        loop {
            let (cw, n) = br.read(width).unwrap();
            if n < width {
                break;
            }
            if cw == crate::dict::WNODE_ID {
                width += 1;
            } else {
                cws.push(cw);
            }
        }
        (dec, cws)
    }

    fn expected(target: &[u8], pattern: &[u8]) -> Vec<u64> {
        let m = pattern.len();
        (0..=target.len().saturating_sub(m))
            .filter(|&i| &target[i..i + m] == pattern)
            .map(|i| i as u64)
            .collect()
    }

    fn run(searcher: &mut StreamSearcher, cws: &[u64]) -> Vec<u64> {
        let mut hits = Vec::new();
        searcher.reset(1, 0);
        for &cw in cws {
            searcher
                .process_cw(cw, &mut |_, off| hits.push(off))
                .unwrap();
        }
        hits
    }

    #[test]
    fn searchers_agree_with_brute_force() {
        let target = b"ACACACGTTTACGNNACGACACGT";
        let (dec, cws) = frozen(target);

        for pattern in [&b"ACG"[..], b"ACACG", b"TTT", b"NN", b"GTT", b"A", b"ACGTACGT"] {
            let p = bases(pattern);
            let want = expected(target, pattern);

            let naive = run(&mut StreamSearcher::naive(&dec, &p), &cws);
            assert_eq!(naive, want, "naive, pattern {:?}", pattern);

            let bmh = run(&mut StreamSearcher::bmh(&dec, &p), &cws);
            assert_eq!(bmh, want, "bmh, pattern {:?}", pattern);

            let dfa = run(
                &mut StreamSearcher::dfa(&dec, &p, pattern_dfa(&p)),
                &cws,
            );
            assert_eq!(dfa, want, "dfa, pattern {:?}", pattern);
        }
    }

    #[test]
    fn overlapping_occurrences_are_all_reported() {
        let target = b"ANNNA";
        let (dec, cws) = frozen(target);
        let p = bases(b"NN");
        for mut s in [
            StreamSearcher::naive(&dec, &p),
            StreamSearcher::dfa(&dec, &p, pattern_dfa(&p)),
        ] {
            assert_eq!(run(&mut s, &cws), vec![1, 2]);
        }
    }

    #[test]
    fn reset_restarts_reporting_offsets() {
        let target = b"ACACACG";
        let (dec, cws) = frozen(target);
        let p = bases(b"ACG");
        let mut s = StreamSearcher::dfa(&dec, &p, pattern_dfa(&p));
        assert_eq!(run(&mut s, &cws), vec![4]);
        // feeding the same codewords again from a fresh offset repeats it
        assert_eq!(run(&mut s, &cws), vec![4]);
    }
}
