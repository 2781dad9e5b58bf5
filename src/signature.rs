//! Phrase signatures and the table of representatives for LM search.
//!
//! The signature of a phrase `w` records, for every DFA state `s`, where
//! `w` ends when started in `s` and whether it passes through the accepting
//! state on the way. Phrases with equal signatures are interchangeable for
//! the search, so one canonical representative per class suffices; the
//! table closes the class set under single-symbol extension.

use std::collections::VecDeque;

use ahash::RandomState;
use hashbrown::HashMap;

use crate::alphabet::ALPHABET_SIZE;
use crate::dfa::Dfa;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    dest: Vec<u32>,
    fin: Vec<bool>,
}

impl Signature {
    /// Signature of the empty phrase: identity, nothing accepted.
    pub fn epsilon(dfa: &Dfa) -> Self {
        let n = dfa.state_count();
        Signature {
            dest: (0..n as u32).collect(),
            fin: vec![false; n],
        }
    }

    /// Signature of `self`'s phrase extended by one symbol.
    pub fn extended(&self, dfa: &Dfa, sym: u8) -> Self {
        let accept = (dfa.state_count() - 1) as u32;
        let mut dest = self.dest.clone();
        let mut fin = self.fin.clone();
        for s in 0..dest.len() {
            let d = dfa.next(dest[s], sym);
            fin[s] |= d == accept;
            dest[s] = d;
        }
        Signature { dest, fin }
    }

    #[inline]
    pub fn destination(&self, sid: u32) -> u32 {
        self.dest[sid as usize]
    }

    #[inline]
    pub fn is_final(&self, sid: u32) -> bool {
        self.fin[sid as usize]
    }
}

pub type ReprId = u32;

struct Representative {
    sig: Signature,
    next: [ReprId; ALPHABET_SIZE],
}

pub struct ReprTable {
    reprs: Vec<Representative>,
}

impl ReprTable {
    /// Breadth-first closure from the epsilon representative. Candidates
    /// whose signature is already installed are redirected to the canonical
    /// class; new signatures enqueue one candidate per alphabet symbol.
    pub fn build(dfa: &Dfa) -> Self {
        let eps = Signature::epsilon(dfa);
        let mut reprs = vec![Representative {
            sig: eps.clone(),
            next: [0; ALPHABET_SIZE],
        }];
        let mut seen: HashMap<Signature, ReprId, RandomState> = HashMap::default();
        seen.insert(eps, 0);

        let mut queue: VecDeque<(ReprId, u8)> =
            (0..ALPHABET_SIZE as u8).map(|a| (0, a)).collect();

        while let Some((parent, sym)) = queue.pop_front() {
            let sig = reprs[parent as usize].sig.extended(dfa, sym);
            let id = match seen.get(&sig) {
                Some(&id) => id,
                None => {
                    let id = reprs.len() as ReprId;
                    seen.insert(sig.clone(), id);
                    reprs.push(Representative {
                        sig,
                        next: [0; ALPHABET_SIZE],
                    });
                    for a in 0..ALPHABET_SIZE as u8 {
                        queue.push_back((id, a));
                    }
                    id
                }
            };
            reprs[parent as usize].next[sym as usize] = id;
        }

        ReprTable { reprs }
    }

    #[inline]
    pub fn epsilon(&self) -> ReprId {
        0
    }

    #[inline]
    pub fn transition(&self, r: ReprId, sym: u8) -> ReprId {
        self.reprs[r as usize].next[sym as usize]
    }

    #[inline]
    pub fn signature(&self, r: ReprId) -> &Signature {
        &self.reprs[r as usize].sig
    }

    pub fn len(&self) -> usize {
        self.reprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reprs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::base_of;
    use crate::dfa::pattern_dfa;

    fn bases(s: &[u8]) -> Vec<u8> {
        s.iter().map(|&c| base_of(c)).collect()
    }

    fn phrase_sig(dfa: &Dfa, phrase: &[u8]) -> Signature {
        let mut sig = Signature::epsilon(dfa);
        for &sym in phrase {
            sig = sig.extended(dfa, sym);
        }
        sig
    }

    #[test]
    fn epsilon_is_the_identity() {
        let dfa = pattern_dfa(&bases(b"ACG"));
        let eps = Signature::epsilon(&dfa);
        for s in 0..dfa.state_count() as u32 {
            assert_eq!(eps.destination(s), s);
            assert!(!eps.is_final(s));
        }
    }

    #[test]
    fn final_flag_records_passing_through_accept() {
        let dfa = pattern_dfa(&bases(b"ACG"));
        let sig = phrase_sig(&dfa, &bases(b"ACGT"));
        // started at 0, the phrase reaches accept after ACG
        assert!(sig.is_final(0));
        // the T suffix leaves the automaton outside the accept state
        assert_ne!(sig.destination(0), 3);
        let no_hit = phrase_sig(&dfa, &bases(b"ACA"));
        assert!(!no_hit.is_final(0));
    }

    #[test]
    fn equal_signatures_stay_equal_under_any_suffix() {
        let dfa = pattern_dfa(&bases(b"ACAC"));
        // both phrases drive every state into the same class
        let u = bases(b"TTACAC");
        let v = bases(b"GGACAC");
        let su = phrase_sig(&dfa, &u);
        let sv = phrase_sig(&dfa, &v);
        assert!(su == sv);
        for suffix in [&b"A"[..], b"AC", b"ACAC", b"GTN"] {
            let a = phrase_sig(&dfa, &[u.clone(), bases(suffix)].concat());
            let b = phrase_sig(&dfa, &[v.clone(), bases(suffix)].concat());
            assert!(a == b, "suffix {:?} separates the class", suffix);
        }
    }

    #[test]
    fn table_transitions_agree_with_direct_signatures() {
        let dfa = pattern_dfa(&bases(b"ACA"));
        let table = ReprTable::build(&dfa);
        assert!(table.len() > 1);

        for phrase in [&b"A"[..], b"AC", b"ACA", b"ACACA", b"TTTT", b"NACAN"] {
            let mut r = table.epsilon();
            for &sym in &bases(phrase) {
                r = table.transition(r, sym);
            }
            let direct = phrase_sig(&dfa, &bases(phrase));
            assert!(*table.signature(r) == direct, "phrase {:?}", phrase);
        }
    }
}
