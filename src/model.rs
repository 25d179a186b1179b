//! Adaptive probability tables and the LZMA state automaton, shared by the
//! encoder and the decoder.

use crate::params::LzmaProperties;
use alloc::vec;
use alloc::vec::Vec;

/// Number of bits of precision of a probability.
pub const BIT_MODEL_TOTAL_BITS: u32 = 11;
/// Scale of a probability.
pub const BIT_MODEL_TOTAL: u32 = 1 << BIT_MODEL_TOTAL_BITS;
/// Initial value of every probability (one half).
pub const PROB_INIT: u16 = (BIT_MODEL_TOTAL >> 1) as u16;
/// Adaptation speed of a probability.
pub const MOVE_BITS: u32 = 5;

pub const NUM_STATES: usize = 12;
pub const POS_STATES_MAX: usize = 1 << 4;

pub const MATCH_MIN_LEN: usize = 2;
pub const MATCH_MAX_LEN: usize = MATCH_MIN_LEN + LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS + 255;
pub const LEN_LOW_SYMBOLS: usize = 1 << 3;
pub const LEN_MID_SYMBOLS: usize = 1 << 3;

pub const LEN_TO_POS_STATES: usize = 4;
pub const POS_SLOT_BITS: usize = 6;
pub const START_POS_MODEL_INDEX: usize = 4;
pub const END_POS_MODEL_INDEX: usize = 14;
pub const NUM_FULL_DISTANCES: usize = 1 << (END_POS_MODEL_INDEX >> 1);
pub const ALIGN_BITS: usize = 4;

/// Decoded distance value that terminates an LZMA1 stream.
pub const END_MARKER_DISTANCE: u32 = 0xFFFF_FFFF;

/// `log2(value)` if `value` is a power of two.
pub const fn exact_log2(value: usize) -> Option<usize> {
    if value.is_power_of_two() {
        Some(value.trailing_zeros() as usize)
    } else {
        None
    }
}

/// What kind of token was produced last; only used to select contexts.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct State(usize);

impl State {
    pub const fn new() -> Self {
        State(0)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn is_literal(self) -> bool {
        self.0 < 7
    }

    pub fn update_literal(&mut self) {
        self.0 = match self.0 {
            0..=3 => 0,
            4..=9 => self.0 - 3,
            _ => self.0 - 6,
        };
    }

    pub fn update_match(&mut self) {
        self.0 = if self.0 < 7 { 7 } else { 10 };
    }

    pub fn update_rep(&mut self) {
        self.0 = if self.0 < 7 { 8 } else { 11 };
    }

    pub fn update_short_rep(&mut self) {
        self.0 = if self.0 < 7 { 9 } else { 11 };
    }
}

/// A binary tree of `PROBS_ARRAY_LEN` probabilities coding
/// `log2(PROBS_ARRAY_LEN)`-bit symbols.
#[derive(Clone, Copy, Debug)]
pub struct BitTree<const PROBS_ARRAY_LEN: usize> {
    pub probs: [u16; PROBS_ARRAY_LEN],
}

impl<const PROBS_ARRAY_LEN: usize> BitTree<PROBS_ARRAY_LEN> {
    pub const NUM_BITS: usize = match exact_log2(PROBS_ARRAY_LEN) {
        Some(bits) => bits,
        None => 0,
    };

    pub const fn new() -> Self {
        BitTree {
            probs: [PROB_INIT; PROBS_ARRAY_LEN],
        }
    }

    pub fn reset(&mut self) {
        self.probs = [PROB_INIT; PROBS_ARRAY_LEN];
    }
}

/// Probabilities of the three-tier length coder.
#[derive(Clone, Debug)]
pub struct LenModel {
    pub choice: u16,
    pub choice2: u16,
    pub low: [BitTree<{ 1 << 3 }>; POS_STATES_MAX],
    pub mid: [BitTree<{ 1 << 3 }>; POS_STATES_MAX],
    pub high: BitTree<{ 1 << 8 }>,
}

impl LenModel {
    pub const fn new() -> Self {
        LenModel {
            choice: PROB_INIT,
            choice2: PROB_INIT,
            low: [BitTree::new(); POS_STATES_MAX],
            mid: [BitTree::new(); POS_STATES_MAX],
            high: BitTree::new(),
        }
    }

    pub fn reset(&mut self) {
        self.choice = PROB_INIT;
        self.choice2 = PROB_INIT;
        self.low.iter_mut().for_each(BitTree::reset);
        self.mid.iter_mut().for_each(BitTree::reset);
        self.high.reset();
    }
}

/// Every adaptive probability of one LZMA coder.
#[derive(Clone, Debug)]
pub struct LzmaModel {
    /// `0x300` probabilities per literal context.
    pub literal_probs: Vec<u16>,
    /// Indexed by `(state << 4) + pos_state`.
    pub is_match: [u16; NUM_STATES << 4],
    pub is_rep: [u16; NUM_STATES],
    pub is_rep_g0: [u16; NUM_STATES],
    pub is_rep_g1: [u16; NUM_STATES],
    pub is_rep_g2: [u16; NUM_STATES],
    /// Indexed by `(state << 4) + pos_state`.
    pub is_rep_0long: [u16; NUM_STATES << 4],
    pub pos_slot: [BitTree<{ 1 << POS_SLOT_BITS }>; LEN_TO_POS_STATES],
    pub pos_decoders: [u16; 1 + NUM_FULL_DISTANCES - END_POS_MODEL_INDEX],
    pub align: BitTree<{ 1 << ALIGN_BITS }>,
    pub len: LenModel,
    pub rep_len: LenModel,
}

impl LzmaModel {
    pub fn new(props: &LzmaProperties) -> Self {
        LzmaModel {
            literal_probs: vec![PROB_INIT; literal_probs_len(props)],
            is_match: [PROB_INIT; NUM_STATES << 4],
            is_rep: [PROB_INIT; NUM_STATES],
            is_rep_g0: [PROB_INIT; NUM_STATES],
            is_rep_g1: [PROB_INIT; NUM_STATES],
            is_rep_g2: [PROB_INIT; NUM_STATES],
            is_rep_0long: [PROB_INIT; NUM_STATES << 4],
            pos_slot: [BitTree::new(); LEN_TO_POS_STATES],
            pos_decoders: [PROB_INIT; 1 + NUM_FULL_DISTANCES - END_POS_MODEL_INDEX],
            align: BitTree::new(),
            len: LenModel::new(),
            rep_len: LenModel::new(),
        }
    }

    /// Reset every probability, resizing the literal tables for `props`.
    pub fn reset(&mut self, props: &LzmaProperties) {
        self.literal_probs.clear();
        self.literal_probs.resize(literal_probs_len(props), PROB_INIT);
        self.is_match = [PROB_INIT; NUM_STATES << 4];
        self.is_rep = [PROB_INIT; NUM_STATES];
        self.is_rep_g0 = [PROB_INIT; NUM_STATES];
        self.is_rep_g1 = [PROB_INIT; NUM_STATES];
        self.is_rep_g2 = [PROB_INIT; NUM_STATES];
        self.is_rep_0long = [PROB_INIT; NUM_STATES << 4];
        self.pos_slot.iter_mut().for_each(BitTree::reset);
        self.pos_decoders = [PROB_INIT; 1 + NUM_FULL_DISTANCES - END_POS_MODEL_INDEX];
        self.align.reset();
        self.len.reset();
        self.rep_len.reset();
    }

    /// Calls `f` on every probability of the model.
    #[cfg(test)]
    pub fn for_each_prob(&self, mut f: impl FnMut(u16)) {
        self.literal_probs.iter().copied().for_each(&mut f);
        self.is_match.iter().copied().for_each(&mut f);
        self.is_rep.iter().copied().for_each(&mut f);
        self.is_rep_g0.iter().copied().for_each(&mut f);
        self.is_rep_g1.iter().copied().for_each(&mut f);
        self.is_rep_g2.iter().copied().for_each(&mut f);
        self.is_rep_0long.iter().copied().for_each(&mut f);
        for tree in self.pos_slot.iter() {
            tree.probs.iter().copied().for_each(&mut f);
        }
        self.pos_decoders.iter().copied().for_each(&mut f);
        self.align.probs.iter().copied().for_each(&mut f);
        for len in [&self.len, &self.rep_len].iter() {
            f(len.choice);
            f(len.choice2);
            for tree in len.low.iter().chain(len.mid.iter()) {
                tree.probs.iter().copied().for_each(&mut f);
            }
            len.high.probs.iter().copied().for_each(&mut f);
        }
    }
}

fn literal_probs_len(props: &LzmaProperties) -> usize {
    0x300 << (props.lc + props.lp)
}

/// Offset of the literal coder selected by the previous byte and the
/// position.
pub fn literal_offset(props: &LzmaProperties, prev_byte: u8, pos: u64) -> usize {
    let lp_mask = (1u64 << props.lp) - 1;
    let lit_state =
        (((pos & lp_mask) as usize) << props.lc) + ((prev_byte as usize) >> (8 - props.lc));
    0x300 * lit_state
}

pub fn pos_state(props: &LzmaProperties, pos: u64) -> usize {
    (pos & ((1u64 << props.pb) - 1)) as usize
}

/// Class of the distance models used for a match of length `len`.
pub fn len_to_pos_state(len: usize) -> usize {
    core::cmp::min(len - MATCH_MIN_LEN, LEN_TO_POS_STATES - 1)
}

/// Magnitude class of a zero-based distance.
pub fn pos_slot(dist: u32) -> u32 {
    if dist < START_POS_MODEL_INDEX as u32 {
        return dist;
    }
    let n = 31 - dist.leading_zeros();
    (n << 1) | ((dist >> (n - 1)) & 1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn state_transitions() {
        let literal: [usize; NUM_STATES] = [0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 4, 5];
        let matched: [usize; NUM_STATES] = [7, 7, 7, 7, 7, 7, 7, 10, 10, 10, 10, 10];
        let rep: [usize; NUM_STATES] = [8, 8, 8, 8, 8, 8, 8, 11, 11, 11, 11, 11];
        let short_rep: [usize; NUM_STATES] = [9, 9, 9, 9, 9, 9, 9, 11, 11, 11, 11, 11];
        for s in 0..NUM_STATES {
            let mut state = State(s);
            state.update_literal();
            assert_eq!(state.index(), literal[s]);
            let mut state = State(s);
            state.update_match();
            assert_eq!(state.index(), matched[s]);
            let mut state = State(s);
            state.update_rep();
            assert_eq!(state.index(), rep[s]);
            let mut state = State(s);
            state.update_short_rep();
            assert_eq!(state.index(), short_rep[s]);
            assert_eq!(State(s).is_literal(), s < 7);
        }
    }

    #[test]
    fn verify_exact_log2() {
        assert_eq!(Some(0), exact_log2(1 << 0));
        assert_eq!(Some(1), exact_log2(1 << 1));
        assert_eq!(None, exact_log2(3));
        assert_eq!(None, exact_log2(0x300));
        assert_eq!(Some(8), exact_log2(1 << 8));
        assert_eq!(None, exact_log2(0));
    }

    #[test]
    fn bit_tree_widths() {
        assert_eq!(BitTree::<8>::NUM_BITS, 3);
        assert_eq!(BitTree::<16>::NUM_BITS, 4);
        assert_eq!(BitTree::<64>::NUM_BITS, 6);
        assert_eq!(BitTree::<256>::NUM_BITS, 8);
    }

    #[test]
    fn pos_slots() {
        assert_eq!(pos_slot(0), 0);
        assert_eq!(pos_slot(3), 3);
        assert_eq!(pos_slot(4), 4);
        assert_eq!(pos_slot(5), 4);
        assert_eq!(pos_slot(6), 5);
        assert_eq!(pos_slot(7), 5);
        assert_eq!(pos_slot(8), 6);
        assert_eq!(pos_slot(127), 13);
        assert_eq!(pos_slot(128), 14);
        assert_eq!(pos_slot(END_MARKER_DISTANCE), 63);
    }

    #[test]
    fn literal_contexts() {
        let props = LzmaProperties { lc: 3, lp: 0, pb: 2 };
        assert_eq!(literal_offset(&props, 0, 0), 0);
        assert_eq!(literal_offset(&props, 0xE0, 5), 0x300 * 7);
        let props = LzmaProperties { lc: 0, lp: 2, pb: 0 };
        assert_eq!(literal_offset(&props, 0xFF, 5), 0x300);
        assert_eq!(len_to_pos_state(2), 0);
        assert_eq!(len_to_pos_state(5), 3);
        assert_eq!(len_to_pos_state(MATCH_MAX_LEN), 3);
        assert_eq!(MATCH_MAX_LEN, 273);
    }
}
