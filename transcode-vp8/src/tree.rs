//! Binary token trees.
//!
//! A tree is a flat array of `i8` pairs. Entry `i + bit` holds either a
//! positive index of the next pair or a non-positive leaf `-value`. The
//! probability for the pair starting at `i` is `probs[i >> 1]`.

use crate::bool_decoder::{BoolDecoder, BoolEncoder};

/// Keyframe luma modes: B_PRED, DC, V, H, TM.
pub const KF_YMODE_TREE: [i8; 8] = [-4, 2, 4, 6, -0, -1, -2, -3];

/// Inter-frame luma modes: DC, V, H, TM, B_PRED.
pub const YMODE_TREE: [i8; 8] = [-0, 2, 4, 6, -1, -2, -3, -4];

/// Chroma modes: DC, V, H, TM.
pub const UV_MODE_TREE: [i8; 6] = [-0, 2, -1, 4, -2, -3];

/// Sub-block intra modes in [`BMode`](crate::BMode) order.
#[rustfmt::skip]
pub const BMODE_TREE: [i8; 18] = [
    -0, 2,          // DC
    -1, 4,          // TM
    -2, 6,          // VE
    8, 12,
    -3, 10,         // HE
    -5, -6,         // RD, VR
    -4, 14,         // LD
    -7, 16,         // VL
    -8, -9,         // HD, HU
];

/// Macroblock segment id.
pub const SEGMENT_TREE: [i8; 6] = [2, 4, -0, -1, -2, -3];

/// Inter modes: zero, nearest, near, new, split.
pub const MV_REF_TREE: [i8; 8] = [-0, 2, -1, 4, -2, 6, -3, -4];

/// SPLITMV shapes: 4x4 (3), 8x8 (2), 16x8 (0), 8x16 (1).
pub const MB_SPLIT_TREE: [i8; 6] = [-3, 2, -2, 4, -0, -1];

/// Sub-block motion vector references: left, above, zero, new.
pub const SUB_MV_REF_TREE: [i8; 6] = [-0, 2, -1, 4, -2, -3];

/// Short motion vector magnitudes 0..=7.
pub const SMALL_MV_TREE: [i8; 14] = [2, 8, 4, 6, -0, -1, -2, -3, 10, 12, -4, -5, -6, -7];

/// DCT tokens; see [`Token`](crate::tokens::Token) for leaf values.
#[rustfmt::skip]
pub const TOKEN_TREE: [i8; 22] = [
    -11, 2,         // EOB
    -0, 4,          // ZERO
    -1, 6,          // ONE
    8, 12,
    -2, 10,         // TWO
    -3, -4,         // THREE, FOUR
    14, 16,
    -5, -6,         // CAT1, CAT2
    18, 20,
    -7, -8,         // CAT3, CAT4
    -9, -10,        // CAT5, CAT6
];

/// Decode one value from `tree`.
#[inline]
pub fn read_tree(bd: &mut BoolDecoder<'_>, tree: &[i8], probs: &[u8]) -> u8 {
    read_tree_from(bd, tree, probs, 0)
}

/// Decode one value starting at node pair `start` instead of the root.
#[inline]
pub fn read_tree_from(bd: &mut BoolDecoder<'_>, tree: &[i8], probs: &[u8], start: usize) -> u8 {
    let mut i = start;
    loop {
        let next = tree[i + bd.read_bool(probs[i >> 1]) as usize];
        if next <= 0 {
            return (-next) as u8;
        }
        i = next as usize;
    }
}

/// Branch decisions leading from node pair `start` to leaf `value`.
pub fn tree_path(tree: &[i8], value: u8, start: usize) -> Option<Vec<(usize, bool)>> {
    for bit in [false, true] {
        let next = tree[start + bit as usize];
        if next <= 0 {
            if (-next) as u8 == value {
                return Some(vec![(start, bit)]);
            }
        } else if let Some(mut rest) = tree_path(tree, value, next as usize) {
            rest.insert(0, (start, bit));
            return Some(rest);
        }
    }
    None
}

/// Encode `value` with `tree`. Values absent from the tree are skipped.
pub fn write_tree(enc: &mut BoolEncoder, tree: &[i8], probs: &[u8], value: u8) {
    write_tree_from(enc, tree, probs, value, 0);
}

/// Encode `value` starting at node pair `start`.
pub fn write_tree_from(enc: &mut BoolEncoder, tree: &[i8], probs: &[u8], value: u8, start: usize) {
    if let Some(path) = tree_path(tree, value, start) {
        for (node, bit) in path {
            enc.write_bool(bit, probs[node >> 1]);
        }
    }
}
