//! US English layout.

use super::SHIFT;

pub(super) const SCANCODES: &[(char, u8)] = &[
    ('\t', 0x2b),
    ('\n', 0x28),
    (' ', 0x2c),
    ('!', 0x1e | SHIFT),
    ('"', 0x34 | SHIFT),
    ('#', 0x20 | SHIFT),
    ('$', 0x21 | SHIFT),
    ('%', 0x22 | SHIFT),
    ('&', 0x24 | SHIFT),
    ('\'', 0x34),
    ('(', 0x26 | SHIFT),
    (')', 0x27 | SHIFT),
    ('*', 0x25 | SHIFT),
    ('+', 0x2e | SHIFT),
    (',', 0x36),
    ('-', 0x2d),
    ('.', 0x37),
    ('/', 0x38),
    ('0', 0x27),
    ('1', 0x1e),
    ('2', 0x1f),
    ('3', 0x20),
    ('4', 0x21),
    ('5', 0x22),
    ('6', 0x23),
    ('7', 0x24),
    ('8', 0x25),
    ('9', 0x26),
    (':', 0x33 | SHIFT),
    (';', 0x33),
    ('<', 0x36 | SHIFT),
    ('=', 0x2e),
    ('>', 0x37 | SHIFT),
    ('?', 0x38 | SHIFT),
    ('@', 0x1f | SHIFT),
    ('A', 0x04 | SHIFT),
    ('B', 0x05 | SHIFT),
    ('C', 0x06 | SHIFT),
    ('D', 0x07 | SHIFT),
    ('E', 0x08 | SHIFT),
    ('F', 0x09 | SHIFT),
    ('G', 0x0a | SHIFT),
    ('H', 0x0b | SHIFT),
    ('I', 0x0c | SHIFT),
    ('J', 0x0d | SHIFT),
    ('K', 0x0e | SHIFT),
    ('L', 0x0f | SHIFT),
    ('M', 0x10 | SHIFT),
    ('N', 0x11 | SHIFT),
    ('O', 0x12 | SHIFT),
    ('P', 0x13 | SHIFT),
    ('Q', 0x14 | SHIFT),
    ('R', 0x15 | SHIFT),
    ('S', 0x16 | SHIFT),
    ('T', 0x17 | SHIFT),
    ('U', 0x18 | SHIFT),
    ('V', 0x19 | SHIFT),
    ('W', 0x1a | SHIFT),
    ('X', 0x1b | SHIFT),
    ('Y', 0x1c | SHIFT),
    ('Z', 0x1d | SHIFT),
    ('[', 0x2f),
    ('\\', 0x31),
    (']', 0x30),
    ('^', 0x23 | SHIFT),
    ('_', 0x2d | SHIFT),
    ('`', 0x35),
    ('a', 0x04),
    ('b', 0x05),
    ('c', 0x06),
    ('d', 0x07),
    ('e', 0x08),
    ('f', 0x09),
    ('g', 0x0a),
    ('h', 0x0b),
    ('i', 0x0c),
    ('j', 0x0d),
    ('k', 0x0e),
    ('l', 0x0f),
    ('m', 0x10),
    ('n', 0x11),
    ('o', 0x12),
    ('p', 0x13),
    ('q', 0x14),
    ('r', 0x15),
    ('s', 0x16),
    ('t', 0x17),
    ('u', 0x18),
    ('v', 0x19),
    ('w', 0x1a),
    ('x', 0x1b),
    ('y', 0x1c),
    ('z', 0x1d),
    ('{', 0x2f | SHIFT),
    ('|', 0x31 | SHIFT),
    ('}', 0x30 | SHIFT),
    ('~', 0x35 | SHIFT),
];
