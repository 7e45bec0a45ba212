//! Dictionaries compiled into the crate.
//!
//! Code tables live in `markerframe-aruco/data/*_CODES.json`, in the same
//! layout as a runtime dictionary file; the build script turns each into a
//! constant here. Bits are row-major, least significant bit first, black = 1,
//! which matches OpenCV's predefined tables.

#![allow(clippy::unreadable_literal)]

use crate::Dictionary;

/// A code table embedded at build time.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinDictionary {
    pub name: &'static str,
    pub marker_size: usize,
    pub max_correction_bits: u8,
    pub codes: &'static [u64],
}

impl BuiltinDictionary {
    pub fn to_dictionary(&self) -> Dictionary {
        Dictionary {
            name: self.name.to_string(),
            marker_size: self.marker_size,
            max_correction_bits: self.max_correction_bits,
            codes: self.codes.to_vec(),
        }
    }
}

include!(concat!(env!("OUT_DIR"), "/builtins.rs"));

/// Name the original detection scripts were written against.
pub const DEFAULT_DICTIONARY: &str = "DICT_5X5_1000";

pub fn builtin_dictionary(name: &str) -> Option<Dictionary> {
    BUILTINS
        .iter()
        .find(|b| b.name.eq_ignore_ascii_case(name))
        .map(BuiltinDictionary::to_dictionary)
}

pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|b| b.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotate_code_u64;

    #[test]
    fn opencv_tables_are_embedded() {
        let d50 = builtin_dictionary("DICT_4X4_50").expect("4x4_50");
        let d100 = builtin_dictionary("dict_4x4_100").expect("4x4_100");
        assert_eq!(d50.len(), 50);
        assert_eq!(d100.len(), 100);
        assert_eq!(d50.marker_size, 4);
        // the smaller table is a prefix of the larger one, as in OpenCV
        assert_eq!(d50.codes[..], d100.codes[..50]);
        // id 0 of DICT_4X4_* (OpenCV bytes 181, 50)
        assert_eq!(d50.codes[0], 0x4cad);
        assert!(builtin_names().any(|n| n == "DICT_4X4_100"));
        assert!(builtin_dictionary("DICT_9X9_1").is_none());
    }

    #[test]
    fn builtin_codes_are_unique_under_rotation() {
        let dict = builtin_dictionary("DICT_4X4_100").expect("4x4_100");
        for (i, &a) in dict.codes.iter().enumerate() {
            for &b in &dict.codes[i + 1..] {
                for rot in 0..4 {
                    assert_ne!(rotate_code_u64(a, 4, rot), b);
                }
            }
        }
    }
}
