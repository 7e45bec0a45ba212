//! ArUco-style marker dictionaries and a compact square-marker detector.
//!
//! This crate provides:
//! - OpenCV code tables compiled in ([`builtin_dictionary`]) and dictionaries
//!   loaded at runtime from JSON,
//! - matching observed codes against a dictionary over all four rotations,
//! - a detector ([`ArucoDetector`]) that finds dark square outlines, decodes
//!   their bits and implements [`markerframe_core::MarkerDetector`].
//!
//! The detector targets clean, well-lit prints. It does no sub-pixel corner
//! refinement and no adaptive thresholding.

pub mod builtins;
mod decode;
mod detector;
mod dictionary;
mod matcher;
mod quad;
mod threshold;

pub use builtins::{builtin_dictionary, builtin_names, BuiltinDictionary, DEFAULT_DICTIONARY};
pub use decode::{decode_quad, DecodeParams, DecodedQuad};
pub use detector::{ArucoDetections, ArucoDetector, ArucoError, ArucoMarker, ArucoParams};
pub use dictionary::{Dictionary, DictionaryError};
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use quad::{find_quads, QuadCandidate, QuadParams};
pub use threshold::otsu_threshold;
