//! Command-line interface for the `lzma2` binary.
//!
//! | Submodule     | Responsibility |
//! |---------------|---------------|
//! | [`arg_utils`] | Size parsing, preset shorthand expansion, `LZMA2_NBWORKERS`. |
//! | [`args`]      | `clap` argument definitions and conversion to [`StreamOptions`](crate::options::StreamOptions). |
//! | [`ops`]       | File and stream compression/decompression. |

pub mod arg_utils;
pub mod args;
pub mod ops;
