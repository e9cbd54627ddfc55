//! Chessboard screenshot to FEN.
//!
//! The board image is sliced into 64 squares, each square is compared against
//! pawn templates with a binary feature matcher, the a1 corner crop decides the
//! side to move, and the resulting occupancy grid is written out as FEN.

pub mod active_color;
pub mod calibrate;
pub mod capture;
pub mod classify;
pub mod config;
pub mod fen;
pub mod matcher;
pub mod pipeline;
pub mod sink;
pub mod slicer;
pub mod templates;
