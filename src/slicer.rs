//! Board slicer.
//! Cuts a pre-cropped board image into 64 square images and extracts the
//! active-color marker crop from the top-left corner of a1.
//! Square size is `dimension / 8` (floor); remainder pixels on the right and
//! bottom edges are dropped.

use anyhow::{bail, Result};
use image::{imageops, DynamicImage, RgbImage};
use std::fmt;

/// One of the 64 board squares. File 0 is `a`, rank 0 is `1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        (file < 8 && rank < 8).then_some(Self { file, rank })
    }

    /// Parses algebraic notation such as `e4`.
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let file = chars.next()?;
        let rank = chars.next()?;
        if chars.next().is_some() || !('a'..='h').contains(&file) || !('1'..='8').contains(&rank) {
            return None;
        }
        Self::new(file as u8 - b'a', rank as u8 - b'1')
    }

    pub fn rank(self) -> u8 {
        self.rank
    }

    pub fn file_char(self) -> char {
        (b'a' + self.file) as char
    }

    pub fn rank_char(self) -> char {
        (b'1' + self.rank) as char
    }

    /// Row in the pixel grid and in the occupancy grid: rank 8 is row 0.
    pub fn row(self) -> usize {
        7 - self.rank as usize
    }

    pub fn col(self) -> usize {
        self.file as usize
    }

    /// All squares, rank 1 first, files a..h within each rank.
    pub fn all() -> impl Iterator<Item = Square> {
        (0..8u8).flat_map(|rank| (0..8u8).map(move |file| Square { file, rank }))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file_char(), self.rank_char())
    }
}

pub struct SquareImage {
    pub square: Square,
    pub image: RgbImage,
}

/// The 64 square crops in [`Square::all`] order.
pub struct SlicedBoard {
    pub square_width: u32,
    pub square_height: u32,
    pub squares: Vec<SquareImage>,
}

impl SlicedBoard {
    pub fn get(&self, square: Square) -> &RgbImage {
        &self.squares[square.rank as usize * 8 + square.file as usize].image
    }
}

fn square_size(board: &DynamicImage) -> Result<(u32, u32)> {
    let (w, h) = (board.width(), board.height());
    if w < 8 || h < 8 {
        bail!("Board image {}x{} is too small to hold 8x8 squares", w, h);
    }
    Ok((w / 8, h / 8))
}

pub fn slice(board: &DynamicImage) -> Result<SlicedBoard> {
    let (square_width, square_height) = square_size(board)?;
    let rgb = board.to_rgb8();

    let squares = Square::all()
        .map(|square| {
            let x = square.col() as u32 * square_width;
            let y = square.row() as u32 * square_height;
            SquareImage {
                square,
                image: imageops::crop_imm(&rgb, x, y, square_width, square_height).to_image(),
            }
        })
        .collect();

    Ok(SlicedBoard {
        square_width,
        square_height,
        squares,
    })
}

/// Top-left `1/divisor` of the a1 square, in both dimensions.
pub fn color_patch(board: &DynamicImage, divisor: f32) -> Result<RgbImage> {
    if !(divisor.is_finite() && divisor >= 1.0) {
        bail!("Color crop divisor must be >= 1, got {}", divisor);
    }
    let (square_width, square_height) = square_size(board)?;
    let width = (square_width as f32 / divisor).floor() as u32;
    let height = (square_height as f32 / divisor).floor() as u32;
    let a1_top = 7 * square_height;

    let rgb = board.to_rgb8();
    Ok(imageops::crop_imm(&rgb, 0, a1_top, width, height).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Each square filled with a color encoding its pixel-grid (col, row).
    fn coded_board(size: u32) -> DynamicImage {
        let cell = size / 8;
        let img = RgbImage::from_fn(size, size, |x, y| {
            let col = (x / cell).min(7) as u8;
            let row = (y / cell).min(7) as u8;
            Rgb([col * 30, row * 30, 255])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_square_notation() {
        let e4 = Square::new(4, 3).unwrap();
        assert_eq!(e4.to_string(), "e4");
        assert_eq!(Square::parse("e4"), Some(e4));
        assert_eq!(Square::parse("i1"), None);
        assert_eq!(Square::parse("a9"), None);
        assert_eq!(Square::parse("a10"), None);
        assert_eq!(Square::new(8, 0), None);
    }

    #[test]
    fn test_all_squares_unique() {
        let squares: std::collections::HashSet<_> = Square::all().collect();
        assert_eq!(squares.len(), 64);
        assert_eq!(Square::all().next(), Square::parse("a1"));
        assert_eq!(Square::all().last(), Square::parse("h8"));
    }

    #[test]
    fn test_rank_one_is_bottom_row() {
        let sliced = slice(&coded_board(160)).unwrap();
        assert_eq!(sliced.squares.len(), 64);
        assert_eq!((sliced.square_width, sliced.square_height), (20, 20));

        let a1 = sliced.get(Square::parse("a1").unwrap());
        assert_eq!(a1.get_pixel(0, 0), &Rgb([0, 7 * 30, 255]));

        let h8 = sliced.get(Square::parse("h8").unwrap());
        assert_eq!(h8.get_pixel(19, 19), &Rgb([7 * 30, 0, 255]));

        let e4 = sliced.get(Square::parse("e4").unwrap());
        assert_eq!(e4.get_pixel(5, 5), &Rgb([4 * 30, 4 * 30, 255]));
    }

    #[test]
    fn test_remainder_pixels_are_dropped() {
        let board = DynamicImage::ImageRgb8(RgbImage::new(805, 803));
        let sliced = slice(&board).unwrap();
        assert_eq!((sliced.square_width, sliced.square_height), (100, 100));
        assert!(sliced.squares.iter().all(|s| s.image.dimensions() == (100, 100)));
    }

    #[test]
    fn test_color_patch_geometry() {
        let board = coded_board(800);
        let patch = color_patch(&board, 3.6).unwrap();
        // 100 / 3.6 = 27.7
        assert_eq!(patch.dimensions(), (27, 27));
        assert_eq!(patch.get_pixel(0, 0), &Rgb([0, 7 * 30, 255]));

        assert!(color_patch(&board, 0.0).is_err());
    }

    #[test]
    fn test_tiny_board_rejected() {
        let board = DynamicImage::ImageRgb8(RgbImage::new(7, 64));
        assert!(slice(&board).is_err());
    }
}
