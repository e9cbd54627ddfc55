//! Occupancy grid and FEN assembly.
//! The grid is filled one square at a time through [`GridBuilder`] and can only
//! be read once every square is set. Only piece placement and side to move are
//! observed; castling, en passant and move counters are fixed placeholders.

use anyhow::{anyhow, bail, Result};

use crate::active_color::ActiveColor;
use crate::slicer::Square;

const CASTLING: &str = "KQkq";
const EN_PASSANT: &str = "-";
const HALFMOVE_CLOCK: u32 = 0;
const FULLMOVE_NUMBER: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Occupant {
    #[default]
    Empty,
    BlackPawn,
    WhitePawn,
}

impl Occupant {
    pub fn fen_char(self) -> Option<char> {
        match self {
            Occupant::Empty => None,
            Occupant::BlackPawn => Some('p'),
            Occupant::WhitePawn => Some('P'),
        }
    }
}

/// Fully populated 8x8 grid. Row 0 is rank 8, column 0 is file a.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OccupancyGrid {
    cells: [[Occupant; 8]; 8],
}

impl OccupancyGrid {
    pub fn get(&self, square: Square) -> Occupant {
        self.cells[square.row()][square.col()]
    }

    pub fn count(&self, occupant: Occupant) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|&&cell| cell == occupant)
            .count()
    }

    /// Piece-placement field, rank 8 first.
    pub fn placement(&self) -> String {
        let ranks: Vec<String> = self
            .cells
            .iter()
            .map(|row| {
                let mut out = String::new();
                let mut empty = 0;
                for cell in row {
                    match cell.fen_char() {
                        Some(c) => {
                            if empty > 0 {
                                out.push_str(&empty.to_string());
                                empty = 0;
                            }
                            out.push(c);
                        }
                        None => empty += 1,
                    }
                }
                if empty > 0 {
                    out.push_str(&empty.to_string());
                }
                out
            })
            .collect();
        ranks.join("/")
    }
}

#[derive(Clone, Debug, Default)]
pub struct GridBuilder {
    cells: [[Option<Occupant>; 8]; 8],
}

impl GridBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a square; a square may be set only once.
    pub fn set(&mut self, square: Square, occupant: Occupant) -> Result<()> {
        let cell = &mut self.cells[square.row()][square.col()];
        if cell.is_some() {
            bail!("Square {} classified twice", square);
        }
        *cell = Some(occupant);
        Ok(())
    }

    pub fn build(self) -> Result<OccupancyGrid> {
        let mut cells = [[Occupant::Empty; 8]; 8];
        for square in Square::all() {
            cells[square.row()][square.col()] = self.cells[square.row()][square.col()]
                .ok_or_else(|| anyhow!("Square {} was never classified", square))?;
        }
        Ok(OccupancyGrid { cells })
    }
}

pub fn assemble(grid: &OccupancyGrid, active_color: ActiveColor) -> String {
    format!(
        "{} {} {} {} {} {}",
        grid.placement(),
        active_color.fen_char(),
        CASTLING,
        EN_PASSANT,
        HALFMOVE_CLOCK,
        FULLMOVE_NUMBER
    )
}

/// Syntax check of a FEN string.
pub fn validate_fen(fen: &str) -> Result<()> {
    shakmaty::fen::Fen::from_ascii(fen.as_bytes())
        .map_err(|e| anyhow!("Invalid FEN: {} (received: '{}')", e, fen))?;
    Ok(())
}
