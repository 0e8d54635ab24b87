//! Game board representation: numbered cells, ladders and snakes.
//!
//! This module contains:
//! - Cell kinds (normal, ladder, snake)
//! - The immutable `Board` and its load-time validation
//! - Serializable board definitions supplied at session creation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A cell number on the board (1..=N). Zero means the token has not entered yet.
pub type Position = u32;

/// Position of a token that has not entered the board
pub const START_POSITION: Position = 0;

/// Number of cells on the standard board
pub const STANDARD_BOARD_SIZE: Position = 100;

/// Smallest board we accept
pub const MIN_BOARD_SIZE: Position = 2;

/// Largest board we accept from a client-supplied definition
pub const MAX_BOARD_SIZE: Position = 1_000;

/// Ladders on the standard board (bottom -> top)
const STANDARD_LADDERS: [(Position, Position); 9] = [
    (3, 22),
    (8, 26),
    (14, 30),
    (21, 42),
    (28, 84),
    (36, 57),
    (51, 67),
    (71, 91),
    (80, 99),
];

/// Snakes on the standard board (head -> tail)
const STANDARD_SNAKES: [(Position, Position); 10] = [
    (17, 7),
    (47, 26),
    (49, 11),
    (56, 53),
    (62, 19),
    (64, 60),
    (87, 24),
    (93, 73),
    (95, 75),
    (97, 78),
];

/// What happens when a token lands on a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    /// Nothing happens
    Normal,
    /// Ladder - carries the token forward
    TransportUp,
    /// Snake - carries the token backward
    TransportDown,
}

impl CellKind {
    pub fn is_transport(&self) -> bool {
        !matches!(self, CellKind::Normal)
    }
}

/// A single numbered cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub number: Position,
    pub kind: CellKind,
    /// Absolute destination, present only on transport cells
    pub destination: Option<Position>,
}

impl Cell {
    /// Create a plain cell
    pub fn normal(number: Position) -> Self {
        Self {
            number,
            kind: CellKind::Normal,
            destination: None,
        }
    }

    /// Create a transport cell; the kind follows from the direction of travel
    pub fn transport(number: Position, destination: Position) -> Self {
        let kind = if destination > number {
            CellKind::TransportUp
        } else {
            CellKind::TransportDown
        };
        Self {
            number,
            kind,
            destination: Some(destination),
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind.is_transport()
    }
}

/// Reasons a board is rejected at load time
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BoardError {
    #[error("Invalid board size {size}")]
    InvalidSize { size: Position },

    #[error("Expected cell {expected}, found cell {found}")]
    Numbering { expected: Position, found: Position },

    #[error("Cell {cell} is outside a board of {size} cells")]
    CellOutOfRange { cell: Position, size: Position },

    #[error("Transport at cell {cell} leads back to itself")]
    SelfLoop { cell: Position },

    #[error("Cell {cell} has more than one transport")]
    DuplicateTransport { cell: Position },

    #[error("Transport {from} -> {to} lands on another transport")]
    ChainedTransport { from: Position, to: Position },

    #[error("The final cell {cell} cannot be a transport")]
    TransportOnGoal { cell: Position },

    #[error("Cell {cell} has a kind that does not match its destination")]
    KindMismatch { cell: Position },
}

/// A transport entry in a board definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDefinition {
    pub from: Position,
    pub to: Position,
}

/// Serializable board layout, supplied at session creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDefinition {
    pub size: Position,
    #[serde(default)]
    pub transports: Vec<TransportDefinition>,
}

impl BoardDefinition {
    /// Parse a definition from JSON. Validation happens in [`Board::from_definition`].
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// The static board: cells 1..=N, immutable for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    cells: Vec<Cell>,
}

impl Board {
    /// Build a board from explicit cells, which must be numbered 1..=N in order
    pub fn new(cells: Vec<Cell>) -> Result<Self, BoardError> {
        let size = cells.len() as Position;
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
            return Err(BoardError::InvalidSize { size });
        }

        for (idx, cell) in cells.iter().enumerate() {
            let expected = idx as Position + 1;
            if cell.number != expected {
                return Err(BoardError::Numbering {
                    expected,
                    found: cell.number,
                });
            }
        }

        let board = Self { cells };
        board.validate()?;
        Ok(board)
    }

    /// Build and validate a board from a definition
    pub fn from_definition(definition: &BoardDefinition) -> Result<Self, BoardError> {
        let size = definition.size;
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
            return Err(BoardError::InvalidSize { size });
        }

        let mut transports: BTreeMap<Position, Position> = BTreeMap::new();
        for t in &definition.transports {
            for cell in [t.from, t.to] {
                if cell == 0 || cell > size {
                    return Err(BoardError::CellOutOfRange { cell, size });
                }
            }
            if transports.insert(t.from, t.to).is_some() {
                return Err(BoardError::DuplicateTransport { cell: t.from });
            }
        }

        let cells = (1..=size)
            .map(|n| match transports.get(&n) {
                Some(&to) => Cell::transport(n, to),
                None => Cell::normal(n),
            })
            .collect();

        Self::new(cells)
    }

    /// The standard 100-cell board
    pub fn standard() -> Self {
        let transports = STANDARD_LADDERS
            .iter()
            .chain(STANDARD_SNAKES.iter())
            .map(|&(from, to)| TransportDefinition { from, to })
            .collect();

        Self::from_definition(&BoardDefinition {
            size: STANDARD_BOARD_SIZE,
            transports,
        })
        .expect("standard board layout is valid")
    }

    fn validate(&self) -> Result<(), BoardError> {
        let size = self.size();

        for cell in &self.cells {
            match (cell.kind, cell.destination) {
                (CellKind::Normal, None) => continue,
                (CellKind::Normal, Some(_)) | (_, None) => {
                    return Err(BoardError::KindMismatch { cell: cell.number });
                }
                (kind, Some(to)) => {
                    if to == 0 || to > size {
                        return Err(BoardError::CellOutOfRange { cell: to, size });
                    }
                    if to == cell.number {
                        return Err(BoardError::SelfLoop { cell: cell.number });
                    }
                    let goes_up = to > cell.number;
                    if goes_up != (kind == CellKind::TransportUp) {
                        return Err(BoardError::KindMismatch { cell: cell.number });
                    }
                    if cell.number == size {
                        return Err(BoardError::TransportOnGoal { cell: cell.number });
                    }
                    if self.cells[(to - 1) as usize].is_transport() {
                        return Err(BoardError::ChainedTransport {
                            from: cell.number,
                            to,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Number of cells (N)
    pub fn size(&self) -> Position {
        self.cells.len() as Position
    }

    /// Look up a cell by number
    pub fn cell(&self, number: Position) -> Option<&Cell> {
        if number == 0 {
            return None;
        }
        self.cells.get((number - 1) as usize)
    }

    /// All cells in order
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// All transport cells in order
    pub fn transports(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.is_transport())
    }

    /// Destination of the transport at `number`, if any
    pub fn transport_at(&self, number: Position) -> Option<Position> {
        self.cell(number)
            .filter(|c| c.is_transport())
            .and_then(|c| c.destination)
    }

    /// Whether a position has reached the final cell
    pub fn is_goal(&self, position: Position) -> bool {
        position >= self.size()
    }

    /// Export the layout as a definition for clients
    pub fn to_definition(&self) -> BoardDefinition {
        BoardDefinition {
            size: self.size(),
            transports: self
                .transports()
                .filter_map(|c| {
                    c.destination.map(|to| TransportDefinition { from: c.number, to })
                })
                .collect(),
        }
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}
