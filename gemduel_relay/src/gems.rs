// Reference rules collaborator used by the `relay` binary.
//
// Each session gets a `GemBoard` holding one 13x6 grid per seat (row 0 at the
// top). Both seats are dealt the same drop-group sequence from a seeded
// `StdRng`, so neither player gets luckier pieces.
//
// Resolving a move:
// 1. The two gems of the seat's current drop group are put at the placement
//    locations (which must be on the board, distinct, and empty).
// 2. Gravity settles every column. Then every crash gem touching a gem of its
//    own color shatters its whole connected same-color group (4-neighbor).
//    Settle and shatter repeat until nothing shatters, so chains count.
// 3. Punishment owed to this seat by earlier opponent moves lands: one normal
//    gem per point, spread left to right across the columns.
// 4. The CRC-32 of the resulting grid must equal the client's checksum. If it
//    does not, or the placement was invalid, the grid is restored and the move
//    is rejected.
//
// The punishment a move inflicts is the number of gems it shattered. A seat is
// defeated when a gem occupies the drop cell (top row, column 3).

use gemduel_protocol::{BoardChecksum, DropGroup, Gem, GemColor, GemKind, Location, Placement};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::rules::{ChecksumMismatch, GameBoard, GameRules, MoveOutcome};
use crate::session::Seat;

pub const ROWS: usize = 13;
pub const COLS: usize = 6;
pub const DROP_COLUMN: usize = 3;

/// Chance that any dealt gem is a crash gem.
const CRASH_CHANCE: f64 = 0.25;

type Grid = [[Option<Gem>; COLS]; ROWS];

/// Deals a `GemBoard` per session. Board seeds come from one seeded stream,
/// so a relay started with the same seed replays the same games.
pub struct GemRules {
    seeds: Mutex<StdRng>,
}

impl GemRules {
    pub fn new(seed: u64) -> Self {
        Self {
            seeds: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// The next board in this rules' sequence. A second `GemRules` built
    /// from the same seed yields the same boards in the same order.
    pub fn next_board(&self) -> GemBoard {
        let seed = self.seeds.lock().next_u64();
        GemBoard::new(seed)
    }
}

impl GameRules for GemRules {
    fn new_board(&self) -> Box<dyn GameBoard> {
        Box::new(self.next_board())
    }
}

#[derive(Clone)]
pub struct GemBoard {
    rng: StdRng,
    /// Every drop group dealt so far. Both seats walk the same list.
    dealt: Vec<DropGroup>,
    /// Index into `dealt` of the drop group each seat is currently placing.
    cursors: [usize; 2],
    grids: [Grid; 2],
    pending_punishment: [u32; 2],
}

impl GemBoard {
    pub fn new(seed: u64) -> Self {
        let mut board = Self {
            rng: StdRng::seed_from_u64(seed),
            dealt: Vec::new(),
            cursors: [0; 2],
            grids: [[[None; COLS]; ROWS]; 2],
            pending_punishment: [0; 2],
        };
        board.deal(1);
        board
    }

    pub fn gem_at(&self, seat: Seat, location: Location) -> Option<Gem> {
        self.grids[seat.index()]
            .get(usize::from(location.row))?
            .get(usize::from(location.col))
            .copied()
            .flatten()
    }

    /// Punishment gems that will land on `seat` after its next move.
    pub fn pending_punishment(&self, seat: Seat) -> u32 {
        self.pending_punishment[seat.index()]
    }

    /// The drop group `seat` is placing now.
    pub fn current_drop(&self, seat: Seat) -> DropGroup {
        self.dealt[self.cursors[seat.index()]]
    }

    pub fn checksum(&self, seat: Seat) -> BoardChecksum {
        grid_checksum(&self.grids[seat.index()])
    }

    /// The checksum a client holding an identical board would send for
    /// `placement`, or `None` if the placement is invalid.
    pub fn predict_checksum(&self, seat: Seat, placement: &Placement) -> Option<BoardChecksum> {
        let mut scratch = self.clone();
        scratch.play(seat, placement)?;
        Some(scratch.checksum(seat))
    }

    /// Deal drop groups until index `n` exists and return it.
    fn deal(&mut self, n: usize) -> DropGroup {
        while self.dealt.len() <= n {
            let first = random_gem(&mut self.rng);
            let second = random_gem(&mut self.rng);
            self.dealt.push(DropGroup { first, second });
        }
        self.dealt[n]
    }

    /// Apply a move to `seat`'s grid without checking any checksum. Returns
    /// the number of gems shattered, or `None` for an invalid placement (in
    /// which case nothing was changed).
    fn play(&mut self, seat: Seat, placement: &Placement) -> Option<u32> {
        let i = seat.index();
        let drop = self.dealt[self.cursors[i]];
        let grid = &mut self.grids[i];

        let [a, b] = *placement;
        if a == b || !is_free(grid, a) || !is_free(grid, b) {
            return None;
        }
        grid[usize::from(a.row)][usize::from(a.col)] = Some(drop.first);
        grid[usize::from(b.row)][usize::from(b.col)] = Some(drop.second);

        let mut shattered = 0;
        loop {
            settle(grid);
            let cleared = shatter(grid);
            if cleared == 0 {
                break;
            }
            shattered += cleared;
        }

        land_punishment(grid, self.pending_punishment[i]);
        self.pending_punishment[i] = 0;
        Some(shattered)
    }
}

impl GameBoard for GemBoard {
    fn initial_setup(&self) -> [DropGroup; 2] {
        [self.dealt[0], self.dealt[1]]
    }

    fn resolve_move(
        &mut self,
        seat: Seat,
        placement: &Placement,
        claimed: BoardChecksum,
    ) -> Result<MoveOutcome, ChecksumMismatch> {
        let i = seat.index();
        let saved_grid = self.grids[i];
        let saved_pending = self.pending_punishment[i];

        let played = self.play(seat, placement);
        let actual = self.checksum(seat);
        let shattered = match played {
            Some(shattered) if actual == claimed => shattered,
            _ => {
                self.grids[i] = saved_grid;
                self.pending_punishment[i] = saved_pending;
                return Err(ChecksumMismatch { claimed, actual });
            }
        };

        let opponent = seat.opponent().index();
        self.pending_punishment[opponent] =
            self.pending_punishment[opponent].saturating_add(shattered);
        self.cursors[i] += 1;
        let next_pieces = self.deal(self.cursors[i] + 1);

        Ok(MoveOutcome {
            next_pieces,
            punishment_delta: shattered,
            defeated: self.grids[i][0][DROP_COLUMN].is_some(),
        })
    }
}

fn random_gem(rng: &mut StdRng) -> Gem {
    let color = GemColor::ALL[rng.gen_range(0..GemColor::ALL.len())];
    let kind = if rng.gen_bool(CRASH_CHANCE) {
        GemKind::Crash
    } else {
        GemKind::Normal
    };
    Gem { color, kind }
}

fn is_free(grid: &Grid, location: Location) -> bool {
    let (row, col) = (usize::from(location.row), usize::from(location.col));
    row < ROWS && col < COLS && grid[row][col].is_none()
}

/// Let every gem fall to the lowest free cell of its column, keeping the
/// column's order.
fn settle(grid: &mut Grid) {
    for col in 0..COLS {
        let mut floor = ROWS;
        for row in (0..ROWS).rev() {
            if let Some(gem) = grid[row][col].take() {
                floor -= 1;
                grid[floor][col] = Some(gem);
            }
        }
    }
}

fn neighbors(row: usize, col: usize) -> impl Iterator<Item = (usize, usize)> {
    let up = row.checked_sub(1).map(|r| (r, col));
    let down = (row + 1 < ROWS).then_some((row + 1, col));
    let left = col.checked_sub(1).map(|c| (row, c));
    let right = (col + 1 < COLS).then_some((row, col + 1));
    [up, down, left, right].into_iter().flatten()
}

/// Shatter every same-color group that contains a crash gem touching another
/// gem of its color. Returns how many gems were removed.
fn shatter(grid: &mut Grid) -> u32 {
    let mut doomed = [[false; COLS]; ROWS];
    for row in 0..ROWS {
        for col in 0..COLS {
            let Some(gem) = grid[row][col] else { continue };
            if gem.kind != GemKind::Crash || doomed[row][col] {
                continue;
            }
            let touches_own_color = neighbors(row, col)
                .any(|(r, c)| grid[r][c].is_some_and(|other| other.color == gem.color));
            if !touches_own_color {
                continue;
            }
            let mut stack = vec![(row, col)];
            doomed[row][col] = true;
            while let Some((r, c)) = stack.pop() {
                for (nr, nc) in neighbors(r, c) {
                    if !doomed[nr][nc] && grid[nr][nc].is_some_and(|other| other.color == gem.color)
                    {
                        doomed[nr][nc] = true;
                        stack.push((nr, nc));
                    }
                }
            }
        }
    }

    let mut cleared = 0;
    for (grid_row, doomed_row) in grid.iter_mut().zip(doomed.iter()) {
        for (cell, doomed) in grid_row.iter_mut().zip(doomed_row.iter()) {
            if *doomed {
                *cell = None;
                cleared += 1;
            }
        }
    }
    cleared
}

/// Drop `count` normal punishment gems, one per column from left to right,
/// wrapping around. Gems that find their column full are lost.
fn land_punishment(grid: &mut Grid, count: u32) {
    for n in 0..count as usize {
        let col = n % COLS;
        let color = GemColor::ALL[(col + n / COLS) % GemColor::ALL.len()];
        if let Some(row) = (0..ROWS).rev().find(|&row| grid[row][col].is_none()) {
            grid[row][col] = Some(Gem::normal(color));
        }
    }
}

fn grid_checksum(grid: &Grid) -> BoardChecksum {
    let mut hasher = crc32fast::Hasher::new();
    for row in grid {
        for cell in row {
            hasher.update(&[cell_code(*cell)]);
        }
    }
    BoardChecksum::from(hasher.finalize())
}

/// 0 for empty; otherwise 1 + 2 * color + kind.
fn cell_code(cell: Option<Gem>) -> u8 {
    let Some(gem) = cell else { return 0 };
    let color = match gem.color {
        GemColor::Red => 0,
        GemColor::Green => 1,
        GemColor::Blue => 2,
        GemColor::Yellow => 3,
    };
    let kind = match gem.kind {
        GemKind::Normal => 0,
        GemKind::Crash => 1,
    };
    1 + 2 * color + kind
}
