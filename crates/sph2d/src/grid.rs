//! Uniform spatial grid for neighbor lookup.
//!
//! Cells are `smoothing_length` wide so any particle within the kernel
//! support radius of a given particle is guaranteed to sit in the 3x3
//! block of cells around it. The grid is rebuilt from scratch every tick;
//! membership is exact only for the tick it was built in.

use glam::{IVec2, Vec2};

use crate::particle::Particles;

/// Map a world position to a grid cell coordinate, clamped into the valid
/// index range. Positions outside the domain still get a coordinate so
/// neighbor queries never index out of bounds.
pub fn cell_coord(position: Vec2, h: f32, width: usize, height: usize) -> IVec2 {
    let x = (position.x / h).floor() as i32;
    let y = (position.y / h).floor() as i32;
    IVec2::new(
        x.clamp(0, width as i32 - 1),
        y.clamp(0, height as i32 - 1),
    )
}

/// Cell coordinate -> particle ids, with unbounded per-cell membership.
///
/// This is the CPU-side grid; the bounded five-slot representation used by
/// compute backends lives in [`crate::compute`].
#[derive(Clone, Debug)]
pub struct SpatialGrid {
    width: usize,
    height: usize,
    cells: Vec<Vec<u32>>,
}

impl SpatialGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Vec::new(); width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, cell: IVec2) -> usize {
        cell.y as usize * self.width + cell.x as usize
    }

    /// Rebuild all cells from the current particle positions in O(n),
    /// updating every particle's derived `cell` coordinate as it goes.
    /// Cell allocations are retained across rebuilds.
    pub fn rebuild(&mut self, particles: &mut Particles, h: f32) {
        for cell in &mut self.cells {
            cell.clear();
        }
        for p in &mut particles.list {
            p.cell = cell_coord(p.position, h, self.width, self.height);
            let index = p.cell.y as usize * self.width + p.cell.x as usize;
            self.cells[index].push(p.id);
        }
    }

    /// Particle ids in one cell. `cell` must be in range.
    pub fn cell(&self, cell: IVec2) -> &[u32] {
        &self.cells[self.index(cell)]
    }

    /// Ids of every particle in the 3x3 neighborhood centered on `cell`,
    /// omitting out-of-range cells at domain edges and corners.
    pub fn neighbors(&self, cell: IVec2) -> impl Iterator<Item = u32> + '_ {
        let w = self.width as i32;
        let h = self.height as i32;
        (-1i32..=1)
            .flat_map(move |dy| (-1i32..=1).map(move |dx| cell + IVec2::new(dx, dy)))
            .filter(move |c| c.x >= 0 && c.x < w && c.y >= 0 && c.y < h)
            .flat_map(move |c| self.cells[self.index(c)].iter().copied())
    }
}
