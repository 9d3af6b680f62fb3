//! Uniform-grid spatial hash used by the CPU stages for neighbor search.
//!
//! Particles are bucketed with a counting sort into one flat index array plus
//! per-cell start offsets, the same layout a GPU grid build produces.

/// Upper bound on cells per axis. Large boxes get coarser cells instead.
const MAX_CELLS_PER_AXIS: f32 = 128.0;

/// Uniform-grid spatial hash over a fixed axis-aligned box.
///
/// Cell size is at least the search radius, so the 27 (3x3x3) cells around a
/// particle hold every neighbor within that radius. Positions outside the box
/// are clamped into the border cells, which keeps the 27-cell guarantee.
#[derive(Debug, Clone)]
pub struct NeighborGrid {
    cell_size: f32,
    origin: [f32; 3],
    dims: [u32; 3],
    /// Cell of each indexed particle.
    particle_cells: Vec<u32>,
    /// Particle indices grouped by cell.
    members: Vec<u32>,
    /// `members[cell_start[c]..cell_start[c + 1]]` are the particles in cell
    /// `c`; one entry longer than the cell count.
    cell_start: Vec<u32>,
}

impl NeighborGrid {
    /// Create a grid covering `[min, max]` with cubic cells of `cell_size`.
    pub fn new(cell_size: f32, min: [f32; 3], max: [f32; 3]) -> Self {
        debug_assert!(cell_size > 0.0, "cell_size must be positive");
        let dims = std::array::from_fn(|c| ((max[c] - min[c]) / cell_size).ceil().max(1.0) as u32);
        let mut grid = Self {
            cell_size,
            origin: min,
            dims,
            particle_cells: Vec::new(),
            members: Vec::new(),
            cell_start: Vec::new(),
        };
        grid.cell_start = vec![0; grid.total_cells() + 1];
        grid
    }

    /// Grid over `[min, max]` able to answer queries up to `radius`,
    /// coarsening cells when the box would need too many.
    pub fn covering(min: [f32; 3], max: [f32; 3], radius: f32) -> Self {
        let widest = (0..3).map(|c| max[c] - min[c]).fold(0.0_f32, f32::max);
        Self::new(radius.max(widest / MAX_CELLS_PER_AXIS), min, max)
    }

    /// Edge length of one cell; the largest radius a query may use.
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of particles indexed by the last [`update`](Self::update).
    pub fn len(&self) -> usize {
        self.particle_cells.len()
    }

    /// `true` if no particle is indexed.
    pub fn is_empty(&self) -> bool {
        self.particle_cells.is_empty()
    }

    fn total_cells(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }

    /// Integer cell coordinate of `p` along axis `c`, clamped to the grid.
    #[inline]
    fn coord(&self, p: f32, c: usize) -> u32 {
        let last = (self.dims[c] - 1) as f32;
        ((p - self.origin[c]) / self.cell_size).floor().clamp(0.0, last) as u32
    }

    #[inline]
    fn linear(&self, cell: [u32; 3]) -> usize {
        let [nx, ny, _] = self.dims;
        (cell[0] + nx * (cell[1] + ny * cell[2])) as usize
    }

    /// Rebuild the grid from the positions of the first `x.len()` particles.
    pub fn update(&mut self, x: &[f32], y: &[f32], z: &[f32]) {
        debug_assert!(x.len() == y.len() && x.len() == z.len());
        let cells = self.total_cells();

        self.particle_cells = x
            .iter()
            .zip(y)
            .zip(z)
            .map(|((&px, &py), &pz)| {
                self.linear([self.coord(px, 0), self.coord(py, 1), self.coord(pz, 2)]) as u32
            })
            .collect();

        // Counting sort: histogram shifted by one, then an inclusive scan
        self.cell_start.clear();
        self.cell_start.resize(cells + 1, 0);
        for &cell in &self.particle_cells {
            self.cell_start[cell as usize + 1] += 1;
        }
        for c in 0..cells {
            self.cell_start[c + 1] += self.cell_start[c];
        }

        let mut cursor = self.cell_start[..cells].to_vec();
        self.members.resize(self.particle_cells.len(), 0);
        for (i, &cell) in self.particle_cells.iter().enumerate() {
            let slot = &mut cursor[cell as usize];
            self.members[*slot as usize] = i as u32;
            *slot += 1;
        }
    }

    /// Visit every other indexed particle within `radius` of particle `idx`.
    ///
    /// `f` receives the neighbor index and the distance to it. The particle
    /// itself is never visited.
    pub fn for_each_neighbor<F>(
        &self,
        idx: usize,
        x: &[f32],
        y: &[f32],
        z: &[f32],
        radius: f32,
        mut f: F,
    ) where
        F: FnMut(usize, f32),
    {
        debug_assert!(radius <= self.cell_size);
        let here = [x[idx], y[idx], z[idx]];
        let centre: [u32; 3] = std::array::from_fn(|c| self.coord(here[c], c));
        // Inclusive cell span on each axis, trimmed at the grid edge
        let span: [(u32, u32); 3] = std::array::from_fn(|c| {
            (centre[c].saturating_sub(1), (centre[c] + 1).min(self.dims[c] - 1))
        });
        let radius_sq = radius * radius;

        for cz in span[2].0..=span[2].1 {
            for cy in span[1].0..=span[1].1 {
                for cx in span[0].0..=span[0].1 {
                    let cell = self.linear([cx, cy, cz]);
                    let bucket = self.cell_start[cell] as usize..self.cell_start[cell + 1] as usize;
                    for &j in &self.members[bucket] {
                        let j = j as usize;
                        if j == idx {
                            continue;
                        }
                        let d = [x[j] - here[0], y[j] - here[1], z[j] - here[2]];
                        let dist_sq = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
                        if dist_sq <= radius_sq {
                            f(j, dist_sq.sqrt());
                        }
                    }
                }
            }
        }
    }
}
