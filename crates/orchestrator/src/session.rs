//! Frame-driven session around a [`FluidSimulation`]
//!
//! A `Session` plays the role of the interactive front end: it owns the
//! simulation, queues user commands, applies them at the start of the next
//! frame, and advances the fluid by the configured fixed step unless paused.

use std::collections::VecDeque;

use droplet_kernel::{FluidSimulation, PhaseStats, Vec3};

use crate::config::{BrushConfig, SessionCommand};

/// Runner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation advances every frame
    Running,
    /// Frames still apply commands but do not step the fluid
    Paused,
}

/// Outcome of one [`Session::advance`] call
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Frame number, starting at 0
    pub frame: u64,
    /// Whether the fluid was stepped this frame
    pub stepped: bool,
    /// Particles added by brush strokes this frame
    pub spawned: usize,
    /// Particles removed by brush strokes this frame
    pub removed: usize,
    /// Live particle count after the frame
    pub live_count: usize,
}

/// Interactive session state: brush, pause flag, command queue and clock
pub struct Session {
    name: String,
    sim: FluidSimulation,
    state: RunnerState,
    brush: BrushConfig,
    pending: VecDeque<SessionCommand>,
    /// Session clock (seconds of frame time, paused or not)
    clock: f64,
    last_stroke: Option<f64>,
    frame: u64,
    positions: Vec<Vec3>,
}

impl Session {
    /// Wrap a freshly initialized simulation.
    ///
    /// An inverted brush range (`min > max`) is not rejected here; sizes then
    /// settle on `max`.
    pub fn new(name: impl Into<String>, sim: FluidSimulation, brush: BrushConfig) -> Self {
        let mut brush = brush;
        brush.size = fit_brush(brush.size, &brush);
        let positions = clamped_positions(&sim);
        Self {
            name: name.into(),
            sim,
            state: RunnerState::Running,
            brush,
            pending: VecDeque::new(),
            clock: 0.0,
            last_stroke: None,
            frame: 0,
            positions,
        }
    }

    /// Queue a command for the start of the next frame.
    pub fn queue(&mut self, command: SessionCommand) {
        self.pending.push_back(command);
    }

    /// Apply queued commands, then step the fluid once by the fixed time
    /// step unless paused. `frame_dt` only advances the session clock.
    pub fn advance(&mut self, frame_dt: f32) -> FrameReport {
        let mut spawned = 0;
        let mut removed = 0;
        let mut edited = false;

        while let Some(command) = self.pending.pop_front() {
            match command {
                SessionCommand::Reset => {
                    self.sim.reset();
                    edited = true;
                }
                SessionCommand::TogglePause => self.toggle_pause(),
                SessionCommand::SetBrush { size } => {
                    self.set_brush(size);
                }
                SessionCommand::Spawn { position } => {
                    if self.take_stroke() {
                        let point = self.brush_point(position);
                        spawned += self.sim.spawn_at(point, self.brush.size as usize);
                        edited = true;
                    }
                }
                SessionCommand::Remove { position } => {
                    if self.take_stroke() {
                        let point = self.brush_point(position);
                        removed += self.sim.remove_near(point, self.removal_radius()).len();
                        edited = true;
                    }
                }
            }
        }

        let stepped = self.state == RunnerState::Running && self.sim.live_count() > 0;
        if stepped {
            let dt = self.sim.settings().time_step;
            self.positions = self.sim.tick(dt);
        } else if edited {
            self.positions = clamped_positions(&self.sim);
        }

        let report = FrameReport {
            frame: self.frame,
            stepped,
            spawned,
            removed,
            live_count: self.sim.live_count(),
        };
        tracing::debug!(
            session = %self.name,
            frame = report.frame,
            stepped,
            live = report.live_count,
            "frame complete"
        );

        self.frame += 1;
        self.clock += f64::from(frame_dt.max(0.0));
        report
    }

    /// `true` (and the cooldown restarted) if a brush stroke may run now.
    fn take_stroke(&mut self) -> bool {
        let ready = match self.last_stroke {
            None => true,
            Some(last) => self.clock >= last + f64::from(self.brush.cooldown),
        };
        if ready {
            self.last_stroke = Some(self.clock);
        } else {
            tracing::debug!(clock = self.clock, "brush stroke dropped during cooldown");
        }
        ready
    }

    fn brush_point(&self, position: Vec3) -> Vec3 {
        if self.brush.planar {
            [position[0], position[1], self.sim.domain().spawn_centre[2]]
        } else {
            position
        }
    }

    /// Pause if running, resume if paused.
    pub fn toggle_pause(&mut self) {
        self.state = match self.state {
            RunnerState::Running => RunnerState::Paused,
            RunnerState::Paused => RunnerState::Running,
        };
        tracing::info!(session = %self.name, state = ?self.state, "pause toggled");
    }

    /// Set the brush size, clamped to the configured range; returns the size
    /// in effect.
    pub fn set_brush(&mut self, size: u32) -> u32 {
        self.brush.size = fit_brush(size, &self.brush);
        self.brush.size
    }

    /// Current brush size
    pub fn brush_size(&self) -> u32 {
        self.brush.size
    }

    /// Radius removed by one stroke: a tenth of the brush size
    pub fn removal_radius(&self) -> f32 {
        self.brush.size as f32 / 10.0
    }

    /// Current runner state
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frames advanced so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Session clock in seconds
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Number of commands waiting for the next frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wall-clamped live positions as of the last frame
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Per-phase statistics of the current population
    pub fn phase_stats(&self) -> Vec<PhaseStats> {
        self.sim.phase_stats()
    }

    /// The wrapped simulation
    pub fn simulation(&self) -> &FluidSimulation {
        &self.sim
    }

    /// Mutable access to the wrapped simulation, e.g. to attach obstacles
    pub fn simulation_mut(&mut self) -> &mut FluidSimulation {
        &mut self.sim
    }

    /// Release the simulation's particle store
    pub fn teardown(self) {
        tracing::info!(session = %self.name, frames = self.frame, "session closed");
        self.sim.teardown();
    }
}

fn fit_brush(size: u32, brush: &BrushConfig) -> u32 {
    size.max(brush.min).min(brush.max)
}

fn clamped_positions(sim: &FluidSimulation) -> Vec<Vec3> {
    let mut positions = sim.positions();
    sim.domain().clamp_positions(&mut positions);
    positions
}
