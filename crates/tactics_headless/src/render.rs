//! ASCII battle map for terminal review.
//!
//! Terrain uses the grid glyphs; living units are drawn with their role
//! letter, uppercase for Blue and lowercase for Orange.

use tactics_core::units::{Role, Team};
use tactics_core::world::{UnitSnapshot, World};

/// Rendering options.
#[derive(Debug, Clone, Copy)]
pub struct AsciiConfig {
    /// Append a per-team unit count legend.
    pub show_legend: bool,
    /// Use ANSI colors.
    pub use_color: bool,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            show_legend: true,
            use_color: true,
        }
    }
}

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const BLUE: &str = "\x1b[34m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GRAY: &str = "\x1b[90m";
}

const fn team_color(team: Team) -> &'static str {
    match team {
        Team::Blue => colors::BLUE,
        Team::Orange => colors::YELLOW,
    }
}

/// Map character for a unit.
#[must_use]
pub fn unit_char(team: Team, role: Role) -> char {
    let letter = role.letter();
    match team {
        Team::Blue => letter.to_ascii_uppercase(),
        Team::Orange => letter.to_ascii_lowercase(),
    }
}

/// Render terrain and living units.
#[must_use]
pub fn render_ascii(world: &World, config: &AsciiConfig) -> String {
    let mut cells: Vec<Vec<(char, Option<Team>)>> = world
        .grid()
        .to_rows()
        .into_iter()
        .map(|row| row.chars().map(|ch| (ch, None)).collect())
        .collect();

    let units = world.unit_snapshots();
    for unit in units.iter().filter(|u| u.alive) {
        let (r, c) = (unit.pos.row as usize, unit.pos.col as usize);
        if let Some(cell) = cells.get_mut(r).and_then(|row| row.get_mut(c)) {
            *cell = (unit_char(unit.team, unit.role), Some(unit.team));
        }
    }

    let mut out = String::with_capacity(cells.len() * (cells.len() + 1));
    for row in &cells {
        for &(ch, team) in row {
            match (config.use_color, team) {
                (true, Some(team)) => {
                    out.push_str(colors::BOLD);
                    out.push_str(team_color(team));
                    out.push(ch);
                    out.push_str(colors::RESET);
                }
                (true, None) if ch != '.' => {
                    out.push_str(colors::GRAY);
                    out.push(ch);
                    out.push_str(colors::RESET);
                }
                _ => out.push(ch),
            }
        }
        out.push('\n');
    }

    if config.show_legend {
        out.push_str(&legend(world, &units));
    }
    out
}

fn legend(world: &World, units: &[UnitSnapshot]) -> String {
    let mut out = format!("tick {}", world.frame());
    if let Some(outcome) = world.outcome() {
        out.push_str(&format!("  {outcome:?}"));
    }
    out.push('\n');
    for team in Team::ALL {
        let alive = units.iter().filter(|u| u.team == team && u.alive).count();
        let total = units.iter().filter(|u| u.team == team).count();
        out.push_str(&format!("{team}: {alive}/{total} alive\n"));
    }
    out
}
