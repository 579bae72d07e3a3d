//! Text presentation for the headless client.
//!
//! The frame driver decides when the court and score are drawn. This module
//! decides what they look like: a character grid of the court and a one-line
//! scoreboard.

use log::info;
use shared::hints::{AnimationHint, HintKind};
use shared::hooks::SimHooks;
use shared::{MatchState, Team, COURT_HEIGHT, COURT_WIDTH};

use crate::reconciler::AnimationPlayer;

/// Renders the court as text, one character per court unit.
pub fn render_court(state: &MatchState) -> String {
    let width = COURT_WIDTH as usize + 1;
    let height = COURT_HEIGHT as usize + 1;
    let mut grid = vec![vec!['.'; width]; height];

    let mid = width / 2;
    for row in grid.iter_mut() {
        row[mid] = '|';
    }
    for team in [Team::Home, Team::Away] {
        let (x, y) = team.basket();
        put(&mut grid, x, y, 'O');
    }

    for player in state.players.values() {
        let glyph = match (player.team, state.ball.carrier == Some(player.id)) {
            (Team::Home, false) => 'h',
            (Team::Home, true) => 'H',
            (Team::Away, false) => 'a',
            (Team::Away, true) => 'A',
        };
        put(&mut grid, player.x, player.y, glyph);
    }
    if state.ball.carrier.is_none() {
        put(&mut grid, state.ball.x, state.ball.y, '*');
    }

    let mut out = String::with_capacity(width * height + height);
    for row in grid {
        out.extend(row);
        out.push('\n');
    }
    out
}

fn put(grid: &mut [Vec<char>], x: f32, y: f32, glyph: char) {
    if x < 0.0 || y < 0.0 {
        return;
    }
    let (col, row) = (x.round() as usize, y.round() as usize);
    if let Some(cell) = grid.get_mut(row).and_then(|r| r.get_mut(col)) {
        *cell = glyph;
    }
}

pub fn render_score(state: &MatchState) -> String {
    let fields = &state.fields;
    let period = if fields.overtime_periods > 0 {
        format!("OT{}", fields.overtime_periods)
    } else {
        format!("H{}", fields.half)
    };
    format!(
        "HOME {:>3}  AWAY {:>3}  {}  {}:{:02}  SHOT {:>2}  {:?}",
        fields.score[0],
        fields.score[1],
        period,
        fields.time_remaining.max(0) / 60,
        fields.time_remaining.max(0) % 60,
        fields.shot_clock.max(0),
        state.phase.kind,
    )
}

/// Prints the court and scoreboard when the frame driver asks for them.
pub struct TextView {
    draw_court: bool,
}

impl TextView {
    pub fn new(draw_court: bool) -> Self {
        Self { draw_court }
    }
}

impl SimHooks for TextView {
    fn draw_court(&mut self, state: &MatchState) {
        if self.draw_court {
            print!("\x1b[H{}", render_court(state));
        }
    }

    fn draw_score(&mut self, state: &MatchState) {
        if self.draw_court {
            println!("{}", render_score(state));
        } else {
            info!("{}", render_score(state));
        }
    }
}

/// Narrates animation hints in the log.
pub struct LogAnimations;

impl AnimationPlayer for LogAnimations {
    fn play(&mut self, hint: &AnimationHint) {
        let who = hint
            .payload
            .player
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        match hint.kind {
            HintKind::DriftSnap => info!("Position of player {} corrected", who),
            kind => info!("{:?} by {} at ({:.0}, {:.0})", kind, who, hint.payload.x, hint.payload.y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Controller, MatchRules};

    fn state() -> MatchState {
        let mut state = MatchState::new();
        state.add_player(1, Team::Home, Controller::Human);
        state.add_player(2, Team::Away, Controller::Ai);
        state.begin_match(&MatchRules::default());
        state
    }

    #[test]
    fn test_court_shows_players_and_loose_ball() {
        let state = state();
        let court = render_court(&state);
        let lines: Vec<&str> = court.lines().collect();

        assert_eq!(lines.len(), COURT_HEIGHT as usize + 1);
        assert!(court.contains('h'));
        assert!(court.contains('a'));
        assert!(court.contains('*'));
    }

    #[test]
    fn test_carrier_is_uppercase() {
        let mut state = state();
        state.give_ball(1, "test");
        let court = render_court(&state);

        assert!(court.contains('H'));
        assert!(!court.contains('*'));
    }

    #[test]
    fn test_scoreboard() {
        let mut state = state();
        state.fields.score = [12, 9];
        state.fields.time_remaining = 125;
        let line = render_score(&state);

        assert!(line.starts_with("HOME  12  AWAY   9  H1  2:05"));
    }
}
