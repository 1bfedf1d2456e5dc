use std::path::PathBuf;

use anyhow::{Context, Result};

/// Resource types drawn per turn.
const RESOURCES: usize = 5;
/// Dice sums 2..=12.
const DICE_OUTCOMES: usize = 11;

/// Deterministic splitmix64 stream; enough for reproducible sample games.
struct GameRng(u64);

impl GameRng {
    /// Uniform-ish integer in `0..n`.
    fn below(&mut self, n: u64) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        (z ^ (z >> 31)) % n
    }
}

/// Feature width for a game: counters, one-hot player flags, one-hot dice
/// outcome, drawn and budgeted resources per player.
fn feature_width(n_players: usize) -> usize {
    6 + 3 * n_players + DICE_OUTCOMES + 2 * RESOURCES * n_players
}

fn write_game(path: &PathBuf, rng: &mut GameRng) -> Result<usize> {
    let n_players = 3 + rng.below(2) as usize;
    let n_rows = 900 + rng.below(300);
    let final_score = 2 + rng.below(9);

    let mut drawn = vec![0u64; RESOURCES * n_players];
    let mut score = 0u64;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    for row in 0..n_rows {
        let active = (row as usize) % n_players;
        let dice = (rng.below(6) + rng.below(6)) as usize;
        if score < final_score && rng.below(40) == 0 {
            score += 1;
        }

        let mut fields: Vec<u64> = vec![row, final_score, score, row / 4, rng.below(3), rng.below(2)];
        fields.extend([0u64; 2]);
        for p in 0..n_players {
            fields.push(u64::from(p == active));
            fields.push(u64::from(p == (active + 1) % n_players));
            fields.push(u64::from(p == 0 && score > 3));
        }
        fields.extend((0..DICE_OUTCOMES).map(|i| u64::from(i == dice)));
        for (i, count) in drawn.iter_mut().enumerate() {
            if i / RESOURCES == active && rng.below(3) == 0 {
                *count += 1;
            }
        }
        fields.extend(drawn.iter().copied());
        fields.extend(drawn.iter().map(|d| d / 2));

        debug_assert_eq!(fields.len(), 2 + feature_width(n_players));
        writer
            .write_record(fields.iter().map(|v| v.to_string()))
            .with_context(|| format!("writing {}", path.display()))?;
    }
    writer.flush()?;
    Ok(n_rows as usize)
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let output_dir = PathBuf::from(args.next().unwrap_or_else(|| "data/saves/test_hot_encode".into()));
    let n_games: usize = match args.next() {
        Some(n) => n.parse().with_context(|| format!("invalid game count '{n}'"))?,
        None => 20,
    };

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let mut rng = GameRng(42);
    let mut total_rows = 0;
    for game in 0..n_games {
        let path = output_dir.join(format!("game{game}.csv"));
        total_rows += write_game(&path, &mut rng)?;
    }

    println!(
        "Wrote {n_games} games ({total_rows} rows) to {}",
        output_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn games_are_reproducible_and_rectangular() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.csv");
        let second = dir.path().join("b.csv");
        let rows = write_game(&first, &mut GameRng(7)).unwrap();
        write_game(&second, &mut GameRng(7)).unwrap();

        let text = std::fs::read_to_string(&first).unwrap();
        assert_eq!(text, std::fs::read_to_string(&second).unwrap());
        assert_eq!(text.lines().count(), rows);

        let widths: Vec<usize> = text.lines().map(|l| l.split(',').count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
        let n_players = (3..=4).find(|&n| 2 + feature_width(n) == widths[0]);
        assert!(n_players.is_some(), "unexpected width {}", widths[0]);
    }

    #[test]
    fn below_stays_in_range() {
        let mut rng = GameRng(1);
        assert!((0..1000).all(|_| rng.below(6) < 6));
    }
}
